//! Error taxonomy for the recovery core

use crate::actor::Role;

/// A required field is missing or empty. Surfaced to the initiating user;
/// nothing is written and no trace entry is appended.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Declaration requires year, month and program number")]
    MissingProgramComponents,
    #[error("Declaration requires a distance")]
    MissingDistance,
    #[error("Declaration requires delivery fees")]
    MissingDeliveryFees,
    #[error("Receipt validation requires an amount greater than zero")]
    MissingAmount,
    #[error("Receipt validation requires a company")]
    MissingCompany,
}

/// The requested transition is not permitted by the state machine.
/// Always rejected before any write.
#[derive(thiserror::Error, Debug)]
pub enum TransitionError {
    #[error("Declaration has left the approval phase (status: {0})")]
    ApprovalClosed(String),
    #[error("Tracking updates may only move between en_cours, en_route and en_panne")]
    TrackingOnly,
    #[error("Receipt is not a draft (status: {0})")]
    NotDraft(String),
    #[error("Receipt is not validated (status: {0})")]
    NotValidated(String),
    #[error("Receipt can only be received once its declaration is marked recovered")]
    DeclarationNotRecovered,
    #[error("Declaration is not marked recovered")]
    NotRecovered,
    #[error("A validated or received receipt cannot be deleted")]
    DeleteValidated,
}

/// The actor lacks the role required for the operation. Checked before
/// any write.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("{role:?} may not {action}")]
    RoleNotPermitted { role: Role, action: &'static str },
    #[error("Chauffeur may only {action} their own records")]
    NotOwner { action: &'static str },
}

/// The record store failed or returned something unusable. Non-fatal for
/// reads (the last in-memory snapshot keeps serving); writes are reported
/// as failed to the caller, never retried here.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(#[from] sled::Error),
    #[error("malformed document: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("no document with id {0}")]
    NotFound(String),
}
