//! Canonical status types and canonicalization of stringly store values
//!
//! The external store holds statuses as free-form strings with several
//! spellings in circulation for the same state ("validee", "validated",
//! "valide", "valid", ...). Everything inside the core operates on the
//! closed enums below; the string zoo is mapped once at the store boundary
//! and canonical spellings are written back.

use serde::{Deserialize, Serialize};

/// Stored value written when a declaration is marked recovered.
pub const RECOVERED_FLAG: &str = "recouvre";

/// Program reference sentinel for cashier recoveries that relate to no
/// program. NA means unknown identity and never matches anything.
pub const NA_REFERENCE: &str = "DCP/NA/NA/NA";

/// `paymentState` interop predicate. Stored data contains several
/// spellings ("recouvre", "recouvré", ...), so every comparison against
/// the field is a prefix match, never equality.
pub fn is_recovered_flag(state: &str) -> bool {
    state.trim().to_lowercase().starts_with("recouvr")
}

/// Approval/tracking lifecycle of a declaration. `Validated` and
/// `Rejected` are terminal on the approval axis; `EnRoute` and
/// `Breakdown` are driver-side tracking states reachable from `Pending`
/// and back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeclarationStatus {
    #[default]
    Pending,
    EnRoute,
    Breakdown,
    Validated,
    Rejected,
}

impl DeclarationStatus {
    pub fn canonicalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "en_route" => Self::EnRoute,
            "en_panne" | "breakdown" => Self::Breakdown,
            "valide" | "validee" | "validated" | "valid" => Self::Validated,
            "refuse" | "refusee" | "rejected" => Self::Rejected,
            // includes "en_cours", "pending", "brouillon" and anything
            // unrecognised: a declaration we cannot place is still pending
            _ => Self::Pending,
        }
    }

    pub fn as_store_str(&self) -> &'static str {
        match self {
            Self::Pending => "en_cours",
            Self::EnRoute => "en_route",
            Self::Breakdown => "en_panne",
            Self::Validated => "valide",
            Self::Rejected => "refuse",
        }
    }

    /// True while the planner can still validate or reject.
    pub fn approval_open(&self) -> bool {
        !matches!(self, Self::Validated | Self::Rejected)
    }

    /// True for the states driver-side tracking is allowed to move between.
    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Pending | Self::EnRoute | Self::Breakdown)
    }
}

impl From<String> for DeclarationStatus {
    fn from(raw: String) -> Self {
        Self::canonicalize(&raw)
    }
}

impl From<DeclarationStatus> for String {
    fn from(status: DeclarationStatus) -> Self {
        status.as_store_str().to_owned()
    }
}

/// Lifecycle of a payment receipt. `Cancelled` is terminal; `Received`
/// is only reachable once the owning declaration is marked recovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    #[default]
    Draft,
    Validated,
    Received,
    Cancelled,
}

impl PaymentStatus {
    pub fn canonicalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "validee" | "validated" | "valide" | "valid" => Self::Validated,
            "recu" | "reçu" | "received" => Self::Received,
            "annule" | "annulee" | "cancelled" | "canceled" => Self::Cancelled,
            // "brouillon", "pending", "draft" and everything else
            _ => Self::Draft,
        }
    }

    pub fn as_store_str(&self) -> &'static str {
        match self {
            Self::Draft => "brouillon",
            Self::Validated => "validee",
            Self::Received => "recu",
            Self::Cancelled => "annule",
        }
    }

    /// Deletion is only allowed before validation or after cancellation.
    pub fn deletable(&self) -> bool {
        matches!(self, Self::Draft | Self::Cancelled)
    }

    /// Counts towards the recovered amount of the matched declaration.
    pub fn recovery_eligible(&self) -> bool {
        matches!(self, Self::Validated | Self::Received)
    }
}

impl From<String> for PaymentStatus {
    fn from(raw: String) -> Self {
        Self::canonicalize(&raw)
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        status.as_store_str().to_owned()
    }
}
