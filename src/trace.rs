//! Immutable audit trail entries
//!
//! Every state-changing operation appends exactly one entry to the
//! entity's `traceability` array. Entries are never rewritten, removed or
//! reordered; the array is written together with the status change in the
//! same store update so readers never observe a torn state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::Actor;

/// Human-readable action labels recorded in the trail. These are the
/// strings the dashboards display as-is.
pub mod actions {
    pub const DECLARATION_CREATED: &str = "Déclaration créée";
    pub const DECLARATION_VALIDATED: &str = "Déclaration validée";
    pub const DECLARATION_REJECTED: &str = "Déclaration refusée";
    pub const TRACKING_UPDATED: &str = "Statut trajet mis à jour";
    pub const RECOVERY_CREATED: &str = "Recouvrement créé";
    pub const DECLARATION_RECOVERED: &str = "Déclaration recouvrée";
    pub const RECOVERY_REVOKED: &str = "Annulation recouvrement";
    pub const RECEIPT_CREATED: &str = "Reçu créé";
    pub const RECEIPT_VALIDATED: &str = "Reçu validé";
    pub const RECEIPT_VALIDATION_REVOKED: &str = "Validation annulée";
    pub const RECEIPT_RECEIVED: &str = "Reçu réceptionné";
    pub const RECEIPT_CANCELLED: &str = "Reçu annulé";
}

/// One audit record: who did what and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub action: String,
    pub date: DateTime<Utc>,
}

impl TraceEntry {
    pub fn new(actor: &Actor, action: &str) -> Self {
        Self {
            user_id: Some(actor.id.clone()),
            user_name: actor.name.clone(),
            action: action.to_owned(),
            date: Utc::now(),
        }
    }
}

/// An entity carrying an append-only audit trail.
pub trait Traceable {
    fn trail_mut(&mut self) -> &mut Vec<TraceEntry>;

    /// Appends one entry. The only mutation the trail ever sees.
    fn append_trace(&mut self, actor: &Actor, action: &str) {
        self.trail_mut().push(TraceEntry::new(actor, action));
    }
}
