//! Payment receipts entered by cashiers, optionally linked to a declaration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid7::uuid7;

use crate::actor::Actor;
use crate::declaration::{ProgramKey, non_empty};
use crate::status::PaymentStatus;
use crate::trace::{Traceable, TraceEntry, actions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub id: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Amount in FCFA. Stored under the original French field name.
    #[serde(rename = "montant", default)]
    pub amount: f64,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub program_reference: Option<String>,
    #[serde(default)]
    pub program_number: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
    /// Explicit link to the owning declaration. Absent for receipts that
    /// only carry a reference or a field tuple, and for orphans.
    #[serde(default)]
    pub declaration_id: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: PaymentStatus,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub chauffeur_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub traceability: Vec<TraceEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PaymentReceipt {
    pub fn linked_declaration(&self) -> Option<&str> {
        non_empty(&self.declaration_id)
    }
}

impl Traceable for PaymentReceipt {
    fn trail_mut(&mut self) -> &mut Vec<TraceEntry> {
        &mut self.traceability
    }
}

/// Draft for a new receipt. Receipts start with no amount and no company;
/// those become mandatory at validation time, not at creation.
#[derive(Debug, Default)]
pub struct PaymentDraft {
    photo_url: Option<String>,
    year: Option<String>,
    month: Option<String>,
    program_number: Option<String>,
    program_reference: Option<String>,
    declaration_id: Option<String>,
    chauffeur_id: Option<String>,
    notes: String,
}

impl PaymentDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_photo_url(mut self, url: &str) -> Self {
        self.photo_url = Some(url.to_owned());
        self
    }
    pub fn set_program(mut self, key: ProgramKey) -> Self {
        self.program_reference = Some(key.render());
        self.year = Some(key.year);
        self.month = Some(key.month);
        self.program_number = Some(key.number);
        self
    }
    pub fn set_program_reference(mut self, reference: &str) -> Self {
        self.program_reference = Some(reference.to_owned());
        self
    }
    pub fn set_declaration_id(mut self, id: &str) -> Self {
        self.declaration_id = Some(id.to_owned());
        self
    }
    pub fn set_chauffeur_id(mut self, id: &str) -> Self {
        self.chauffeur_id = Some(id.to_owned());
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_owned();
        self
    }

    pub fn finalise(self, actor: &Actor) -> PaymentReceipt {
        let mut receipt = PaymentReceipt {
            id: uuid7().to_string(),
            photo_url: self.photo_url,
            amount: 0.0,
            company_id: None,
            company_name: None,
            program_reference: self.program_reference,
            program_number: self.program_number,
            year: self.year,
            month: self.month,
            declaration_id: self.declaration_id,
            notes: self.notes,
            status: PaymentStatus::Draft,
            created_by: Some(actor.id.clone()),
            chauffeur_id: self.chauffeur_id,
            created_at: Utc::now(),
            validated_at: None,
            traceability: vec![],
            extra: serde_json::Map::new(),
        };
        receipt.append_trace(actor, actions::RECEIPT_CREATED);
        receipt
    }
}
