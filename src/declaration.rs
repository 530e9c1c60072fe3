//! Declaration records: one trip report filed by a driver
//!
//! Field names mirror the external store documents bit-exact; anything we
//! do not model is carried through untouched in `extra` so a rewrite never
//! drops data entered by other clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid7::uuid7;

use crate::actor::Actor;
use crate::error::ValidationError;
use crate::status::{DeclarationStatus, NA_REFERENCE, is_recovered_flag};
use crate::trace::{Traceable, TraceEntry, actions};

/// Renders the composite business key `DCP/{year}/{month}/{programNumber}`.
pub fn render_reference(year: &str, month: &str, program_number: &str) -> String {
    format!("DCP/{year}/{month}/{program_number}")
}

/// The (year, month, programNumber) components of a program reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramKey {
    pub year: String,
    pub month: String,
    pub number: String,
}

impl ProgramKey {
    pub fn new(year: impl Into<String>, month: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            year: year.into(),
            month: month.into(),
            number: number.into(),
        }
    }

    pub fn render(&self) -> String {
        render_reference(&self.year, &self.month, &self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub id: String,
    /// Rendered reference, kept alongside the components for display.
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub program_number: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub program_reference: Option<String>,
    #[serde(default)]
    pub chauffeur_id: Option<String>,
    #[serde(default)]
    pub chauffeur_name: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub delivery_fees: Option<f64>,
    #[serde(default)]
    pub road_bonus: Option<f64>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: DeclarationStatus,
    /// Raw interop string, either empty or a "recouvr…" spelling. Only
    /// compared through [`is_recovered_flag`], never by equality.
    #[serde(default)]
    pub payment_state: String,
    #[serde(default)]
    pub refusal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub declared_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validated_by: Option<String>,
    #[serde(default)]
    pub payment_recovered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub traceability: Vec<TraceEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Declaration {
    /// The reference rendered from the stored components, used for tier-2
    /// matching. `None` when any component is missing or when the
    /// declaration carries the NA sentinel.
    pub fn rendered_reference(&self) -> Option<String> {
        let year = non_empty(&self.year)?;
        let month = non_empty(&self.month)?;
        let number = non_empty(&self.program_number)?;
        if year == "NA" || month == "NA" || number == "NA" {
            return None;
        }
        Some(render_reference(year, month, number))
    }

    pub fn is_recovered(&self) -> bool {
        is_recovered_flag(&self.payment_state)
    }

    /// True when this declaration is the NA-sentinel kind created for a
    /// recovery without a program reference.
    pub fn is_na_sentinel(&self) -> bool {
        self.program_reference.as_deref() == Some(NA_REFERENCE)
            || self.number == NA_REFERENCE
    }
}

impl Traceable for Declaration {
    fn trail_mut(&mut self) -> &mut Vec<TraceEntry> {
        &mut self.traceability
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Draft for a new declaration, finalised before anything is written.
#[derive(Debug, Default)]
pub struct DeclarationDraft {
    year: Option<String>,
    month: Option<String>,
    program_number: Option<String>,
    chauffeur_id: Option<String>,
    chauffeur_name: Option<String>,
    distance: Option<f64>,
    delivery_fees: Option<f64>,
    road_bonus: Option<f64>,
    notes: String,
}

impl DeclarationDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_program(mut self, key: ProgramKey) -> Self {
        self.year = Some(key.year);
        self.month = Some(key.month);
        self.program_number = Some(key.number);
        self
    }
    pub fn set_chauffeur(mut self, id: &str, name: &str) -> Self {
        self.chauffeur_id = Some(id.to_owned());
        self.chauffeur_name = Some(name.to_owned());
        self
    }
    pub fn set_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }
    pub fn set_delivery_fees(mut self, fees: f64) -> Self {
        self.delivery_fees = Some(fees);
        self
    }
    pub fn set_road_bonus(mut self, bonus: f64) -> Self {
        self.road_bonus = Some(bonus);
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_owned();
        self
    }

    /// Checks required fields and mints the record. Validation failures
    /// leave no trace anywhere since nothing has been written yet.
    pub fn finalise(self, actor: &Actor) -> Result<Declaration, ValidationError> {
        let (Some(year), Some(month), Some(number)) = (
            non_empty(&self.year).map(str::to_owned),
            non_empty(&self.month).map(str::to_owned),
            non_empty(&self.program_number).map(str::to_owned),
        ) else {
            return Err(ValidationError::MissingProgramComponents);
        };
        if self.distance.is_none() {
            return Err(ValidationError::MissingDistance);
        }
        if self.delivery_fees.is_none() {
            return Err(ValidationError::MissingDeliveryFees);
        }

        let reference = render_reference(&year, &month, &number);
        let now = Utc::now();
        let mut declaration = Declaration {
            id: uuid7().to_string(),
            number: reference.clone(),
            program_number: Some(number),
            year: Some(year),
            month: Some(month),
            program_reference: Some(reference),
            chauffeur_id: self.chauffeur_id.or_else(|| Some(actor.id.clone())),
            chauffeur_name: self.chauffeur_name.or_else(|| actor.name.clone()),
            distance: self.distance,
            delivery_fees: self.delivery_fees,
            road_bonus: self.road_bonus,
            notes: self.notes,
            status: DeclarationStatus::Pending,
            payment_state: String::new(),
            refusal_reason: None,
            created_at: now,
            declared_at: Some(now),
            validated_at: None,
            validated_by: None,
            payment_recovered_at: None,
            traceability: vec![],
            extra: serde_json::Map::new(),
        };
        declaration.append_trace(actor, actions::DECLARATION_CREATED);
        Ok(declaration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;

    fn driver() -> Actor {
        Actor::new("u1", "Karim", Role::Chauffeur)
    }

    #[test]
    fn finalise_requires_distance_and_fees() {
        let draft = DeclarationDraft::new().set_program(ProgramKey::new("24", "03", "0007"));
        assert!(matches!(
            draft.finalise(&driver()),
            Err(ValidationError::MissingDistance)
        ));
    }

    #[test]
    fn finalise_renders_the_reference() {
        let declaration = DeclarationDraft::new()
            .set_program(ProgramKey::new("24", "03", "0007"))
            .set_distance(120.0)
            .set_delivery_fees(15_000.0)
            .finalise(&driver())
            .unwrap();
        assert_eq!(declaration.number, "DCP/24/03/0007");
        assert_eq!(declaration.rendered_reference().as_deref(), Some("DCP/24/03/0007"));
        assert_eq!(declaration.traceability.len(), 1);
        assert_eq!(declaration.chauffeur_id.as_deref(), Some("u1"));
    }

    #[test]
    fn store_field_names_are_preserved() {
        let declaration = DeclarationDraft::new()
            .set_program(ProgramKey::new("24", "03", "0007"))
            .set_distance(120.0)
            .set_delivery_fees(15_000.0)
            .finalise(&driver())
            .unwrap();
        let doc = serde_json::to_value(&declaration).unwrap();
        assert!(doc.get("programNumber").is_some());
        assert!(doc.get("paymentState").is_some());
        assert!(doc.get("traceability").is_some());
        assert_eq!(doc["status"], "en_cours");
    }

    #[test]
    fn unknown_fields_round_trip() {
        let raw = serde_json::json!({
            "id": "d1",
            "createdAt": "2024-03-01T10:00:00Z",
            "photos": ["a.jpg"],
            "status": "valide"
        });
        let declaration: Declaration = serde_json::from_value(raw).unwrap();
        assert_eq!(declaration.status, DeclarationStatus::Validated);
        let back = serde_json::to_value(&declaration).unwrap();
        assert_eq!(back["photos"][0], "a.jpg");
    }
}
