//! Property-based tests for status canonicalization, the recovered flag
//! and the audit trail
//!
//! Invariants verified across randomly generated inputs:
//!
//! - canonicalization never panics and is idempotent over the string zoo
//! - the written-back spelling canonicalizes to the same state
//! - the recovered-flag predicate is a case-insensitive prefix check
//! - the audit trail is append-only: prior entries are never touched
//! - aggregation counts exactly the validated and received receipts and
//!   takes the recovered flag from the declaration alone

use proptest::prelude::*;
use recouvrement::{
    actor::{Actor, Role},
    declaration::Declaration,
    payment::PaymentReceipt,
    recovery::aggregate,
    status::{DeclarationStatus, PaymentStatus, is_recovered_flag},
    trace::{Traceable, actions},
};
use serde_json::json;

// PROPERTY TEST STRATEGIES

/// Strategy covering the spellings seen in stored documents plus noise
fn raw_status_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("validee".to_owned()),
        Just("validated".to_owned()),
        Just("valide".to_owned()),
        Just("brouillon".to_owned()),
        Just("recu".to_owned()),
        Just("annule".to_owned()),
        Just("en_cours".to_owned()),
        Just("en_route".to_owned()),
        Just("en_panne".to_owned()),
        Just("refuse".to_owned()),
        "[a-zA-Z_ ]{0,12}",
    ]
}

fn action_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(actions::DECLARATION_VALIDATED),
        Just(actions::RECOVERY_CREATED),
        Just(actions::RECOVERY_REVOKED),
        Just(actions::RECEIPT_VALIDATED),
        Just(actions::RECEIPT_RECEIVED),
    ]
}

fn payment_strategy() -> impl Strategy<Value = PaymentReceipt> {
    (0.0f64..1_000_000.0, raw_status_strategy(), "[a-z0-9]{4}").prop_map(
        |(amount, status, id)| {
            serde_json::from_value(json!({
                "id": id,
                "declarationId": "d1",
                "montant": amount,
                "status": status,
                "createdAt": "2024-03-05T08:00:00Z",
            }))
            .unwrap()
        },
    )
}

proptest! {
    /// Canonicalization accepts any string and reaches a fixed point in
    /// one step
    #[test]
    fn canonicalization_is_total_and_idempotent(raw in raw_status_strategy()) {
        let payment = PaymentStatus::canonicalize(&raw);
        prop_assert_eq!(PaymentStatus::canonicalize(payment.as_store_str()), payment);

        let declaration = DeclarationStatus::canonicalize(&raw);
        prop_assert_eq!(
            DeclarationStatus::canonicalize(declaration.as_store_str()),
            declaration
        );
    }

    /// Any casing of the flag with any suffix reads as recovered
    #[test]
    fn recovered_flag_accepts_spelling_variants(
        caps in prop::collection::vec(prop::bool::ANY, 8),
        suffix in "[a-zé ]{0,8}",
    ) {
        let spelled: String = "recouvr"
            .chars()
            .zip(caps.iter())
            .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
            .collect();
        let flagged = format!("{spelled}{suffix}");
        prop_assert!(is_recovered_flag(&flagged));
    }

    /// Strings that do not start with the flag prefix never read as
    /// recovered
    #[test]
    fn recovered_flag_rejects_other_states(state in "[a-qs-z_ ]{0,12}") {
        prop_assert!(!is_recovered_flag(&state));
    }

    /// Appending trace entries never rewrites, removes or reorders the
    /// entries already present
    #[test]
    fn trail_is_append_only(
        steps in prop::collection::vec(action_strategy(), 1..20),
    ) {
        let actor = Actor::new("u1", "Karim", Role::CaissierInterne);
        let mut declaration: Declaration = serde_json::from_value(json!({
            "id": "d1",
            "createdAt": "2024-03-01T10:00:00Z",
        }))
        .unwrap();

        for action in steps {
            let before = declaration.traceability.clone();
            declaration.append_trace(&actor, action);
            prop_assert_eq!(declaration.traceability.len(), before.len() + 1);
            prop_assert_eq!(&declaration.traceability[..before.len()], &before[..]);
            prop_assert_eq!(declaration.traceability[before.len()].action.as_str(), action);
        }
    }

    /// The view counts validated receipts, sums the recovery-eligible
    /// amounts and takes the flag from the declaration alone
    #[test]
    fn aggregation_matches_receipt_statuses(
        payments in prop::collection::vec(payment_strategy(), 0..10),
        payment_state in prop_oneof![
            Just("".to_owned()),
            Just("recouvre".to_owned()),
            Just("recouvré".to_owned()),
            Just("valide".to_owned()),
        ],
    ) {
        let declaration: Declaration = serde_json::from_value(json!({
            "id": "d1",
            "paymentState": payment_state.clone(),
            "createdAt": "2024-03-01T10:00:00Z",
        }))
        .unwrap();

        let view = aggregate(&declaration, std::slice::from_ref(&declaration), &payments);

        let expected_validated = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Validated)
            .count();
        let expected_amount: f64 = payments
            .iter()
            .filter(|p| matches!(p.status, PaymentStatus::Validated | PaymentStatus::Received))
            .map(|p| p.amount)
            .sum();

        prop_assert_eq!(view.related.len(), payments.len());
        prop_assert_eq!(view.validated_count, expected_validated);
        prop_assert_eq!(view.recovered_amount, expected_amount);
        prop_assert_eq!(view.is_recovered, is_recovered_flag(&payment_state));
    }
}
