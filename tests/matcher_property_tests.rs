//! Property-based tests for payment-to-declaration matching
//!
//! This module uses the proptest crate to verify the matcher's invariants
//! across a wide range of randomly generated inputs:
//!
//! - an explicit declarationId always wins, whatever else is on the receipt
//! - matching is deterministic over a given declaration set
//! - ambiguity resolves to the most recently created declaration
//! - an explicit link never falls through to the weaker tiers
//! - a receipt carrying nothing usable matches nothing, without erroring

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use recouvrement::{
    declaration::Declaration,
    matcher::{MatchTier, match_payment},
    payment::PaymentReceipt,
};
use serde_json::json;

// PROPERTY TEST STRATEGIES

/// Strategy to generate a program component: one to four digits, no
/// leading zero so components compare by plain equality
fn component_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[1-9][0-9]{0,3}").unwrap()
}

/// Strategy to generate a (year, month, number) tuple
fn tuple_strategy() -> impl Strategy<Value = (String, String, String)> {
    (component_strategy(), component_strategy(), component_strategy())
}

fn decl_doc(
    id: &str,
    (year, month, number): &(String, String, String),
    chauffeur: &str,
    created_secs: i64,
) -> Declaration {
    serde_json::from_value(json!({
        "id": id,
        "year": year,
        "month": month,
        "programNumber": number,
        "chauffeurId": chauffeur,
        "createdAt": DateTime::<Utc>::from_timestamp(created_secs, 0).unwrap(),
    }))
    .unwrap()
}

fn receipt_doc(overrides: serde_json::Value) -> PaymentReceipt {
    let mut doc = json!({ "id": "p1", "createdAt": "2024-03-05T08:00:00Z" });
    doc.as_object_mut()
        .unwrap()
        .extend(overrides.as_object().unwrap().clone());
    serde_json::from_value(doc).unwrap()
}

fn rendered((year, month, number): &(String, String, String)) -> String {
    format!("DCP/{year}/{month}/{number}")
}

proptest! {
    /// Whatever reference or tuple the receipt also carries, an explicit
    /// declarationId decides the match
    #[test]
    fn direct_id_always_wins(
        tuple_a in tuple_strategy(),
        tuple_b in tuple_strategy(),
    ) {
        let a = decl_doc("d-a", &tuple_a, "u1", 1_000);
        let b = decl_doc("d-b", &tuple_b, "u1", 2_000);
        let payment = receipt_doc(json!({
            "declarationId": "d-a",
            "programReference": rendered(&tuple_b),
            "year": tuple_b.0,
            "month": tuple_b.1,
            "programNumber": tuple_b.2,
            "chauffeurId": "u1",
        }));

        let declarations = [a, b];
        let found = match_payment(&payment, &declarations).unwrap();
        prop_assert_eq!(found.declaration.id.as_str(), "d-a");
        prop_assert_eq!(found.tier, MatchTier::DirectId);
    }

    /// Matching the same receipt against the same declarations twice
    /// produces the same declaration and tier
    #[test]
    fn matching_is_deterministic(
        tuples in prop::collection::vec(tuple_strategy(), 1..6),
        pick in 0usize..6,
        by_reference in prop::bool::ANY,
    ) {
        let declarations: Vec<Declaration> = tuples
            .iter()
            .enumerate()
            .map(|(i, tuple)| decl_doc(&format!("d{i}"), tuple, "u1", 1_000 + i as i64))
            .collect();
        let target = &tuples[pick % tuples.len()];
        let payment = if by_reference {
            receipt_doc(json!({ "programReference": rendered(target) }))
        } else {
            receipt_doc(json!({
                "year": target.0,
                "month": target.1,
                "programNumber": target.2,
                "chauffeurId": "u1",
            }))
        };

        let first = match_payment(&payment, &declarations);
        let second = match_payment(&payment, &declarations);
        match (first, second) {
            (Some(x), Some(y)) => {
                prop_assert_eq!(&x.declaration.id, &y.declaration.id);
                prop_assert_eq!(x.tier, y.tier);
            }
            (None, None) => {}
            _ => prop_assert!(false, "one run matched, the other did not"),
        }
    }

    /// Several declarations sharing a program: the most recently created
    /// one is chosen
    #[test]
    fn ambiguity_resolves_to_newest(
        tuple in tuple_strategy(),
        offsets in prop::collection::vec(0i64..1_000_000, 2..6),
    ) {
        let declarations: Vec<Declaration> = offsets
            .iter()
            .enumerate()
            .map(|(i, offset)| {
                // distinct creation times, ids break the remaining ties
                decl_doc(&format!("d{i}"), &tuple, "u1", offset * 10 + i as i64)
            })
            .collect();
        let expected = declarations
            .iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .unwrap()
            .id
            .clone();
        let payment = receipt_doc(json!({ "programReference": rendered(&tuple) }));

        let found = match_payment(&payment, &declarations).unwrap();
        prop_assert_eq!(&found.declaration.id, &expected);
    }

    /// A dangling declarationId matches nothing rather than falling back
    /// to the reference or the tuple
    #[test]
    fn dangling_link_never_falls_through(tuple in tuple_strategy()) {
        let declaration = decl_doc("d1", &tuple, "u1", 1_000);
        let payment = receipt_doc(json!({
            "declarationId": "no-such-declaration",
            "programReference": rendered(&tuple),
            "year": tuple.0,
            "month": tuple.1,
            "programNumber": tuple.2,
            "chauffeurId": "u1",
        }));

        prop_assert!(match_payment(&payment, &[declaration]).is_none());
    }

    /// A receipt with no link, no reference and no tuple stays unmatched
    /// against any declaration set
    #[test]
    fn empty_receipt_matches_nothing(
        tuples in prop::collection::vec(tuple_strategy(), 0..6),
    ) {
        let declarations: Vec<Declaration> = tuples
            .iter()
            .enumerate()
            .map(|(i, tuple)| decl_doc(&format!("d{i}"), tuple, "u1", 1_000 + i as i64))
            .collect();
        let payment = receipt_doc(json!({}));

        prop_assert!(match_payment(&payment, &declarations).is_none());
    }
}
