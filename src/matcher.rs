//! Tiered payment-to-declaration matching
//!
//! A receipt may arrive before, after, or without an explicit link to its
//! declaration, so linking is an ordered list of pure strategies composed
//! first-match-wins:
//!
//! 1. direct id: `declarationId` equals the declaration's id,
//! 2. reference: no `declarationId`, but `programReference` equals the
//!    declaration's rendered `DCP/{year}/{month}/{programNumber}`,
//! 3. field tuple: no link at all, but (programNumber, year, month) match
//!    and the payment's author identity matches the declaration's driver.
//!
//! When several declarations satisfy tier 2 or 3 (duplicate program
//! numbers across years), the most recently created declaration wins and
//! the ambiguity is logged. A receipt matching nothing stays unmatched;
//! that is a normal outcome, not an error.

use crate::declaration::{Declaration, non_empty};
use crate::payment::PaymentReceipt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    DirectId,
    ProgramReference,
    FieldTuple,
}

#[derive(Debug)]
pub struct Match<'a> {
    pub declaration: &'a Declaration,
    pub tier: MatchTier,
}

type Strategy = fn(&PaymentReceipt, &Declaration) -> bool;

const STRATEGIES: [(MatchTier, Strategy); 3] = [
    (MatchTier::DirectId, by_direct_id),
    (MatchTier::ProgramReference, by_reference),
    (MatchTier::FieldTuple, by_field_tuple),
];

fn by_direct_id(payment: &PaymentReceipt, declaration: &Declaration) -> bool {
    payment.linked_declaration() == Some(declaration.id.as_str())
}

fn by_reference(payment: &PaymentReceipt, declaration: &Declaration) -> bool {
    if payment.linked_declaration().is_some() {
        return false;
    }
    match (non_empty(&payment.program_reference), declaration.rendered_reference()) {
        (Some(reference), Some(rendered)) => reference == rendered,
        _ => false,
    }
}

fn by_field_tuple(payment: &PaymentReceipt, declaration: &Declaration) -> bool {
    if payment.linked_declaration().is_some() {
        return false;
    }
    let tuple_matches = component_eq(&payment.program_number, &declaration.program_number)
        && component_eq(&payment.year, &declaration.year)
        && component_eq(&payment.month, &declaration.month);
    if !tuple_matches {
        return false;
    }
    // the tuple alone is too weak, the author identity must line up too
    let Some(chauffeur) = non_empty(&declaration.chauffeur_id) else {
        return false;
    };
    non_empty(&payment.chauffeur_id) == Some(chauffeur)
        || non_empty(&payment.created_by) == Some(chauffeur)
}

fn component_eq(a: &Option<String>, b: &Option<String>) -> bool {
    match (non_empty(a), non_empty(b)) {
        // "NA" is the unknown-identity sentinel and never matches
        (Some(a), Some(b)) => a != "NA" && a == b,
        _ => false,
    }
}

/// Finds the declaration a payment belongs to. Pure and deterministic over
/// the given declaration set.
pub fn match_payment<'a>(
    payment: &PaymentReceipt,
    declarations: &'a [Declaration],
) -> Option<Match<'a>> {
    for (tier, strategy) in STRATEGIES {
        let mut candidates: Vec<&Declaration> = declarations
            .iter()
            .filter(|declaration| strategy(payment, declaration))
            .collect();
        if candidates.is_empty() {
            continue;
        }
        if candidates.len() > 1 {
            tracing::warn!(
                payment = %payment.id,
                tier = ?tier,
                candidates = candidates.len(),
                "ambiguous payment match, taking the most recently created declaration"
            );
        }
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let declaration = candidates.pop()?;
        return Some(Match { declaration, tier });
    }
    None
}

/// The subset of `payments` that resolve to `declaration` when matched
/// against the full declaration set.
pub fn related_payments<'a>(
    declaration: &Declaration,
    declarations: &[Declaration],
    payments: &'a [PaymentReceipt],
) -> Vec<&'a PaymentReceipt> {
    payments
        .iter()
        .filter(|payment| {
            match_payment(payment, declarations)
                .is_some_and(|found| found.declaration.id == declaration.id)
        })
        .collect()
}
