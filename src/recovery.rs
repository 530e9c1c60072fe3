//! Recovery aggregation, derived for viewing purposes
//!
//! Recomputed on every read against the current snapshot and never cached:
//! the only persisted recovery fact is the declaration's own
//! `paymentState` flag, set by an explicit cashier action.

use crate::declaration::Declaration;
use crate::matcher::related_payments;
use crate::payment::PaymentReceipt;
use crate::status::PaymentStatus;

/// Ephemeral view of a declaration's payment situation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryView {
    /// Receipts the matcher resolves to this declaration.
    pub related: Vec<PaymentReceipt>,
    /// How many of them are validated.
    pub validated_count: usize,
    /// Sum of amounts across validated and received receipts.
    pub recovered_amount: f64,
    /// The authoritative flag. Deliberately NOT derived from the payments:
    /// a declaration whose receipts are all validated still shows
    /// unrecovered until a cashier marks it.
    pub is_recovered: bool,
}

pub fn aggregate(
    declaration: &Declaration,
    declarations: &[Declaration],
    payments: &[PaymentReceipt],
) -> RecoveryView {
    let related = related_payments(declaration, declarations, payments);
    let validated_count = related
        .iter()
        .filter(|payment| payment.status == PaymentStatus::Validated)
        .count();
    let recovered_amount = related
        .iter()
        .filter(|payment| payment.status.recovery_eligible())
        .map(|payment| payment.amount)
        .sum();
    RecoveryView {
        related: related.into_iter().cloned().collect(),
        validated_count,
        recovered_amount,
        is_recovered: declaration.is_recovered(),
    }
}
