//! Service layer API for the recovery workflow
//!
//! `RecoveryService` is the reconciliation engine: it keeps an in-memory
//! snapshot of both collections fed by the store's change feeds, exposes
//! every user action (validate, reject, mark recovered, undo, receive,
//! delete), and recomputes recovery aggregates on every read. Writes go
//! through the store one document at a time; the snapshot is updated
//! optimistically and the next feed event is authoritative.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid7::uuid7;

use crate::actor::{Actor, Role};
use crate::declaration::{Declaration, DeclarationDraft, ProgramKey, non_empty};
use crate::error::{AuthError, StoreError, TransitionError, ValidationError};
use crate::matcher::match_payment;
use crate::payment::{PaymentDraft, PaymentReceipt};
use crate::recovery::{RecoveryView, aggregate};
use crate::resolver::{Notification, resolve};
use crate::status::{DeclarationStatus, NA_REFERENCE, PaymentStatus, RECOVERED_FLAG};
use crate::store::{RecordStore, Subscription};
use crate::trace::{Traceable, actions};

#[derive(Debug, Default, Clone)]
struct Snapshot {
    declarations: Vec<Declaration>,
    payments: Vec<PaymentReceipt>,
}

pub struct RecoveryService {
    store: Arc<dyn RecordStore>,
    snapshot: Arc<RwLock<Snapshot>>,
    _subscriptions: Vec<Subscription>,
}

impl RecoveryService {
    /// Subscribes to both collection feeds and primes the snapshot. The
    /// feeds are independent and unsynchronized; a payment arriving before
    /// its declaration simply stays unmatched until the declaration shows
    /// up in a later event.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let snapshot = Arc::new(RwLock::new(Snapshot::default()));

        let declarations_snapshot = snapshot.clone();
        let declarations_feed = store.subscribe_declarations(Box::new(move |items| {
            write_lock(&declarations_snapshot).declarations = items;
        }));

        let payments_snapshot = snapshot.clone();
        let payments_feed = store.subscribe_payments(Box::new(move |items| {
            write_lock(&payments_snapshot).payments = items;
        }));

        Self {
            store,
            snapshot,
            _subscriptions: vec![declarations_feed, payments_feed],
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Driver files a trip report. Missing distance or delivery fees fail
    /// validation before anything is written.
    pub fn create_declaration(
        &self,
        draft: DeclarationDraft,
        actor: &Actor,
    ) -> anyhow::Result<Declaration> {
        allow(actor, matches!(actor.role, Role::Chauffeur | Role::Admin), "create declarations")?;
        let declaration = draft.finalise(actor)?;
        self.store.put_declaration(&declaration)?;
        self.remember_declaration(&declaration);
        tracing::info!(declaration = %declaration.id, number = %declaration.number, "declaration created");
        Ok(declaration)
    }

    /// Planner approves a declaration. Terminal on the approval axis.
    pub fn validate_declaration(&self, id: &str, actor: &Actor) -> anyhow::Result<Declaration> {
        allow(
            actor,
            matches!(actor.role, Role::Planificateur | Role::Admin),
            "validate declarations",
        )?;
        let mut declaration = self.load_declaration(id)?;
        if !declaration.status.approval_open() {
            return Err(
                TransitionError::ApprovalClosed(declaration.status.as_store_str().into()).into(),
            );
        }
        declaration.status = DeclarationStatus::Validated;
        declaration.validated_at = Some(Utc::now());
        declaration.validated_by = Some(actor.id.clone());
        declaration.append_trace(actor, actions::DECLARATION_VALIDATED);
        self.store.put_declaration(&declaration)?;
        self.remember_declaration(&declaration);
        tracing::info!(declaration = %id, actor = %actor.id, "declaration validated");
        Ok(declaration)
    }

    pub fn reject_declaration(
        &self,
        id: &str,
        reason: Option<&str>,
        actor: &Actor,
    ) -> anyhow::Result<Declaration> {
        allow(
            actor,
            matches!(actor.role, Role::Planificateur | Role::Admin),
            "reject declarations",
        )?;
        let mut declaration = self.load_declaration(id)?;
        if !declaration.status.approval_open() {
            return Err(
                TransitionError::ApprovalClosed(declaration.status.as_store_str().into()).into(),
            );
        }
        declaration.status = DeclarationStatus::Rejected;
        declaration.refusal_reason = reason.map(str::to_owned);
        declaration.append_trace(actor, actions::DECLARATION_REJECTED);
        self.store.put_declaration(&declaration)?;
        self.remember_declaration(&declaration);
        tracing::info!(declaration = %id, actor = %actor.id, "declaration rejected");
        Ok(declaration)
    }

    /// Driver-side tracking: moves between en_cours, en_route and
    /// en_panne only. Does not touch the approval or payment axes.
    pub fn update_tracking(
        &self,
        id: &str,
        target: DeclarationStatus,
        actor: &Actor,
    ) -> anyhow::Result<Declaration> {
        allow(actor, matches!(actor.role, Role::Chauffeur | Role::Admin), "update tracking")?;
        let mut declaration = self.load_declaration(id)?;
        if actor.role == Role::Chauffeur
            && non_empty(&declaration.chauffeur_id) != Some(actor.id.as_str())
        {
            return Err(AuthError::NotOwner { action: "track" }.into());
        }
        if !declaration.status.is_tracking() || !target.is_tracking() {
            return Err(TransitionError::TrackingOnly.into());
        }
        declaration.status = target;
        declaration.append_trace(actor, actions::TRACKING_UPDATED);
        self.store.put_declaration(&declaration)?;
        self.remember_declaration(&declaration);
        Ok(declaration)
    }

    // ------------------------------------------------------------------
    // Recovery (cashier actions on declarations)
    // ------------------------------------------------------------------

    /// Marks the declaration recovered. The flag is authoritative and set
    /// only here; aggregation never infers it from payment statuses.
    /// Calling this twice keeps the flag and the original recovery time
    /// and appends one trace entry per call.
    pub fn mark_recovered(&self, id: &str, actor: &Actor) -> anyhow::Result<Declaration> {
        allow(
            actor,
            actor.role.is_caissier() || actor.role == Role::Admin,
            "mark declarations recovered",
        )?;
        let declaration = self.load_declaration(id)?;
        let declaration = self.apply_recovery(declaration, actor)?;
        self.link_orphan_payments(&declaration)?;
        Ok(declaration)
    }

    /// Privileged undo of a recovery. Clears the flag and its timestamp;
    /// the trail keeps both the mark and the revocation.
    pub fn undo_recovered(&self, id: &str, actor: &Actor) -> anyhow::Result<Declaration> {
        allow(actor, actor.role.is_privileged(), "revoke recoveries")?;
        let mut declaration = self.load_declaration(id)?;
        if !declaration.is_recovered() {
            return Err(TransitionError::NotRecovered.into());
        }
        declaration.payment_state = String::new();
        declaration.payment_recovered_at = None;
        declaration.append_trace(actor, actions::RECOVERY_REVOKED);
        self.store.put_declaration(&declaration)?;
        self.remember_declaration(&declaration);
        tracing::info!(declaration = %id, actor = %actor.id, "recovery revoked");
        Ok(declaration)
    }

    /// Cashier entry point for a recovery keyed by program components.
    /// Reuses the matching declaration when one exists, otherwise creates
    /// one already marked recovered. `None` components produce the
    /// DCP/NA/NA/NA sentinel and never merge with an existing sentinel
    /// declaration: NA means unknown identity.
    pub fn create_recouvrement(
        &self,
        program: Option<ProgramKey>,
        notes: &str,
        actor: &Actor,
    ) -> anyhow::Result<Declaration> {
        allow(
            actor,
            actor.role.is_caissier() || actor.role == Role::Admin,
            "create recoveries",
        )?;

        if let Some(key) = &program
            && let Some(existing) = self
                .store
                .declarations()?
                .into_iter()
                .find(|declaration| has_components(declaration, key))
        {
            let declaration = self.apply_recovery(existing, actor)?;
            self.link_orphan_payments(&declaration)?;
            return Ok(declaration);
        }

        let reference = program
            .as_ref()
            .map(ProgramKey::render)
            .unwrap_or_else(|| NA_REFERENCE.to_owned());
        let now = Utc::now();
        let mut declaration = Declaration {
            id: uuid7().to_string(),
            number: reference.clone(),
            program_number: program.as_ref().map(|key| key.number.clone()),
            year: program.as_ref().map(|key| key.year.clone()),
            month: program.as_ref().map(|key| key.month.clone()),
            program_reference: Some(reference),
            chauffeur_id: None,
            chauffeur_name: None,
            distance: None,
            delivery_fees: None,
            road_bonus: None,
            notes: notes.to_owned(),
            status: DeclarationStatus::Pending,
            payment_state: RECOVERED_FLAG.to_owned(),
            refusal_reason: None,
            created_at: now,
            declared_at: None,
            validated_at: None,
            validated_by: None,
            payment_recovered_at: Some(now),
            traceability: vec![],
            extra: serde_json::Map::new(),
        };
        declaration.append_trace(actor, actions::RECOVERY_CREATED);
        self.store.put_declaration(&declaration)?;
        self.remember_declaration(&declaration);
        self.link_orphan_payments(&declaration)?;
        tracing::info!(declaration = %declaration.id, number = %declaration.number, "recouvrement created");
        Ok(declaration)
    }

    fn apply_recovery(
        &self,
        mut declaration: Declaration,
        actor: &Actor,
    ) -> anyhow::Result<Declaration> {
        // a repeat mark keeps the original recovery time
        if !declaration.is_recovered() {
            declaration.payment_recovered_at = Some(Utc::now());
        }
        declaration.payment_state = RECOVERED_FLAG.to_owned();
        declaration.append_trace(actor, actions::DECLARATION_RECOVERED);
        self.store.put_declaration(&declaration)?;
        self.remember_declaration(&declaration);
        tracing::info!(declaration = %declaration.id, actor = %actor.id, "declaration marked recovered");
        Ok(declaration)
    }

    /// Attaches receipts that carry no explicit link but name this
    /// declaration's program (or the NA sentinel, for sentinel
    /// declarations). Author identity is not required here: the cashier
    /// explicitly targeted this program.
    fn link_orphan_payments(&self, declaration: &Declaration) -> anyhow::Result<()> {
        for mut payment in self.store.payments()? {
            if payment.linked_declaration().is_some() {
                continue;
            }
            let matches = if declaration.is_na_sentinel() {
                payment.program_reference.as_deref() == Some(NA_REFERENCE)
            } else {
                components_eq(&payment.year, &declaration.year)
                    && components_eq(&payment.month, &declaration.month)
                    && components_eq(&payment.program_number, &declaration.program_number)
            };
            if !matches {
                continue;
            }
            payment.declaration_id = Some(declaration.id.clone());
            self.store.put_payment(&payment)?;
            self.remember_payment(&payment);
            tracing::debug!(payment = %payment.id, declaration = %declaration.id, "orphan receipt linked");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    pub fn create_payment(
        &self,
        draft: PaymentDraft,
        actor: &Actor,
    ) -> anyhow::Result<PaymentReceipt> {
        allow(actor, actor.role != Role::Planificateur, "create receipts")?;
        let payment = draft.finalise(actor);
        self.store.put_payment(&payment)?;
        self.remember_payment(&payment);
        Ok(payment)
    }

    /// Cashier validates a receipt: amount and company become mandatory
    /// here. Validation failures happen before the load, so a bad call
    /// leaves no state change and no trace entry.
    pub fn validate_payment(
        &self,
        id: &str,
        amount: f64,
        company_id: &str,
        company_name: Option<&str>,
        actor: &Actor,
    ) -> anyhow::Result<PaymentReceipt> {
        allow(
            actor,
            actor.role.is_caissier() || actor.role == Role::Admin,
            "validate receipts",
        )?;
        if amount <= 0.0 {
            return Err(ValidationError::MissingAmount.into());
        }
        if company_id.trim().is_empty() {
            return Err(ValidationError::MissingCompany.into());
        }
        let mut payment = self.load_payment(id)?;
        if payment.status != PaymentStatus::Draft {
            return Err(TransitionError::NotDraft(payment.status.as_store_str().into()).into());
        }
        payment.amount = amount;
        payment.company_id = Some(company_id.to_owned());
        payment.company_name = company_name.map(str::to_owned);
        payment.status = PaymentStatus::Validated;
        payment.validated_at = Some(Utc::now());
        payment.append_trace(actor, actions::RECEIPT_VALIDATED);
        self.store.put_payment(&payment)?;
        self.remember_payment(&payment);
        tracing::info!(payment = %id, actor = %actor.id, "receipt validated");
        Ok(payment)
    }

    /// Privileged undo: validated back to draft, trace kept.
    pub fn undo_payment_validation(
        &self,
        id: &str,
        actor: &Actor,
    ) -> anyhow::Result<PaymentReceipt> {
        allow(actor, actor.role.is_privileged(), "revoke receipt validations")?;
        let mut payment = self.load_payment(id)?;
        if payment.status != PaymentStatus::Validated {
            return Err(TransitionError::NotValidated(payment.status.as_store_str().into()).into());
        }
        payment.status = PaymentStatus::Draft;
        payment.validated_at = None;
        payment.append_trace(actor, actions::RECEIPT_VALIDATION_REVOKED);
        self.store.put_payment(&payment)?;
        self.remember_payment(&payment);
        Ok(payment)
    }

    /// Marks a validated receipt as received. Only permitted once the
    /// matched declaration carries the recovered flag.
    pub fn receive_payment(&self, id: &str, actor: &Actor) -> anyhow::Result<PaymentReceipt> {
        allow(
            actor,
            actor.role.is_caissier() || actor.role == Role::Admin,
            "receive receipts",
        )?;
        let mut payment = self.load_payment(id)?;
        if payment.status != PaymentStatus::Validated {
            return Err(TransitionError::NotValidated(payment.status.as_store_str().into()).into());
        }
        let declarations = self.store.declarations()?;
        let recovered = match_payment(&payment, &declarations)
            .map(|found| found.declaration.is_recovered())
            .unwrap_or(false);
        if !recovered {
            return Err(TransitionError::DeclarationNotRecovered.into());
        }
        payment.status = PaymentStatus::Received;
        payment.append_trace(actor, actions::RECEIPT_RECEIVED);
        self.store.put_payment(&payment)?;
        self.remember_payment(&payment);
        Ok(payment)
    }

    /// Cancels a draft receipt. Terminal.
    pub fn cancel_payment(&self, id: &str, actor: &Actor) -> anyhow::Result<PaymentReceipt> {
        allow(
            actor,
            actor.role.is_caissier() || actor.role == Role::Admin,
            "cancel receipts",
        )?;
        let mut payment = self.load_payment(id)?;
        if payment.status != PaymentStatus::Draft {
            return Err(TransitionError::NotDraft(payment.status.as_store_str().into()).into());
        }
        payment.status = PaymentStatus::Cancelled;
        payment.append_trace(actor, actions::RECEIPT_CANCELLED);
        self.store.put_payment(&payment)?;
        self.remember_payment(&payment);
        Ok(payment)
    }

    /// Deletes a receipt, enforcing both the role rules and the stored
    /// status rule (validated/received receipts are never deletable).
    pub fn delete_payment(&self, id: &str, actor: &Actor) -> anyhow::Result<()> {
        let payment = self.load_payment(id)?;
        match actor.role {
            Role::Planificateur => {
                return Err(AuthError::RoleNotPermitted {
                    role: actor.role,
                    action: "delete receipts",
                }
                .into());
            }
            Role::Chauffeur => {
                let owner = non_empty(&payment.created_by) == Some(actor.id.as_str())
                    || non_empty(&payment.chauffeur_id) == Some(actor.id.as_str());
                if !owner {
                    return Err(AuthError::NotOwner { action: "delete" }.into());
                }
            }
            Role::CaissierInterne | Role::CaissierExterne | Role::Admin => {}
        }
        // the store re-checks the stored status before removing
        self.store.delete_payment(id)?;
        self.forget_payment(id);
        tracing::info!(payment = %id, actor = %actor.id, "receipt deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Recomputes the recovery view for a declaration from the current
    /// snapshot. Never cached across writes.
    pub fn recovery_view(&self, declaration_id: &str) -> anyhow::Result<RecoveryView> {
        let snapshot = read_lock(&self.snapshot);
        let declaration = snapshot
            .declarations
            .iter()
            .find(|declaration| declaration.id == declaration_id)
            .ok_or_else(|| StoreError::NotFound(declaration_id.to_owned()))?;
        Ok(aggregate(declaration, &snapshot.declarations, &snapshot.payments))
    }

    /// Best-effort, read-only notification resolution against the current
    /// snapshot. `None` means the caller shows the raw message.
    pub fn resolve_notification(&self, notification: &Notification) -> Option<Declaration> {
        let snapshot = read_lock(&self.snapshot);
        resolve(notification, &snapshot.declarations).cloned()
    }

    pub fn declarations(&self) -> Vec<Declaration> {
        read_lock(&self.snapshot).declarations.clone()
    }

    pub fn payments(&self) -> Vec<PaymentReceipt> {
        read_lock(&self.snapshot).payments.clone()
    }

    /// Receipt visibility per role: admins, internal cashiers and planners
    /// see everything; external users only their company's receipts;
    /// drivers without a company only their own.
    pub fn payments_for_user(&self, actor: &Actor) -> Vec<PaymentReceipt> {
        let payments = read_lock(&self.snapshot).payments.clone();
        match actor.role {
            Role::Admin | Role::CaissierInterne | Role::Planificateur => payments,
            Role::CaissierExterne => match &actor.company_id {
                Some(company) => payments
                    .into_iter()
                    .filter(|payment| payment.company_id.as_deref() == Some(company.as_str()))
                    .collect(),
                None => vec![],
            },
            Role::Chauffeur => match &actor.company_id {
                Some(company) => payments
                    .into_iter()
                    .filter(|payment| payment.company_id.as_deref() == Some(company.as_str()))
                    .collect(),
                None => payments
                    .into_iter()
                    .filter(|payment| {
                        non_empty(&payment.chauffeur_id) == Some(actor.id.as_str())
                            || non_empty(&payment.created_by) == Some(actor.id.as_str())
                    })
                    .collect(),
            },
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn load_declaration(&self, id: &str) -> anyhow::Result<Declaration> {
        let declaration = self.store.get_declaration(id)?;
        Ok(declaration.ok_or_else(|| StoreError::NotFound(id.to_owned()))?)
    }

    fn load_payment(&self, id: &str) -> anyhow::Result<PaymentReceipt> {
        let payment = self.store.get_payment(id)?;
        Ok(payment.ok_or_else(|| StoreError::NotFound(id.to_owned()))?)
    }

    fn remember_declaration(&self, declaration: &Declaration) {
        let mut snapshot = write_lock(&self.snapshot);
        if let Some(pos) = snapshot
            .declarations
            .iter()
            .position(|existing| existing.id == declaration.id)
        {
            snapshot.declarations[pos] = declaration.clone();
        } else {
            snapshot.declarations.push(declaration.clone());
        }
    }

    fn remember_payment(&self, payment: &PaymentReceipt) {
        let mut snapshot = write_lock(&self.snapshot);
        if let Some(pos) = snapshot
            .payments
            .iter()
            .position(|existing| existing.id == payment.id)
        {
            snapshot.payments[pos] = payment.clone();
        } else {
            snapshot.payments.push(payment.clone());
        }
    }

    fn forget_payment(&self, id: &str) {
        write_lock(&self.snapshot)
            .payments
            .retain(|payment| payment.id != id);
    }
}

fn allow(actor: &Actor, permitted: bool, action: &'static str) -> Result<(), AuthError> {
    if permitted {
        Ok(())
    } else {
        Err(AuthError::RoleNotPermitted {
            role: actor.role,
            action,
        })
    }
}

fn has_components(declaration: &Declaration, key: &ProgramKey) -> bool {
    non_empty(&declaration.year) == Some(key.year.as_str())
        && non_empty(&declaration.month) == Some(key.month.as_str())
        && non_empty(&declaration.program_number) == Some(key.number.as_str())
        && key.number != "NA"
}

fn components_eq(a: &Option<String>, b: &Option<String>) -> bool {
    match (non_empty(a), non_empty(b)) {
        (Some(a), Some(b)) => a != "NA" && a == b,
        _ => false,
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
