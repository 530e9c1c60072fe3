#![allow(warnings)]

// Walks the full recovery workflow against a throwaway sled db: a driver
// files a declaration, a planner validates it, a cashier enters and
// validates a receipt, marks the declaration recovered and finally
// receives the receipt. Run with `cargo run --example workflow`.

use std::sync::Arc;

use recouvrement::actor::{Actor, Role};
use recouvrement::declaration::{DeclarationDraft, ProgramKey};
use recouvrement::payment::PaymentDraft;
use recouvrement::service::RecoveryService;
use recouvrement::store::SledStore;

fn main() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let db = Arc::new(sled::open(temp.path().join("workflow.db"))?);
    let service = RecoveryService::new(Arc::new(SledStore::open(db)?));

    let driver = Actor::new("u1", "Karim", Role::Chauffeur);
    let planner = Actor::new("pl1", "Sophie", Role::Planificateur);
    let cashier = Actor::new("c1", "Nadia", Role::CaissierInterne);

    let declaration = service.create_declaration(
        DeclarationDraft::new()
            .set_program(ProgramKey::new("24", "03", "0007"))
            .set_distance(420.0)
            .set_delivery_fees(150_000.0)
            .set_notes("Douala -> Yaoundé"),
        &driver,
    )?;
    println!("declared {} ({:?})", declaration.number, declaration.status);

    let declaration = service.validate_declaration(&declaration.id, &planner)?;
    println!("validated by {} -> {:?}", planner.id, declaration.status);

    // the receipt only names the program, matching links it up
    let payment = service.create_payment(
        PaymentDraft::new().set_program_reference("DCP/24/03/0007"),
        &cashier,
    )?;
    let payment = service.validate_payment(&payment.id, 250_000.0, "comp1", None, &cashier)?;
    println!("receipt {} validated for {} FCFA", payment.id, payment.amount);

    let declaration = service.mark_recovered(&declaration.id, &cashier)?;
    let payment = service.receive_payment(&payment.id, &cashier)?;
    println!("recovered: {}, receipt {:?}", declaration.is_recovered(), payment.status);

    let view = service.recovery_view(&declaration.id)?;
    println!(
        "{} related receipt(s), {} FCFA recovered",
        view.related.len(),
        view.recovered_amount
    );

    for entry in &declaration.traceability {
        println!("  {} - {} ({})", entry.date, entry.action, entry.user_id.as_deref().unwrap_or("?"));
    }

    Ok(())
}
