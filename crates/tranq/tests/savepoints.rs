//! Nested transactions and savepoint handling.

use tranq::{Error, Propagation, TransactionDefinition, Tranq};
use tranq_test::{orchestrator, MockManager};

fn nested_orchestrator(manager: MockManager) -> tranq::TransactionOrchestrator<MockManager> {
    Tranq::new().nested_transactions(true).build(manager)
}

#[test]
fn nested_scope_holds_a_savepoint() -> anyhow::Result<()> {
    let orchestrator = nested_orchestrator(MockManager::new());
    let trace = orchestrator.manager().trace();

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let mut inner = orchestrator
        .get_transaction(&TransactionDefinition::new().propagation(Propagation::Nested))?;

    assert!(!inner.is_new_transaction());
    assert!(!inner.is_new_synchronization());
    assert!(inner.has_savepoint());

    inner.set_rollback_only();
    orchestrator.rollback(&mut inner)?;
    assert!(inner.is_completed());
    assert!(!inner.has_savepoint());

    // the outer transaction stays live and committable
    orchestrator.commit(&mut outer)?;
    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "savepoint.create(sp1)",
            "savepoint.rollback(sp1)",
            "savepoint.release(sp1)",
            "commit",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn nested_commit_releases_the_savepoint() -> anyhow::Result<()> {
    let orchestrator = nested_orchestrator(MockManager::new());
    let trace = orchestrator.manager().trace();

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let mut inner = orchestrator
        .get_transaction(&TransactionDefinition::new().propagation(Propagation::Nested))?;

    orchestrator.commit(&mut inner)?;
    orchestrator.commit(&mut outer)?;

    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "savepoint.create(sp1)",
            "savepoint.release(sp1)",
            "commit",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn nested_is_rejected_unless_enabled() -> anyhow::Result<()> {
    let orchestrator = orchestrator();

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let err = orchestrator
        .get_transaction(&TransactionDefinition::new().propagation(Propagation::Nested))
        .unwrap_err();
    assert!(matches!(err, Error::NestedNotSupported(_)));

    orchestrator.rollback(&mut outer)?;
    Ok(())
}

#[test]
fn nested_requires_savepoint_support() -> anyhow::Result<()> {
    let orchestrator = nested_orchestrator(MockManager::new().without_savepoints());

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let err = orchestrator
        .get_transaction(&TransactionDefinition::new().propagation(Propagation::Nested))
        .unwrap_err();
    assert!(matches!(err, Error::NestedNotSupported(_)));

    orchestrator.rollback(&mut outer)?;
    Ok(())
}

#[test]
fn nested_without_existing_transaction_begins_fresh() -> anyhow::Result<()> {
    let orchestrator = nested_orchestrator(MockManager::new());
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator
        .get_transaction(&TransactionDefinition::new().propagation(Propagation::Nested))?;
    assert!(status.is_new_transaction());
    assert!(!status.has_savepoint());

    orchestrator.commit(&mut status)?;
    assert_eq!(trace.events(), vec!["begin", "commit", "cleanup"]);
    Ok(())
}

#[test]
fn native_nested_begins_a_physical_transaction() -> anyhow::Result<()> {
    let orchestrator = nested_orchestrator(MockManager::new().native_nested());
    let trace = orchestrator.manager().trace();

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let mut inner = orchestrator
        .get_transaction(&TransactionDefinition::new().propagation(Propagation::Nested))?;
    assert!(inner.is_new_transaction());
    assert!(!inner.has_savepoint());

    orchestrator.commit(&mut inner)?;
    orchestrator.commit(&mut outer)?;

    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "begin(depth=1)",
            "commit",
            "cleanup",
            "commit",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn explicit_savepoint_round_trip_leaves_outer_committable() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;

    let savepoint = orchestrator.create_savepoint(&mut status)?;
    orchestrator.rollback_to_savepoint(&mut status, &savepoint)?;
    orchestrator.release_savepoint(&mut status, savepoint)?;

    orchestrator.commit(&mut status)?;
    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "savepoint.create(sp1)",
            "savepoint.rollback(sp1)",
            "savepoint.release(sp1)",
            "commit",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn savepoint_requires_a_transaction() -> anyhow::Result<()> {
    let orchestrator = orchestrator();

    let mut status = orchestrator
        .get_transaction(&TransactionDefinition::new().propagation(Propagation::Supports))?;
    let err = orchestrator.create_savepoint(&mut status).unwrap_err();
    assert!(matches!(err, Error::Usage(_)));

    orchestrator.commit(&mut status)?;
    Ok(())
}

#[test]
fn savepoint_requires_manager_support() -> anyhow::Result<()> {
    let orchestrator =
        tranq::TransactionOrchestrator::new(MockManager::new().without_savepoints());

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let err = orchestrator.create_savepoint(&mut status).unwrap_err();
    assert!(matches!(err, Error::NestedNotSupported(_)));

    orchestrator.rollback(&mut status)?;
    Ok(())
}
