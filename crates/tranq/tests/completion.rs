//! Commit/rollback processing, callback ordering, and rollback-only markers.

use tranq::{binding, Error, TransactionDefinition, Tranq};
use tranq_test::{orchestrator, orchestrator_with, Probe};

#[test]
fn callbacks_fire_in_registration_order() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let _a = Probe::registered("a", &trace)?;
    let _b = Probe::registered("b", &trace)?;
    let _c = Probe::registered("c", &trace)?;

    orchestrator.commit(&mut status)?;
    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "a.before_commit(read_only=false)",
            "b.before_commit(read_only=false)",
            "c.before_commit(read_only=false)",
            "a.before_completion",
            "b.before_completion",
            "c.before_completion",
            "commit",
            "a.after_commit",
            "b.after_commit",
            "c.after_commit",
            "a.after_completion(committed)",
            "b.after_completion(committed)",
            "c.after_completion(committed)",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn before_commit_reports_read_only() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status =
        orchestrator.get_transaction(&TransactionDefinition::new().read_only(true))?;
    let _a = Probe::registered("a", &trace)?;

    orchestrator.commit(&mut status)?;
    assert!(trace
        .events()
        .contains(&"a.before_commit(read_only=true)".to_string()));
    Ok(())
}

#[test]
fn local_rollback_only_commit_matches_direct_rollback() -> anyhow::Result<()> {
    // marker then commit
    let via_marker = {
        let orchestrator = orchestrator();
        let trace = orchestrator.manager().trace();
        let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
        let _a = Probe::registered("a", &trace)?;
        status.set_rollback_only();
        assert!(status.is_rollback_only());
        orchestrator.commit(&mut status)?;
        trace.events()
    };

    // direct rollback
    let via_rollback = {
        let orchestrator = orchestrator();
        let trace = orchestrator.manager().trace();
        let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
        let _a = Probe::registered("a", &trace)?;
        orchestrator.rollback(&mut status)?;
        trace.events()
    };

    assert_eq!(via_marker, via_rollback);
    assert_eq!(
        via_marker,
        vec![
            "begin",
            "a.before_completion",
            "rollback",
            "a.after_completion(rolled back)",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn global_rollback_only_diverts_commit() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let _a = Probe::registered("a", &trace)?;

    // any participant can doom the transaction mid-flow
    orchestrator.manager().mark_rollback_only();

    let err = orchestrator.commit(&mut status).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRollback(_)));
    assert!(status.is_completed());
    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "a.before_completion",
            "rollback",
            "a.after_completion(rolled back)",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn manager_may_opt_into_committing_rollback_only() -> anyhow::Result<()> {
    let orchestrator = orchestrator_with_manager_opt_in();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    orchestrator.manager().mark_rollback_only();

    // the physical commit happens; the unexpected outcome is still reported
    let err = orchestrator.commit(&mut status).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRollback(_)));
    assert!(trace.events().contains(&"commit".to_string()));
    Ok(())
}

fn orchestrator_with_manager_opt_in() -> tranq::TransactionOrchestrator<tranq_test::MockManager> {
    tranq::TransactionOrchestrator::new(
        tranq_test::MockManager::new().with_commit_on_global_rollback_only(),
    )
}

#[test]
fn participant_rollback_dooms_outer_by_default() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let mut inner = orchestrator.get_transaction(&TransactionDefinition::new())?;

    orchestrator.rollback(&mut inner)?;
    assert!(trace.events().contains(&"set_rollback_only".to_string()));

    let err = orchestrator.commit(&mut outer).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRollback(_)));
    Ok(())
}

#[test]
fn participant_rollback_defers_to_originator_when_configured() -> anyhow::Result<()> {
    let orchestrator =
        orchestrator_with(Tranq::new().global_rollback_on_participation_failure(false));
    let trace = orchestrator.manager().trace();

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let mut inner = orchestrator.get_transaction(&TransactionDefinition::new())?;

    orchestrator.rollback(&mut inner)?;
    assert!(!trace.events().contains(&"set_rollback_only".to_string()));

    // the originator decides; commit goes through
    orchestrator.commit(&mut outer)?;
    assert!(trace.events().contains(&"commit".to_string()));
    Ok(())
}

#[test]
fn participant_marker_dooms_outer_even_when_deferring() -> anyhow::Result<()> {
    let orchestrator =
        orchestrator_with(Tranq::new().global_rollback_on_participation_failure(false));

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let mut inner = orchestrator.get_transaction(&TransactionDefinition::new())?;

    inner.set_rollback_only();
    orchestrator.commit(&mut inner)?;

    let err = orchestrator.commit(&mut outer).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRollback(_)));
    Ok(())
}

#[test]
fn unexpected_rollback_surfaces_at_outermost_boundary_by_default() -> anyhow::Result<()> {
    let orchestrator = orchestrator();

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let mut inner = orchestrator.get_transaction(&TransactionDefinition::new())?;

    orchestrator.manager().mark_rollback_only();
    // the participating scope completes quietly
    orchestrator.commit(&mut inner)?;

    let err = orchestrator.commit(&mut outer).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRollback(_)));
    Ok(())
}

#[test]
fn fail_early_surfaces_unexpected_rollback_at_participant() -> anyhow::Result<()> {
    let orchestrator = orchestrator_with(Tranq::new().fail_early_on_global_rollback_only(true));

    let mut outer = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let mut inner = orchestrator.get_transaction(&TransactionDefinition::new())?;

    orchestrator.manager().mark_rollback_only();
    let err = orchestrator.commit(&mut inner).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRollback(_)));

    let err = orchestrator.commit(&mut outer).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRollback(_)));
    Ok(())
}

#[test]
fn after_completion_errors_do_not_stop_later_synchronizations() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let a = Probe::registered("a", &trace)?;
    let _b = Probe::registered("b", &trace)?;

    a.fail_next_after_completion();
    orchestrator.commit(&mut status)?;

    let events = trace.events();
    assert!(events.contains(&"a.after_completion(committed)".to_string()));
    assert!(events.contains(&"b.after_completion(committed)".to_string()));
    Ok(())
}

#[test]
fn after_commit_error_reaches_caller_after_commit_completes() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let a = Probe::registered("a", &trace)?;
    let _b = Probe::registered("b", &trace)?;

    a.fail_next_after_commit();
    let err = orchestrator.commit(&mut status).unwrap_err();
    assert!(matches!(err, Error::Synchronization(_)));

    // the transaction is committed and completion reported it so
    let events = trace.events();
    assert!(events.contains(&"commit".to_string()));
    assert!(events.contains(&"a.after_completion(committed)".to_string()));
    assert!(events.contains(&"b.after_completion(committed)".to_string()));
    assert!(status.is_completed());
    Ok(())
}

#[test]
fn before_commit_error_diverts_to_rollback() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let a = Probe::registered("a", &trace)?;

    a.fail_next_before_commit();
    let err = orchestrator.commit(&mut status).unwrap_err();
    assert!(matches!(err, Error::Synchronization(_)));
    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "a.before_commit(read_only=false)",
            "a.before_completion",
            "rollback",
            "a.after_completion(rolled back)",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn before_completion_errors_are_logged_not_propagated() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let a = Probe::registered("a", &trace)?;

    a.fail_next_before_completion();
    orchestrator.commit(&mut status)?;
    assert!(trace.events().contains(&"commit".to_string()));
    Ok(())
}

#[test]
fn commit_failure_reports_unknown_outcome_by_default() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let _a = Probe::registered("a", &trace)?;

    orchestrator.manager().fail_next_commit();
    let err = orchestrator.commit(&mut status).unwrap_err();
    assert!(matches!(err, Error::System { .. }));
    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "a.before_commit(read_only=false)",
            "a.before_completion",
            "a.after_completion(unknown)",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn commit_failure_rolls_back_when_configured() -> anyhow::Result<()> {
    let orchestrator = orchestrator_with(Tranq::new().rollback_on_commit_failure(true));
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let _a = Probe::registered("a", &trace)?;

    orchestrator.manager().fail_next_commit();
    let err = orchestrator.commit(&mut status).unwrap_err();
    assert!(matches!(err, Error::System { .. }));
    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "a.before_commit(read_only=false)",
            "a.before_completion",
            "rollback",
            "a.after_completion(rolled back)",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn prepare_failure_aborts_commit() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let _a = Probe::registered("a", &trace)?;

    orchestrator.manager().fail_next_prepare();
    let err = orchestrator.commit(&mut status).unwrap_err();
    assert!(matches!(err, Error::Resource(_)));
    // the commit was never attempted; before_commit never fired
    assert_eq!(
        trace.events(),
        vec![
            "begin",
            "a.before_completion",
            "rollback",
            "a.after_completion(rolled back)",
            "cleanup",
        ]
    );
    Ok(())
}

#[test]
fn rollback_failure_reports_unknown_outcome() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let _a = Probe::registered("a", &trace)?;

    orchestrator.manager().fail_next_rollback();
    let err = orchestrator.rollback(&mut status).unwrap_err();
    assert!(matches!(err, Error::System { .. }));
    assert!(trace
        .events()
        .contains(&"a.after_completion(unknown)".to_string()));
    assert!(status.is_completed());
    Ok(())
}

#[test]
fn completing_twice_is_an_illegal_state() -> anyhow::Result<()> {
    let orchestrator = orchestrator();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    orchestrator.commit(&mut status)?;

    let err = orchestrator.commit(&mut status).unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));
    let err = orchestrator.rollback(&mut status).unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));
    Ok(())
}

#[test]
fn execute_commits_on_success() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let value = orchestrator.execute(&TransactionDefinition::new(), |_status| Ok(17))?;
    assert_eq!(value, 17);
    assert_eq!(trace.events(), vec!["begin", "commit", "cleanup"]);
    Ok(())
}

#[test]
fn execute_rolls_back_on_error() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let err = orchestrator
        .execute::<(), _>(&TransactionDefinition::new(), |_status| {
            Err(Error::Usage("boom".into()))
        })
        .unwrap_err();
    assert!(matches!(err, Error::Usage(_)));
    assert_eq!(trace.events(), vec!["begin", "rollback", "cleanup"]);
    Ok(())
}

#[test]
fn flush_reaches_registered_synchronizations() -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let trace = orchestrator.manager().trace();

    let mut status = orchestrator.get_transaction(&TransactionDefinition::new())?;
    let _a = Probe::registered("a", &trace)?;
    let _b = Probe::registered("b", &trace)?;

    status.flush();
    assert_eq!(trace.events(), vec!["begin", "a.flush", "b.flush"]);

    orchestrator.commit(&mut status)?;
    assert!(!binding::is_synchronization_active());
    Ok(())
}
