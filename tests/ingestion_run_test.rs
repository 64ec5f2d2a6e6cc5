use ibkr_flex_ledger::ingestion::{IngestionError, IngestionRunRepository, RunStatus, RunType};

mod common;

#[test]
fn test_concurrent_triggers_reject_second_run() {
    let pool = common::get_db_connection_pool();
    let runs = IngestionRunRepository::new(pool.clone());

    let first = runs
        .create_started("U123", RunType::Manual, "2026-02-12", "Q1", None)
        .unwrap();
    assert_eq!(first.status, "started");

    let second = runs.create_started("U123", RunType::Scheduled, "2026-02-12", "Q1", None);
    match second {
        Err(IngestionError::RunAlreadyActive) => {}
        other => panic!("expected RunAlreadyActive, got {:?}", other.map(|r| r.status)),
    }

    // No new run row was created on rejection.
    let recent = runs.get_recent_runs("U123", 10).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, first.id);
}

#[test]
fn test_finalize_releases_lock_and_records_terminal_state() {
    let pool = common::get_db_connection_pool();
    let runs = IngestionRunRepository::new(pool.clone());

    let run = runs
        .create_started("U123", RunType::Manual, "2026-02-12", "Q1", None)
        .unwrap();
    let finalized = runs
        .finalize(
            &run.id,
            RunStatus::Failed,
            None,
            Some("INGESTION_POLL_TIMEOUT"),
            Some("Flex statement polling timed out after 7 attempts"),
            &[],
        )
        .unwrap();

    assert_eq!(finalized.status, "failed");
    assert_eq!(
        finalized.error_code.as_deref(),
        Some("INGESTION_POLL_TIMEOUT")
    );
    assert!(finalized.ended_at_utc.is_some());
    assert!(finalized.duration_ms.is_some());
    assert!(runs.get_active_run("U123").unwrap().is_none());

    // The lock is free again.
    let next = runs
        .create_started("U123", RunType::Manual, "2026-02-13", "Q1", None)
        .unwrap();
    assert_eq!(next.status, "started");
}

#[test]
fn test_finalize_rejects_non_terminal_status() {
    let pool = common::get_db_connection_pool();
    let runs = IngestionRunRepository::new(pool.clone());

    let run = runs
        .create_started("U123", RunType::Manual, "2026-02-12", "Q1", None)
        .unwrap();
    assert!(runs
        .finalize(&run.id, RunStatus::Started, None, None, None, &[])
        .is_err());
}

#[test]
fn test_lock_is_per_account() {
    let pool = common::get_db_connection_pool();
    let runs = IngestionRunRepository::new(pool.clone());

    runs.create_started("U123", RunType::Manual, "2026-02-12", "Q1", None)
        .unwrap();
    // A different account is unaffected by the first account's lock.
    let other = runs
        .create_started("U999", RunType::Manual, "2026-02-12", "Q1", None)
        .unwrap();
    assert_eq!(other.status, "started");
}
