use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;

use ibkr_flex_ledger::events::EventRepository;
use ibkr_flex_ledger::ingestion::{
    IngestionRunRepository, IngestionService, ReprocessScope, ReprocessService, RunType,
};
use ibkr_flex_ledger::instruments::InstrumentRepository;
use ibkr_flex_ledger::ledger::{resolve_report_date_local, LedgerRepository, SnapshotService};
use ibkr_flex_ledger::statements::StatementRepository;
use ibkr_flex_ledger::valuation::ValuationService;

mod common;

struct Pipeline {
    runs: Arc<IngestionRunRepository>,
    statements: Arc<StatementRepository>,
    instruments: Arc<InstrumentRepository>,
    events: Arc<EventRepository>,
    ledger: Arc<LedgerRepository>,
    snapshots: Arc<SnapshotService>,
    ingestion: IngestionService,
    reprocess: ReprocessService,
}

fn build_pipeline(payload: Vec<u8>) -> Pipeline {
    let pool = common::get_db_connection_pool();
    let settings = common::test_settings();

    let runs = Arc::new(IngestionRunRepository::new(pool.clone()));
    let statements = Arc::new(StatementRepository::new(pool.clone()));
    let instruments = Arc::new(InstrumentRepository::new(pool.clone()));
    let events = Arc::new(EventRepository::new(pool.clone()));
    let ledger = Arc::new(LedgerRepository::new(pool.clone()));
    let valuation = Arc::new(ValuationService::new(statements.clone(), events.clone()));
    let snapshots = Arc::new(SnapshotService::new(
        events.clone(),
        instruments.clone(),
        valuation,
        ledger.clone(),
    ));

    let flex = Arc::new(common::MockFlexClient::new(payload));
    let ingestion = IngestionService::new(
        &settings,
        flex,
        runs.clone(),
        statements.clone(),
        instruments.clone(),
        events.clone(),
        snapshots.clone(),
    );
    let reprocess = ReprocessService::new(
        &settings,
        runs.clone(),
        statements.clone(),
        instruments.clone(),
        events.clone(),
        snapshots.clone(),
    );

    Pipeline {
        runs,
        statements,
        instruments,
        events,
        ledger,
        snapshots,
        ingestion,
        reprocess,
    }
}

#[test]
fn test_full_ingestion_produces_events_lots_and_snapshot() {
    let pipeline = build_pipeline(common::sample_statement_xml());

    let run = tokio_test::block_on(pipeline.ingestion.trigger_ingestion(RunType::Manual)).unwrap();
    assert_eq!(run.status, "success");
    assert!(run.error_code.is_none());
    assert!(run.report_date_local.is_some());

    let stages: Vec<&str> = run
        .diagnostics
        .iter()
        .map(|event| event.stage.as_str())
        .collect();
    for stage in [
        "request",
        "poll",
        "download",
        "persist",
        "canonical_mapping",
        "snapshot",
    ] {
        assert!(stages.contains(&stage), "missing stage {}", stage);
    }

    // Canonical events landed.
    let today = resolve_report_date_local(Utc::now());
    let fills = pipeline
        .events
        .get_trade_fills_through_date("U123", today)
        .unwrap();
    assert_eq!(fills.len(), 2);
    let cashflows = pipeline
        .events
        .get_cashflows_through_date("U123", today)
        .unwrap();
    assert_eq!(cashflows.len(), 1);
    assert_eq!(cashflows[0].amount, dec!(10.00));

    // One instrument, identified by conid.
    let instrument = pipeline
        .instruments
        .find_by_conid("U123", "42")
        .unwrap()
        .expect("instrument upserted");

    // FIFO outcome of the partial close: one open lot with 60 remaining.
    let lots = pipeline
        .ledger
        .get_lots_for_instrument("U123", &instrument.id)
        .unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].remaining_quantity, dec!(60));
    assert_eq!(lots[0].open_quantity, dec!(100));
    assert_eq!(lots[0].status, "open");

    // Snapshot math: realized 199.00, cost basis 3000.60, mark from the
    // last trade price (provisional fallback).
    let snapshot = pipeline
        .ledger
        .get_snapshot("U123", today, &instrument.id)
        .unwrap()
        .expect("snapshot row persisted");
    assert_eq!(snapshot.position_qty, dec!(60));
    assert_eq!(snapshot.realized_pnl, dec!(199.00));
    assert_eq!(snapshot.cost_basis, Some(dec!(3000.60)));
    assert_eq!(snapshot.total_pnl, snapshot.realized_pnl + snapshot.unrealized_pnl);
    assert_eq!(snapshot.valuation_source, "trade_price_on_or_before");
    assert!(snapshot.provisional);
    assert_eq!(snapshot.ingestion_run_id.as_deref(), Some(run.id.as_str()));
}

#[test]
fn test_identical_payload_reingest_dedupes_and_skips_mapping() {
    let pipeline = build_pipeline(common::sample_statement_xml());

    let first = tokio_test::block_on(pipeline.ingestion.trigger_ingestion(RunType::Manual)).unwrap();
    assert_eq!(first.status, "success");

    let second =
        tokio_test::block_on(pipeline.ingestion.trigger_ingestion(RunType::Scheduled)).unwrap();
    assert_eq!(second.status, "success");

    let persist = second
        .diagnostics
        .iter()
        .find(|event| event.stage == "persist" && event.status == "success")
        .expect("persist stage recorded");
    assert_eq!(persist.payload["artifact_deduped"], serde_json::json!(true));
    assert_eq!(persist.payload["raw_rows_inserted"], serde_json::json!(0));

    let mapping = second
        .diagnostics
        .iter()
        .find(|event| event.stage == "canonical_mapping")
        .expect("canonical_mapping stage recorded");
    assert_eq!(mapping.status, "skipped");
    assert_eq!(
        mapping.payload["canonical_skip_reason"],
        serde_json::json!("no_new_raw_rows_for_run")
    );

    // Still exactly one artifact's worth of raw rows and two fills.
    let today = resolve_report_date_local(Utc::now());
    let fills = pipeline
        .events
        .get_trade_fills_through_date("U123", today)
        .unwrap();
    assert_eq!(fills.len(), 2);
}

#[test]
fn test_missing_trades_section_fails_with_section_name() {
    let payload = br#"<FlexQueryResponse><FlexStatements count="1">
      <FlexStatement accountId="U123" reportDate="2026-02-12">
        <AccountInformation accountId="U123" />
        <SecuritiesInfo />
        <OpenPositions />
        <CashTransactions />
        <CorporateActions />
        <ConversionRates />
      </FlexStatement>
    </FlexStatements></FlexQueryResponse>"#
        .to_vec();
    let pipeline = build_pipeline(payload);

    let run = tokio_test::block_on(pipeline.ingestion.trigger_ingestion(RunType::Manual)).unwrap();
    assert_eq!(run.status, "failed");
    assert_eq!(run.error_code.as_deref(), Some("MISSING_REQUIRED_SECTION"));

    let persist = run
        .diagnostics
        .iter()
        .find(|event| event.stage == "persist" && event.status == "failed")
        .expect("failed persist stage recorded");
    assert_eq!(
        persist.payload["missing_sections"],
        serde_json::json!(["Trades"])
    );
}

#[test]
fn test_reprocess_converges_to_identical_canonical_state() {
    let pipeline = build_pipeline(common::sample_statement_xml());

    let ingest = tokio_test::block_on(pipeline.ingestion.trigger_ingestion(RunType::Manual)).unwrap();
    assert_eq!(ingest.status, "success");

    let today = resolve_report_date_local(Utc::now());
    let fills_before = pipeline
        .events
        .get_trade_fills_through_date("U123", today)
        .unwrap();
    let snapshots_before = pipeline.ledger.get_snapshots_for_date("U123", today).unwrap();

    let replay = tokio_test::block_on(
        pipeline.reprocess.trigger_reprocess(ReprocessScope::default()),
    )
    .unwrap();
    assert_eq!(replay.status, "success");
    assert_eq!(replay.run_type, "reprocess");

    let fills_after = pipeline
        .events
        .get_trade_fills_through_date("U123", today)
        .unwrap();
    assert_eq!(fills_before.len(), fills_after.len());
    for (before, after) in fills_before.iter().zip(fills_after.iter()) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.ib_exec_id, after.ib_exec_id);
        assert_eq!(before.quantity, after.quantity);
        assert_eq!(before.price, after.price);
        assert_eq!(before.commission, after.commission);
        // Provenance of the earliest observation survives the replay.
        assert_eq!(before.ingestion_run_id, after.ingestion_run_id);
    }

    let snapshots_after = pipeline.ledger.get_snapshots_for_date("U123", today).unwrap();
    assert_eq!(snapshots_before.len(), snapshots_after.len());
    for (before, after) in snapshots_before.iter().zip(snapshots_after.iter()) {
        assert_eq!(before.instrument_id, after.instrument_id);
        assert_eq!(before.position_qty, after.position_qty);
        assert_eq!(before.realized_pnl, after.realized_pnl);
        assert_eq!(before.unrealized_pnl, after.unrealized_pnl);
        assert_eq!(before.total_pnl, after.total_pnl);
        assert_eq!(before.cost_basis, after.cost_basis);
        assert_eq!(before.valuation_source, after.valuation_source);
        assert_eq!(before.fx_source, after.fx_source);
    }

    // Snapshot ownership moved to the reprocess run; values did not.
    assert_eq!(
        snapshots_after[0].ingestion_run_id.as_deref(),
        Some(replay.id.as_str())
    );
}

#[test]
fn test_snapshot_service_is_idempotent_for_same_inputs() {
    let pipeline = build_pipeline(common::sample_statement_xml());
    let run = tokio_test::block_on(pipeline.ingestion.trigger_ingestion(RunType::Manual)).unwrap();
    assert_eq!(run.status, "success");

    let now = Utc::now();
    let first = pipeline
        .snapshots
        .build_and_persist("U123", Some(&run.id), now, "USD")
        .unwrap();
    let second = pipeline
        .snapshots
        .build_and_persist("U123", Some(&run.id), now, "USD")
        .unwrap();
    assert_eq!(first, second);

    let today = resolve_report_date_local(now);
    let snapshots = pipeline.ledger.get_snapshots_for_date("U123", today).unwrap();
    assert_eq!(snapshots.len(), first.snapshot_count);

    // Lock state untouched by snapshot reruns.
    assert!(pipeline.runs.get_active_run("U123").unwrap().is_none());
    // Statement store still holds the single artifact's rows.
    assert!(!pipeline.statements.get_rows_for_run(&run.id).unwrap().is_empty());
}
