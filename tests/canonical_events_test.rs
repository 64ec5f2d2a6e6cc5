use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;

use ibkr_flex_ledger::events::{
    CashflowUpsert, CorpActionOutcome, CorpActionUpsert, EventRepository, TradeFillUpsert,
    TradeSide,
};
use ibkr_flex_ledger::ingestion::{IngestionRunRepository, RunStatus, RunType};
use ibkr_flex_ledger::instruments::{InstrumentRepository, InstrumentUpsert};
use ibkr_flex_ledger::statements::raw_extraction::extract_payload_rows;
use ibkr_flex_ledger::statements::StatementRepository;

mod common;

struct Fixture {
    runs: IngestionRunRepository,
    events: EventRepository,
    instruments: InstrumentRepository,
    run_id: String,
    raw_record_id: i64,
    instrument_id: String,
}

fn setup() -> Fixture {
    let pool = common::get_db_connection_pool();
    let runs = IngestionRunRepository::new(pool.clone());
    let statements = StatementRepository::new(pool.clone());
    let events = EventRepository::new(pool.clone());
    let instruments = InstrumentRepository::new(pool.clone());

    let run = runs
        .create_started("U123", RunType::Manual, "2026-02-12", "Q1", None)
        .unwrap();
    let payload = common::sample_statement_xml();
    let artifact = statements
        .upsert_artifact(&run.id, "U123", "2026-02-12", "Q1", None, &payload)
        .unwrap();
    let extraction = extract_payload_rows(&payload).unwrap();
    statements
        .insert_raw_rows(
            &run.id,
            &artifact.artifact.id,
            "U123",
            extraction.report_date_local,
            &extraction.rows,
        )
        .unwrap();
    let raw_record_id = statements.get_rows_for_run(&run.id).unwrap()[0].id;

    let instrument = instruments
        .upsert_instrument(&InstrumentUpsert {
            account_id: "U123".to_string(),
            conid: "42".to_string(),
            symbol: "ACME".to_string(),
            local_symbol: None,
            isin: None,
            cusip: None,
            figi: None,
            asset_category: "STK".to_string(),
            currency: "USD".to_string(),
            description: None,
        })
        .unwrap();

    Fixture {
        runs,
        events,
        instruments,
        run_id: run.id,
        raw_record_id,
        instrument_id: instrument.id,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn cashflow_request(fixture: &Fixture, amount: rust_decimal::Decimal, day: u32) -> CashflowUpsert {
    CashflowUpsert {
        account_id: "U123".to_string(),
        instrument_id: Some(fixture.instrument_id.clone()),
        ingestion_run_id: fixture.run_id.clone(),
        source_raw_record_id: fixture.raw_record_id,
        transaction_id: "T7".to_string(),
        cash_action: "DIV".to_string(),
        report_date_local: date(2026, 2, day),
        effective_at_utc: None,
        amount,
        amount_in_base: None,
        currency: "USD".to_string(),
        functional_currency: "USD".to_string(),
        withholding_tax: None,
        fees: None,
    }
}

#[test]
fn test_cashflow_correction_rewrites_amount_and_flags_row() {
    let fixture = setup();

    let first = fixture
        .events
        .upsert_cashflow(&cashflow_request(&fixture, dec!(10.00), 9))
        .unwrap();
    assert!(!first.is_correction);
    assert_eq!(first.amount, dec!(10.00));

    let corrected = fixture
        .events
        .upsert_cashflow(&cashflow_request(&fixture, dec!(12.50), 10))
        .unwrap();
    assert!(corrected.is_correction);
    assert_eq!(corrected.amount, dec!(12.50));
    assert_eq!(corrected.report_date_local, date(2026, 2, 10));
    assert_eq!(corrected.id, first.id);

    let all = fixture
        .events
        .get_cashflows_through_date("U123", date(2026, 12, 31))
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn test_identical_cashflow_duplicate_is_noop() {
    let fixture = setup();

    fixture
        .events
        .upsert_cashflow(&cashflow_request(&fixture, dec!(10.00), 9))
        .unwrap();
    let duplicate = fixture
        .events
        .upsert_cashflow(&cashflow_request(&fixture, dec!(10.00), 9))
        .unwrap();
    assert!(!duplicate.is_correction);
    assert_eq!(duplicate.amount, dec!(10.00));
}

fn trade_request(fixture: &Fixture, run_id: &str, commission: rust_decimal::Decimal) -> TradeFillUpsert {
    TradeFillUpsert {
        account_id: "U123".to_string(),
        instrument_id: fixture.instrument_id.clone(),
        ingestion_run_id: run_id.to_string(),
        source_raw_record_id: fixture.raw_record_id,
        ib_exec_id: "E1".to_string(),
        transaction_id: Some("1001".to_string()),
        trade_timestamp_utc: Utc.with_ymd_and_hms(2026, 2, 10, 14, 30, 0).unwrap(),
        report_date_local: date(2026, 2, 10),
        side: TradeSide::Buy,
        quantity: dec!(100),
        price: dec!(50.00),
        cost: None,
        commission: Some(commission),
        fees: None,
        realized_pnl: None,
        net_cash: Some(dec!(-5001.00)),
        net_cash_in_base: None,
        fx_rate_to_base: None,
        currency: "USD".to_string(),
        functional_currency: "USD".to_string(),
    }
}

#[test]
fn test_trade_fill_upsert_preserves_earliest_run() {
    let fixture = setup();

    let first = fixture
        .events
        .upsert_trade_fill(&trade_request(&fixture, &fixture.run_id, dec!(-1.00)))
        .unwrap();
    assert_eq!(first.ingestion_run_id, fixture.run_id);

    fixture
        .runs
        .finalize(&fixture.run_id, RunStatus::Success, None, None, None, &[])
        .unwrap();
    let second_run = fixture
        .runs
        .create_started("U123", RunType::Manual, "2026-02-13", "Q1", None)
        .unwrap();

    let updated = fixture
        .events
        .upsert_trade_fill(&trade_request(&fixture, &second_run.id, dec!(-1.25)))
        .unwrap();

    // Mutable numeric fields refresh; origin run and identity survive.
    assert_eq!(updated.id, first.id);
    assert_eq!(updated.commission, Some(dec!(-1.25)));
    assert_eq!(updated.ingestion_run_id, fixture.run_id);
    assert_eq!(updated.quantity, dec!(100));
}

fn corp_action_request(
    fixture: &Fixture,
    action_id: Option<&str>,
    transaction_id: Option<&str>,
) -> CorpActionUpsert {
    CorpActionUpsert {
        account_id: "U123".to_string(),
        instrument_id: Some(fixture.instrument_id.clone()),
        conid: "42".to_string(),
        ingestion_run_id: fixture.run_id.clone(),
        source_raw_record_id: fixture.raw_record_id,
        action_id: action_id.map(str::to_string),
        transaction_id: transaction_id.map(str::to_string),
        reorg_code: "FS".to_string(),
        report_date_local: date(2026, 2, 12),
        description: None,
    }
}

#[test]
fn test_corp_action_dual_key_collision_opens_manual_case() {
    let fixture = setup();

    // One row known only by its fallback key, one known by its action id.
    let fallback_only = corp_action_request(&fixture, None, Some("T9"));
    assert_eq!(
        fixture.events.upsert_corp_action(&fallback_only).unwrap(),
        CorpActionOutcome::Inserted
    );
    let primary_only = corp_action_request(&fixture, Some("A1"), Some("T8"));
    assert_eq!(
        fixture.events.upsert_corp_action(&primary_only).unwrap(),
        CorpActionOutcome::Inserted
    );

    // A row matching both keys at once is ambiguous.
    let ambiguous = corp_action_request(&fixture, Some("A1"), Some("T9"));
    assert_eq!(
        fixture.events.upsert_corp_action(&ambiguous).unwrap(),
        CorpActionOutcome::ManualCase
    );

    let flagged = fixture.events.get_manual_case_instrument_ids("U123").unwrap();
    assert_eq!(flagged, vec![fixture.instrument_id.clone()]);
}

#[test]
fn test_corp_action_same_row_reupsert_is_update() {
    let fixture = setup();

    let request = corp_action_request(&fixture, Some("A1"), Some("T9"));
    assert_eq!(
        fixture.events.upsert_corp_action(&request).unwrap(),
        CorpActionOutcome::Inserted
    );
    assert_eq!(
        fixture.events.upsert_corp_action(&request).unwrap(),
        CorpActionOutcome::Updated
    );
    assert!(fixture
        .events
        .get_manual_case_instrument_ids("U123")
        .unwrap()
        .is_empty());
}

#[test]
fn test_instrument_upsert_refreshes_aliases() {
    let fixture = setup();

    let refreshed = fixture
        .instruments
        .upsert_instrument(&InstrumentUpsert {
            account_id: "U123".to_string(),
            conid: "42".to_string(),
            symbol: "ACME2".to_string(),
            local_symbol: Some("ACME LOCAL".to_string()),
            isin: Some("US0000000001".to_string()),
            cusip: None,
            figi: None,
            asset_category: "STK".to_string(),
            currency: "USD".to_string(),
            description: Some("Acme Corp".to_string()),
        })
        .unwrap();

    // conid identity is authoritative; the row is the same.
    assert_eq!(refreshed.id, fixture.instrument_id);
    assert_eq!(refreshed.symbol, "ACME2");
    assert_eq!(refreshed.isin.as_deref(), Some("US0000000001"));
}
