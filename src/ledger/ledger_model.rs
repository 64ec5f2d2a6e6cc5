use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

fn parse_decimal(field: &str, value: &str) -> Decimal {
    Decimal::from_str(value).unwrap_or_else(|e| {
        log::error!("Failed to parse {} '{}': {}", field, value, e);
        Decimal::ZERO
    })
}

/// Domain model for one FIFO position lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionLot {
    pub id: String,
    pub account_id: String,
    pub instrument_id: String,
    pub open_event_trade_fill_id: String,
    pub opened_at_utc: DateTime<Utc>,
    pub closed_at_utc: Option<DateTime<Utc>>,
    pub open_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub open_price: Decimal,
    pub cost_basis_open: Decimal,
    pub realized_pnl_to_date: Decimal,
    pub status: String,
}

/// Database model for position lots
#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::position_lots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PositionLotDB {
    pub id: String,
    pub account_id: String,
    pub instrument_id: String,
    pub open_event_trade_fill_id: String,
    pub opened_at_utc: NaiveDateTime,
    pub closed_at_utc: Option<NaiveDateTime>,
    pub open_quantity: String,
    pub remaining_quantity: String,
    pub open_price: String,
    pub cost_basis_open: String,
    pub realized_pnl_to_date: String,
    pub status: String,
    pub created_at_utc: NaiveDateTime,
    pub updated_at_utc: NaiveDateTime,
}

impl From<PositionLotDB> for PositionLot {
    fn from(db: PositionLotDB) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            instrument_id: db.instrument_id,
            open_event_trade_fill_id: db.open_event_trade_fill_id,
            opened_at_utc: DateTime::from_naive_utc_and_offset(db.opened_at_utc, Utc),
            closed_at_utc: db
                .closed_at_utc
                .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc)),
            open_quantity: parse_decimal("open_quantity", &db.open_quantity),
            remaining_quantity: parse_decimal("remaining_quantity", &db.remaining_quantity),
            open_price: parse_decimal("open_price", &db.open_price),
            cost_basis_open: parse_decimal("cost_basis_open", &db.cost_basis_open),
            realized_pnl_to_date: parse_decimal(
                "realized_pnl_to_date",
                &db.realized_pnl_to_date,
            ),
            status: db.status,
        }
    }
}

/// UPSERT request for one position lot with a deterministic identity.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionLotUpsert {
    pub id: String,
    pub account_id: String,
    pub instrument_id: String,
    pub open_event_trade_fill_id: String,
    pub opened_at_utc: DateTime<Utc>,
    pub closed_at_utc: Option<DateTime<Utc>>,
    pub open_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub open_price: Decimal,
    pub cost_basis_open: Decimal,
    pub realized_pnl_to_date: Decimal,
    pub status: String,
}

/// Domain model for one daily per-instrument P&L snapshot row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlSnapshotDaily {
    pub id: String,
    pub account_id: String,
    pub report_date_local: NaiveDate,
    pub instrument_id: String,
    pub position_qty: Decimal,
    pub cost_basis: Option<Decimal>,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub fees: Decimal,
    pub withholding_tax: Decimal,
    pub currency: String,
    pub provisional: bool,
    pub valuation_source: String,
    pub fx_source: String,
    pub ingestion_run_id: Option<String>,
}

/// Database model for daily snapshots
#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::pnl_snapshots_daily)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PnlSnapshotDailyDB {
    pub id: String,
    pub account_id: String,
    pub report_date_local: String,
    pub instrument_id: String,
    pub position_qty: String,
    pub cost_basis: Option<String>,
    pub realized_pnl: String,
    pub unrealized_pnl: String,
    pub total_pnl: String,
    pub fees: String,
    pub withholding_tax: String,
    pub currency: String,
    pub provisional: bool,
    pub valuation_source: String,
    pub fx_source: String,
    pub ingestion_run_id: Option<String>,
    pub created_at_utc: NaiveDateTime,
    pub updated_at_utc: NaiveDateTime,
}

impl From<PnlSnapshotDailyDB> for PnlSnapshotDaily {
    fn from(db: PnlSnapshotDailyDB) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            report_date_local: NaiveDate::parse_from_str(&db.report_date_local, "%Y-%m-%d")
                .unwrap_or_else(|e| {
                    log::error!(
                        "Failed to parse snapshot date '{}': {}",
                        db.report_date_local,
                        e
                    );
                    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
                }),
            instrument_id: db.instrument_id,
            position_qty: parse_decimal("position_qty", &db.position_qty),
            cost_basis: db
                .cost_basis
                .as_deref()
                .map(|raw| parse_decimal("cost_basis", raw)),
            realized_pnl: parse_decimal("realized_pnl", &db.realized_pnl),
            unrealized_pnl: parse_decimal("unrealized_pnl", &db.unrealized_pnl),
            total_pnl: parse_decimal("total_pnl", &db.total_pnl),
            fees: parse_decimal("fees", &db.fees),
            withholding_tax: parse_decimal("withholding_tax", &db.withholding_tax),
            currency: db.currency,
            provisional: db.provisional,
            valuation_source: db.valuation_source,
            fx_source: db.fx_source,
            ingestion_run_id: db.ingestion_run_id,
        }
    }
}

/// UPSERT request keyed by (account, report date, instrument).
#[derive(Debug, Clone, PartialEq)]
pub struct PnlSnapshotUpsert {
    pub account_id: String,
    pub report_date_local: NaiveDate,
    pub instrument_id: String,
    pub position_qty: Decimal,
    pub cost_basis: Option<Decimal>,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub fees: Decimal,
    pub withholding_tax: Decimal,
    pub currency: String,
    pub provisional: bool,
    pub valuation_source: String,
    pub fx_source: String,
    pub ingestion_run_id: Option<String>,
}

/// Summary of one snapshot build, reported on the snapshot stage.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SnapshotBuildResult {
    pub report_date_local: NaiveDate,
    pub snapshot_count: usize,
    pub position_lot_count: usize,
    pub provisional_count: usize,
}
