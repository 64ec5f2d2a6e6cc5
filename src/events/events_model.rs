use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Enum representing the side of a trade fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            _ => Err(format!("Unknown trade side: {}", s)),
        }
    }
}

fn parse_decimal(field: &str, value: &str) -> Decimal {
    Decimal::from_str(value).unwrap_or_else(|e| {
        log::error!("Failed to parse {} '{}': {}", field, value, e);
        Decimal::ZERO
    })
}

fn parse_optional_decimal(field: &str, value: &Option<String>) -> Option<Decimal> {
    value.as_ref().map(|raw| parse_decimal(field, raw))
}

fn parse_report_date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap_or_else(|e| {
        log::error!("Failed to parse report date '{}': {}", value, e);
        NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
    })
}

/// Domain model for one trade execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeFill {
    pub id: String,
    pub account_id: String,
    pub instrument_id: String,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub ib_exec_id: String,
    pub transaction_id: Option<String>,
    pub trade_timestamp_utc: DateTime<Utc>,
    pub report_date_local: NaiveDate,
    pub side: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub cost: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub net_cash: Option<Decimal>,
    pub net_cash_in_base: Option<Decimal>,
    pub fx_rate_to_base: Option<Decimal>,
    pub currency: String,
    pub functional_currency: String,
}

/// Database model for trade fills
#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::event_trade_fills)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TradeFillDB {
    pub id: String,
    pub account_id: String,
    pub instrument_id: String,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub ib_exec_id: String,
    pub transaction_id: Option<String>,
    pub trade_timestamp_utc: NaiveDateTime,
    pub report_date_local: String,
    pub side: String,
    pub quantity: String,
    pub price: String,
    pub cost: Option<String>,
    pub commission: Option<String>,
    pub fees: Option<String>,
    pub realized_pnl: Option<String>,
    pub net_cash: Option<String>,
    pub net_cash_in_base: Option<String>,
    pub fx_rate_to_base: Option<String>,
    pub currency: String,
    pub functional_currency: String,
    pub created_at_utc: NaiveDateTime,
    pub updated_at_utc: NaiveDateTime,
}

impl From<TradeFillDB> for TradeFill {
    fn from(db: TradeFillDB) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            instrument_id: db.instrument_id,
            ingestion_run_id: db.ingestion_run_id,
            source_raw_record_id: db.source_raw_record_id,
            ib_exec_id: db.ib_exec_id,
            transaction_id: db.transaction_id,
            trade_timestamp_utc: DateTime::from_naive_utc_and_offset(db.trade_timestamp_utc, Utc),
            report_date_local: parse_report_date(&db.report_date_local),
            side: db.side,
            quantity: parse_decimal("quantity", &db.quantity),
            price: parse_decimal("price", &db.price),
            cost: parse_optional_decimal("cost", &db.cost),
            commission: parse_optional_decimal("commission", &db.commission),
            fees: parse_optional_decimal("fees", &db.fees),
            realized_pnl: parse_optional_decimal("realized_pnl", &db.realized_pnl),
            net_cash: parse_optional_decimal("net_cash", &db.net_cash),
            net_cash_in_base: parse_optional_decimal("net_cash_in_base", &db.net_cash_in_base),
            fx_rate_to_base: parse_optional_decimal("fx_rate_to_base", &db.fx_rate_to_base),
            currency: db.currency,
            functional_currency: db.functional_currency,
        }
    }
}

/// UPSERT request for a trade fill, keyed by (account, ib_exec_id).
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFillUpsert {
    pub account_id: String,
    pub instrument_id: String,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub ib_exec_id: String,
    pub transaction_id: Option<String>,
    pub trade_timestamp_utc: DateTime<Utc>,
    pub report_date_local: NaiveDate,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub cost: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub net_cash: Option<Decimal>,
    pub net_cash_in_base: Option<Decimal>,
    pub fx_rate_to_base: Option<Decimal>,
    pub currency: String,
    pub functional_currency: String,
}

/// Domain model for one cash event (dividend, withholding, fee, interest, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cashflow {
    pub id: String,
    pub account_id: String,
    pub instrument_id: Option<String>,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub transaction_id: String,
    pub cash_action: String,
    pub report_date_local: NaiveDate,
    pub effective_at_utc: Option<DateTime<Utc>>,
    pub amount: Decimal,
    pub amount_in_base: Option<Decimal>,
    pub currency: String,
    pub functional_currency: String,
    pub withholding_tax: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub is_correction: bool,
}

/// Database model for cashflows
#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::event_cashflows)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CashflowDB {
    pub id: String,
    pub account_id: String,
    pub instrument_id: Option<String>,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub transaction_id: String,
    pub cash_action: String,
    pub report_date_local: String,
    pub effective_at_utc: Option<NaiveDateTime>,
    pub amount: String,
    pub amount_in_base: Option<String>,
    pub currency: String,
    pub functional_currency: String,
    pub withholding_tax: Option<String>,
    pub fees: Option<String>,
    pub is_correction: bool,
    pub created_at_utc: NaiveDateTime,
    pub updated_at_utc: NaiveDateTime,
}

impl From<CashflowDB> for Cashflow {
    fn from(db: CashflowDB) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            instrument_id: db.instrument_id,
            ingestion_run_id: db.ingestion_run_id,
            source_raw_record_id: db.source_raw_record_id,
            transaction_id: db.transaction_id,
            cash_action: db.cash_action,
            report_date_local: parse_report_date(&db.report_date_local),
            effective_at_utc: db
                .effective_at_utc
                .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc)),
            amount: parse_decimal("amount", &db.amount),
            amount_in_base: parse_optional_decimal("amount_in_base", &db.amount_in_base),
            currency: db.currency,
            functional_currency: db.functional_currency,
            withholding_tax: parse_optional_decimal("withholding_tax", &db.withholding_tax),
            fees: parse_optional_decimal("fees", &db.fees),
            is_correction: db.is_correction,
        }
    }
}

/// UPSERT request for a cashflow, keyed by
/// (account, transaction_id, cash_action, currency).
#[derive(Debug, Clone, PartialEq)]
pub struct CashflowUpsert {
    pub account_id: String,
    pub instrument_id: Option<String>,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub transaction_id: String,
    pub cash_action: String,
    pub report_date_local: NaiveDate,
    pub effective_at_utc: Option<DateTime<Utc>>,
    pub amount: Decimal,
    pub amount_in_base: Option<Decimal>,
    pub currency: String,
    pub functional_currency: String,
    pub withholding_tax: Option<Decimal>,
    pub fees: Option<Decimal>,
}

/// Domain model for one resolved FX rate applied to an event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxRateEvent {
    pub id: String,
    pub account_id: String,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub transaction_id: String,
    pub report_date_local: NaiveDate,
    pub currency: String,
    pub functional_currency: String,
    pub fx_rate: Option<Decimal>,
    pub fx_source: String,
    pub provisional: bool,
    pub diagnostic_code: Option<String>,
}

/// Database model for FX events
#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::event_fx_rates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FxRateEventDB {
    pub id: String,
    pub account_id: String,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub transaction_id: String,
    pub report_date_local: String,
    pub currency: String,
    pub functional_currency: String,
    pub fx_rate: Option<String>,
    pub fx_source: String,
    pub provisional: bool,
    pub diagnostic_code: Option<String>,
    pub created_at_utc: NaiveDateTime,
    pub updated_at_utc: NaiveDateTime,
}

impl From<FxRateEventDB> for FxRateEvent {
    fn from(db: FxRateEventDB) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            ingestion_run_id: db.ingestion_run_id,
            source_raw_record_id: db.source_raw_record_id,
            transaction_id: db.transaction_id,
            report_date_local: parse_report_date(&db.report_date_local),
            currency: db.currency,
            functional_currency: db.functional_currency,
            fx_rate: parse_optional_decimal("fx_rate", &db.fx_rate),
            fx_source: db.fx_source,
            provisional: db.provisional,
            diagnostic_code: db.diagnostic_code,
        }
    }
}

/// UPSERT request for an FX event, keyed by
/// (account, transaction_id, currency, functional_currency).
#[derive(Debug, Clone, PartialEq)]
pub struct FxRateUpsert {
    pub account_id: String,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub transaction_id: String,
    pub report_date_local: NaiveDate,
    pub currency: String,
    pub functional_currency: String,
    pub fx_rate: Option<Decimal>,
    pub fx_source: String,
    pub provisional: bool,
    pub diagnostic_code: Option<String>,
}

/// Domain model for one corporate action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpAction {
    pub id: String,
    pub account_id: String,
    pub instrument_id: Option<String>,
    pub conid: String,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub action_id: Option<String>,
    pub transaction_id: Option<String>,
    pub reorg_code: String,
    pub report_date_local: NaiveDate,
    pub description: Option<String>,
    pub requires_manual: bool,
    pub provisional: bool,
}

/// Database model for corporate actions
#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::event_corp_actions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CorpActionDB {
    pub id: String,
    pub account_id: String,
    pub instrument_id: Option<String>,
    pub conid: String,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub action_id: Option<String>,
    pub transaction_id: Option<String>,
    pub reorg_code: String,
    pub report_date_local: String,
    pub description: Option<String>,
    pub requires_manual: bool,
    pub provisional: bool,
    pub created_at_utc: NaiveDateTime,
    pub updated_at_utc: NaiveDateTime,
}

impl From<CorpActionDB> for CorpAction {
    fn from(db: CorpActionDB) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            instrument_id: db.instrument_id,
            conid: db.conid,
            ingestion_run_id: db.ingestion_run_id,
            source_raw_record_id: db.source_raw_record_id,
            action_id: db.action_id,
            transaction_id: db.transaction_id,
            reorg_code: db.reorg_code,
            report_date_local: parse_report_date(&db.report_date_local),
            description: db.description,
            requires_manual: db.requires_manual,
            provisional: db.provisional,
        }
    }
}

/// UPSERT request for a corporate action.
///
/// Keyed by (account, action_id); rows without an action id fall back to
/// (account, transaction_id, conid, report_date, reorg_code).
#[derive(Debug, Clone, PartialEq)]
pub struct CorpActionUpsert {
    pub account_id: String,
    pub instrument_id: Option<String>,
    pub conid: String,
    pub ingestion_run_id: String,
    pub source_raw_record_id: i64,
    pub action_id: Option<String>,
    pub transaction_id: Option<String>,
    pub reorg_code: String,
    pub report_date_local: NaiveDate,
    pub description: Option<String>,
}

/// Outcome of a corporate-action upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpActionOutcome {
    Inserted,
    Updated,
    /// Both natural keys collided with different rows; upsert skipped and the
    /// surviving rows flagged for manual review.
    ManualCase,
}
