use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub const DIAG_EOD_MARK_FALLBACK_LAST_TRADE: &str = "EOD_MARK_FALLBACK_LAST_TRADE";
pub const DIAG_EOD_MARK_MISSING_ALL_SOURCES: &str = "EOD_MARK_MISSING_ALL_SOURCES";
pub const DIAG_FX_RATE_MISSING_ALL_SOURCES: &str = "FX_RATE_MISSING_ALL_SOURCES";

/// Label of the source that produced an EOD mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValuationSource {
    OpenPositionsMark,
    TradesClosePrice,
    TradePriceOnOrBefore,
    MissingAllSources,
}

impl ValuationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationSource::OpenPositionsMark => "open_positions_mark",
            ValuationSource::TradesClosePrice => "trades_close_price",
            ValuationSource::TradePriceOnOrBefore => "trade_price_on_or_before",
            ValuationSource::MissingAllSources => "missing_all_sources",
        }
    }
}

/// Label of the source that produced an execution FX rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FxSource {
    TradesFxRate,
    Derived,
    ConversionRates,
    Identity,
    MissingAllSources,
}

impl FxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FxSource::TradesFxRate => "trades_fx_rate",
            FxSource::Derived => "derived",
            FxSource::ConversionRates => "conversion_rates",
            FxSource::Identity => "identity",
            FxSource::MissingAllSources => "missing_all_sources",
        }
    }
}

/// Outcome of the EOD-mark hierarchy for one (conid, report date).
///
/// Resolution never fails: absence surfaces as a provisional result with a
/// diagnostic code.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkResolution {
    pub price: Option<Decimal>,
    pub source: ValuationSource,
    pub provisional: bool,
    pub diagnostic_code: Option<String>,
}

/// Outcome of the execution-FX hierarchy for one (transaction, currency pair).
#[derive(Debug, Clone, PartialEq)]
pub struct FxResolution {
    pub rate: Option<Decimal>,
    pub source: FxSource,
    pub provisional: bool,
    pub diagnostic_code: Option<String>,
}

/// Candidate from a raw `OpenPositions` row.
#[derive(Debug, Clone)]
pub struct OpenPositionMarkCandidate {
    pub conid: String,
    pub report_date: Option<NaiveDate>,
    pub mark_price: Option<Decimal>,
    pub raw_record_id: i64,
}

/// Candidate from a raw `Trades` row.
#[derive(Debug, Clone)]
pub struct TradeMarkCandidate {
    pub conid: String,
    pub report_date: Option<NaiveDate>,
    pub trade_datetime: Option<DateTime<Utc>>,
    pub transaction_id_numeric: Option<i64>,
    pub close_price: Option<Decimal>,
    pub trade_price: Option<Decimal>,
    pub raw_record_id: i64,
}

/// Trade-row inputs for the first two FX source priorities.
#[derive(Debug, Clone, Default)]
pub struct TradeFxInputs {
    pub fx_rate_to_base: Option<Decimal>,
    pub net_cash: Option<Decimal>,
    pub net_cash_in_base: Option<Decimal>,
}

/// `ConversionRates` candidate for the third FX source priority.
#[derive(Debug, Clone)]
pub struct ConversionRateCandidate {
    pub report_date: NaiveDate,
    pub rate: Decimal,
    pub raw_record_id: i64,
}
