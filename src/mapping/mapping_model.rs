use serde::Serialize;

use crate::events::{CashflowUpsert, CorpActionUpsert, FxRateUpsert, TradeFillUpsert};
use crate::instruments::InstrumentUpsert;

/// A mapped trade fill plus the conid used to resolve its instrument id.
#[derive(Debug, Clone)]
pub struct MappedTradeFill {
    pub conid: String,
    pub request: TradeFillUpsert,
}

/// A mapped cashflow plus the optional conid linking it to an instrument.
#[derive(Debug, Clone)]
pub struct MappedCashflow {
    pub conid: Option<String>,
    pub request: CashflowUpsert,
}

/// Output of one canonical mapping pass over run-scoped raw rows.
///
/// Instrument requests must be upserted before any event request so event
/// rows resolve `instrument_id` deterministically.
#[derive(Debug, Clone, Default)]
pub struct CanonicalBatch {
    pub instruments: Vec<InstrumentUpsert>,
    pub trade_fills: Vec<MappedTradeFill>,
    pub cashflows: Vec<MappedCashflow>,
    pub fx_rates: Vec<FxRateUpsert>,
    pub corp_actions: Vec<CorpActionUpsert>,
}

/// Per-kind persistence counters reported on the canonical_mapping stage.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CanonicalUpsertCounts {
    pub instrument_count: usize,
    pub trade_fill_count: usize,
    pub cashflow_count: usize,
    pub fx_count: usize,
    pub corp_action_count: usize,
    pub manual_case_count: usize,
}
