pub mod valuation_model;
pub mod valuation_service;

pub use valuation_model::{
    ConversionRateCandidate, FxResolution, FxSource, MarkResolution, OpenPositionMarkCandidate,
    TradeFxInputs, TradeMarkCandidate, ValuationSource,
};
pub use valuation_service::{select_eod_mark, select_execution_fx, ValuationService};
