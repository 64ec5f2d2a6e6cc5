pub mod events_errors;
pub mod events_model;
pub mod events_repository;

pub use events_errors::EventError;
pub use events_model::{
    Cashflow, CashflowUpsert, CorpAction, CorpActionOutcome, CorpActionUpsert, FxRateEvent,
    FxRateUpsert, TradeFill, TradeFillUpsert, TradeSide,
};
pub use events_repository::EventRepository;
