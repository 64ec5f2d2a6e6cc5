pub mod instruments_errors;
pub mod instruments_model;
pub mod instruments_repository;

pub use instruments_errors::InstrumentError;
pub use instruments_model::{Instrument, InstrumentUpsert};
pub use instruments_repository::InstrumentRepository;
