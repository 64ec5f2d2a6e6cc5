pub mod field_parsers;
pub mod mapping_constants;
pub mod mapping_errors;
pub mod mapping_model;
pub mod mapping_service;

pub use mapping_errors::MappingError;
pub use mapping_model::{CanonicalBatch, CanonicalUpsertCounts, MappedCashflow, MappedTradeFill};
pub use mapping_service::CanonicalMappingService;
