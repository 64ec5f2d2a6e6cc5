pub mod raw_extraction;
pub mod section_preflight;
pub mod statements_constants;
pub mod statements_errors;
pub mod statements_model;
pub mod statements_repository;

pub use statements_errors::StatementError;
pub use statements_model::{
    ArtifactUpsertOutcome, ExtractedRow, ExtractionResult, RawArtifact, RawRecord,
    RawRowInsertOutcome, SectionPreflightResult,
};
pub use statements_repository::StatementRepository;
