pub mod canonical_pipeline;
pub mod ingestion_constants;
pub mod ingestion_errors;
pub mod ingestion_model;
pub mod ingestion_repository;
pub mod ingestion_service;
pub mod reprocess_service;

pub use ingestion_errors::IngestionError;
pub use ingestion_model::{IngestionRun, RunStatus, RunType, StageEvent};
pub use ingestion_repository::IngestionRunRepository;
pub use ingestion_service::IngestionService;
pub use reprocess_service::{ReprocessScope, ReprocessService};
