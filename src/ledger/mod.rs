pub mod fifo_engine;
pub mod ledger_errors;
pub mod ledger_model;
pub mod ledger_repository;
pub mod snapshot_dates;
pub mod snapshot_service;

pub use fifo_engine::{compute_fifo, FifoComputation, FifoLot, FifoTradeInput, LotStatus};
pub use ledger_errors::LedgerError;
pub use ledger_model::{
    PnlSnapshotDaily, PnlSnapshotUpsert, PositionLot, PositionLotUpsert, SnapshotBuildResult,
};
pub use ledger_repository::LedgerRepository;
pub use snapshot_dates::resolve_report_date_local;
pub use snapshot_service::SnapshotService;
