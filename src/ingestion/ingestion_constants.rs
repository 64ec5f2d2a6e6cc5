pub const ERROR_TOKEN_EXPIRED: &str = "INGESTION_TOKEN_EXPIRED_ERROR";
pub const ERROR_TOKEN_INVALID: &str = "INGESTION_TOKEN_INVALID_ERROR";
pub const ERROR_REQUEST: &str = "INGESTION_REQUEST_ERROR";
pub const ERROR_STATEMENT: &str = "INGESTION_STATEMENT_ERROR";
pub const ERROR_POLL_TIMEOUT: &str = "INGESTION_POLL_TIMEOUT";
pub const ERROR_TRANSPORT: &str = "INGESTION_TRANSPORT_ERROR";
pub const ERROR_MISSING_REQUIRED_SECTION: &str = "MISSING_REQUIRED_SECTION";
pub const ERROR_MAPPING_CONTRACT: &str = "CANONICAL_MAPPING_CONTRACT_VIOLATION";
pub const ERROR_CANCELLED: &str = "INGESTION_CANCELLED";
pub const ERROR_INTERNAL: &str = "INGESTION_INTERNAL_ERROR";
pub const ERROR_RUN_ALREADY_ACTIVE: &str = "RUN_ALREADY_ACTIVE";

pub const STAGE_REQUEST: &str = "request";
pub const STAGE_POLL: &str = "poll";
pub const STAGE_DOWNLOAD: &str = "download";
pub const STAGE_PERSIST: &str = "persist";
pub const STAGE_CANONICAL_MAPPING: &str = "canonical_mapping";
pub const STAGE_SNAPSHOT: &str = "snapshot";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_RETRYING: &str = "retrying";
pub const STATUS_SKIPPED: &str = "skipped";

pub const CANONICAL_SKIP_NO_NEW_RAW_ROWS: &str = "no_new_raw_rows_for_run";
