pub mod flex_client;
pub mod flex_constants;
pub mod flex_errors;
pub mod flex_model;

pub use flex_client::{FlexFetchPort, FlexWebClient};
pub use flex_constants::FlexErrorCode;
pub use flex_errors::FlexError;
pub use flex_model::{
    FlexFetchOutcome, FlexRequestAck, FlexRetryStrategy, JitterProvider, PollAttemptEvent,
};
