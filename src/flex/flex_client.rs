use async_trait::async_trait;
use log::{debug, warn};
use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::flex_constants::{
    default_message_for, is_retryable_in_poll, retry_floor_seconds, FlexErrorCode,
};
use super::flex_errors::FlexError;
use super::flex_model::{
    FlexFetchOutcome, FlexRequestAck, FlexRetryStrategy, JitterProvider, PollAttemptEvent,
};
use crate::settings::FlexRetrySettings;

const FLEX_API_VERSION: &str = "3";
const FLEX_USER_AGENT: &str = "ibkr-flex-ledger/0.1";

/// Transport port for the Flex `SendRequest` then `GetStatement` flow.
///
/// Split into the two upstream phases so the orchestrator can time each
/// stage; tests stub both.
#[async_trait]
pub trait FlexFetchPort: Send + Sync {
    async fn request_statement(&self, query_id: &str) -> Result<FlexRequestAck, FlexError>;

    async fn download_statement(
        &self,
        ack: &FlexRequestAck,
        cancel: &CancellationToken,
    ) -> Result<FlexFetchOutcome, FlexError>;
}

/// Pooled HTTP adapter for the IBKR Flex Web Service.
///
/// Owns its `reqwest::Client` for the process lifetime; the pool is torn down
/// when the adapter is dropped at shutdown. Never parses business content.
pub struct FlexWebClient {
    client: Client,
    token: String,
    base_url: String,
    strategy: FlexRetryStrategy,
}

impl FlexWebClient {
    pub fn new(
        token: String,
        base_url: String,
        retry: FlexRetrySettings,
    ) -> Result<Self, FlexError> {
        let jitter: JitterProvider = Arc::new(|| rand::thread_rng().gen::<f64>());
        Self::with_jitter(token, base_url, retry, jitter)
    }

    /// Builds the adapter with an explicit jitter provider for deterministic tests.
    pub fn with_jitter(
        token: String,
        base_url: String,
        retry: FlexRetrySettings,
        jitter: JitterProvider,
    ) -> Result<Self, FlexError> {
        let client = Client::builder()
            .user_agent(FLEX_USER_AGENT)
            .timeout(Duration::from_secs_f64(retry.request_timeout_seconds))
            .build()
            .map_err(FlexError::Transport)?;

        Ok(Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            strategy: FlexRetryStrategy::new(retry, jitter),
        })
    }

    async fn send_request(&self, query_id: &str) -> Result<FlexRequestAck, FlexError> {
        let url = format!("{}/SendRequest", self.base_url);
        let body = self
            .http_get(
                &url,
                &[
                    ("t", self.token.as_str()),
                    ("q", query_id),
                    ("v", FLEX_API_VERSION),
                ],
            )
            .await?;
        let text = decode_utf8(&body, "send_request")?;
        let doc = parse_xml(&text, "send_request")?;
        let root = doc.root_element();

        let status = child_text(root, "Status").unwrap_or_default();
        if !status.eq_ignore_ascii_case("success") {
            let (code, message) = extract_upstream_error(root, "request rejected by upstream");
            return Err(classify_request_error(code, message));
        }

        let reference_code =
            child_text(root, "ReferenceCode").ok_or_else(|| FlexError::MalformedResponse {
                context: "send_request response missing ReferenceCode".to_string(),
            })?;
        let statement_url = child_text(root, "Url")
            .unwrap_or_else(|| format!("{}/GetStatement", self.base_url));

        debug!("Flex request accepted, reference {}", reference_code);
        Ok(FlexRequestAck {
            reference_code,
            statement_url,
        })
    }

    async fn poll_statement(
        &self,
        statement_url: &str,
        reference_code: &str,
        cancel: &CancellationToken,
    ) -> Result<FlexFetchOutcome, FlexError> {
        let mut poll_attempts: Vec<PollAttemptEvent> = Vec::new();

        self.sleep_cancellable(self.strategy.initial_wait_seconds(), cancel)
            .await?;

        for attempt_index in 0..self.strategy.attempts() {
            if attempt_index > 0 {
                let floor = poll_attempts
                    .last()
                    .map(|event| event.retry_after_seconds)
                    .unwrap_or(0.0);
                let wait = self.strategy.wait_seconds(attempt_index - 1, floor);
                self.sleep_cancellable(wait, cancel).await?;
            }

            let body = self
                .http_get(
                    statement_url,
                    &[
                        ("q", reference_code),
                        ("t", self.token.as_str()),
                        ("v", FLEX_API_VERSION),
                    ],
                )
                .await?;
            let text = decode_utf8(&body, "get_statement")?;
            let doc = parse_xml(&text, "get_statement")?;
            let root = doc.root_element();

            if is_statement_root(root) {
                debug!(
                    "Flex statement ready after {} poll attempt(s)",
                    attempt_index + 1
                );
                return Ok(FlexFetchOutcome {
                    payload: body,
                    poll_attempts,
                });
            }

            let (code, message) = extract_upstream_error(root, "unexpected upstream response");
            if is_retryable_in_poll(&code) {
                let floor = retry_floor_seconds(&code);
                warn!(
                    "Flex poll attempt {} deferred (code {}): {}",
                    attempt_index + 1,
                    code,
                    message
                );
                poll_attempts.push(PollAttemptEvent {
                    poll_attempt: attempt_index + 1,
                    error_code: code,
                    error_message: message,
                    retry_after_seconds: floor,
                });
                continue;
            }

            return Err(classify_statement_error(code, message));
        }

        Err(FlexError::PollTimeout {
            attempts: self.strategy.attempts(),
        })
    }

    async fn http_get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<u8>, FlexError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FlexError::Timeout(e)
                } else {
                    FlexError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlexError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(FlexError::Transport)?;
        Ok(bytes.to_vec())
    }

    async fn sleep_cancellable(
        &self,
        seconds: f64,
        cancel: &CancellationToken,
    ) -> Result<(), FlexError> {
        if seconds <= 0.0 {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => Ok(()),
            _ = cancel.cancelled() => Err(FlexError::Cancelled),
        }
    }
}

#[async_trait]
impl FlexFetchPort for FlexWebClient {
    async fn request_statement(&self, query_id: &str) -> Result<FlexRequestAck, FlexError> {
        let query_id = query_id.trim();
        if query_id.is_empty() {
            return Err(FlexError::MalformedResponse {
                context: "query_id must not be blank".to_string(),
            });
        }
        self.send_request(query_id).await
    }

    async fn download_statement(
        &self,
        ack: &FlexRequestAck,
        cancel: &CancellationToken,
    ) -> Result<FlexFetchOutcome, FlexError> {
        self.poll_statement(&ack.statement_url, &ack.reference_code, cancel)
            .await
    }
}

fn decode_utf8(body: &[u8], context: &str) -> Result<String, FlexError> {
    String::from_utf8(body.to_vec()).map_err(|_| FlexError::MalformedResponse {
        context: format!("{} response is not valid UTF-8", context),
    })
}

fn parse_xml<'a>(text: &'a str, context: &str) -> Result<roxmltree::Document<'a>, FlexError> {
    roxmltree::Document::parse(text).map_err(|e| FlexError::MalformedResponse {
        context: format!("{} response is not valid XML: {}", context, e),
    })
}

fn is_statement_root(root: roxmltree::Node) -> bool {
    match root.tag_name().name() {
        "FlexQueryResponse" => root
            .children()
            .any(|child| child.has_tag_name("FlexStatements")),
        "FlexStatements" => true,
        _ => false,
    }
}

fn child_text(node: roxmltree::Node, name: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(name))
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn extract_upstream_error(root: roxmltree::Node, fallback: &str) -> (String, String) {
    let code = child_text(root, "ErrorCode").unwrap_or_else(|| "UNKNOWN".to_string());
    let message = child_text(root, "ErrorMessage")
        .unwrap_or_else(|| default_message_for(&code, fallback));
    (code, message)
}

fn classify_request_error(code: String, message: String) -> FlexError {
    match FlexErrorCode::from_code(&code) {
        Some(FlexErrorCode::TokenExpired) => FlexError::TokenExpired { code, message },
        Some(FlexErrorCode::InvalidToken) => FlexError::TokenInvalid { code, message },
        _ => FlexError::RequestRejected { code, message },
    }
}

fn classify_statement_error(code: String, message: String) -> FlexError {
    match FlexErrorCode::from_code(&code) {
        Some(FlexErrorCode::TokenExpired) => FlexError::TokenExpired { code, message },
        Some(FlexErrorCode::InvalidToken) => FlexError::TokenInvalid { code, message },
        _ => FlexError::StatementRejected { code, message },
    }
}
