use chrono::{NaiveDate, Utc};
use log::{error, info};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::canonical_pipeline::map_and_persist;
use super::ingestion_constants::*;
use super::ingestion_errors::IngestionError;
use super::ingestion_model::{instant_event, IngestionRun, RunStatus, RunType, StageEvent, StageTimer};
use super::ingestion_repository::IngestionRunRepository;
use crate::errors::{Error, Result};
use crate::events::EventRepository;
use crate::flex::{FlexError, FlexFetchPort};
use crate::instruments::InstrumentRepository;
use crate::ledger::SnapshotService;
use crate::mapping::{CanonicalMappingService, MappingError};
use crate::settings::Settings;
use crate::statements::section_preflight::check_required_sections;
use crate::statements::raw_extraction::extract_payload_rows;
use crate::statements::{StatementError, StatementRepository};

/// Maps a pipeline failure to its deterministic terminal error code.
pub fn classify_failure(failure: &Error) -> (&'static str, String) {
    let message = failure.to_string();
    let code = match failure {
        Error::Flex(flex) => match flex {
            FlexError::TokenExpired { .. } => ERROR_TOKEN_EXPIRED,
            FlexError::TokenInvalid { .. } => ERROR_TOKEN_INVALID,
            FlexError::RequestRejected { .. } => ERROR_REQUEST,
            FlexError::StatementRejected { .. } | FlexError::MalformedResponse { .. } => {
                ERROR_STATEMENT
            }
            FlexError::PollTimeout { .. } => ERROR_POLL_TIMEOUT,
            FlexError::Transport(_) | FlexError::Timeout(_) | FlexError::HttpStatus(_) => {
                ERROR_TRANSPORT
            }
            FlexError::Cancelled => ERROR_CANCELLED,
        },
        Error::Statement(StatementError::MissingRequiredSections { .. }) => {
            ERROR_MISSING_REQUIRED_SECTION
        }
        Error::Mapping(MappingError::ContractViolation { .. }) => ERROR_MAPPING_CONTRACT,
        Error::Ingestion(IngestionError::RunAlreadyActive) => ERROR_RUN_ALREADY_ACTIVE,
        _ => ERROR_INTERNAL,
    };
    (code, message)
}

/// Single entrypoint for a pipeline execution.
///
/// Owns the run lifecycle: lock-guarded run creation, the stage timeline,
/// and terminal finalization. Every execution path ends in `success` or
/// `failed`; no run is left `started`.
pub struct IngestionService {
    account_id: String,
    flex_query_id: String,
    base_currency: String,
    reconciliation_enabled: bool,
    flex: Arc<dyn FlexFetchPort>,
    runs: Arc<IngestionRunRepository>,
    statements: Arc<StatementRepository>,
    instruments: Arc<InstrumentRepository>,
    events: Arc<EventRepository>,
    snapshots: Arc<SnapshotService>,
    mapping: CanonicalMappingService,
}

impl IngestionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: &Settings,
        flex: Arc<dyn FlexFetchPort>,
        runs: Arc<IngestionRunRepository>,
        statements: Arc<StatementRepository>,
        instruments: Arc<InstrumentRepository>,
        events: Arc<EventRepository>,
        snapshots: Arc<SnapshotService>,
    ) -> Self {
        Self {
            account_id: settings.account_id.clone(),
            flex_query_id: settings.flex_query_id.clone(),
            base_currency: settings.base_currency.clone(),
            reconciliation_enabled: settings.reconciliation_enabled,
            flex,
            runs,
            statements,
            instruments,
            events,
            snapshots,
            mapping: CanonicalMappingService::default(),
        }
    }

    pub async fn trigger_ingestion(&self, run_type: RunType) -> Result<IngestionRun> {
        self.trigger_ingestion_with_cancel(run_type, CancellationToken::new())
            .await
    }

    /// Drives one full run. Returns the finalized run row (success or
    /// failed); an overlapping trigger fails with `RunAlreadyActive` and
    /// creates no run row.
    pub async fn trigger_ingestion_with_cancel(
        &self,
        run_type: RunType,
        cancel: CancellationToken,
    ) -> Result<IngestionRun> {
        let period_key = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let run = self
            .runs
            .create_started(
                &self.account_id,
                run_type,
                &period_key,
                &self.flex_query_id,
                None,
            )
            .map_err(Error::Ingestion)?;
        info!("Ingestion run {} started ({})", run.id, run_type.as_str());

        let mut timeline: Vec<StageEvent> = Vec::new();
        match self.execute_stages(&run, &cancel, &mut timeline).await {
            Ok(report_date) => {
                let finalized = self
                    .runs
                    .finalize(&run.id, RunStatus::Success, report_date, None, None, &timeline)
                    .map_err(Error::Ingestion)?;
                info!("Ingestion run {} succeeded", run.id);
                Ok(finalized)
            }
            Err(failure) => {
                let (code, message) = classify_failure(&failure);
                let finalized = self
                    .runs
                    .finalize(
                        &run.id,
                        RunStatus::Failed,
                        None,
                        Some(code),
                        Some(&message),
                        &timeline,
                    )
                    .map_err(Error::Ingestion)?;
                error!("Ingestion run {} failed with {}: {}", run.id, code, message);
                Ok(finalized)
            }
        }
    }

    async fn execute_stages(
        &self,
        run: &IngestionRun,
        cancel: &CancellationToken,
        timeline: &mut Vec<StageEvent>,
    ) -> Result<Option<NaiveDate>> {
        // request
        let timer = StageTimer::start(STAGE_REQUEST);
        let ack = match self.flex.request_statement(&self.flex_query_id).await {
            Ok(ack) => {
                timeline.push(timer.finish(
                    STATUS_SUCCESS,
                    json!({ "reference_code": ack.reference_code.clone() }),
                ));
                ack
            }
            Err(failure) => {
                timeline
                    .push(timer.finish(STATUS_FAILED, json!({ "error_message": failure.to_string() })));
                return Err(failure.into());
            }
        };

        // poll
        let timer = StageTimer::start(STAGE_POLL);
        let outcome = match self.flex.download_statement(&ack, cancel).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                timeline
                    .push(timer.finish(STATUS_FAILED, json!({ "error_message": failure.to_string() })));
                return Err(failure.into());
            }
        };
        let poll_ended = Utc::now();
        for attempt in &outcome.poll_attempts {
            timeline.push(instant_event(
                STAGE_POLL,
                STATUS_RETRYING,
                poll_ended,
                serde_json::to_value(attempt).unwrap_or(serde_json::Value::Null),
            ));
        }
        timeline.push(
            timer.finish(STATUS_SUCCESS, json!({ "poll_attempts": outcome.poll_attempts.len() })),
        );

        // download
        timeline.push(instant_event(
            STAGE_DOWNLOAD,
            STATUS_SUCCESS,
            Utc::now(),
            json!({ "payload_bytes": outcome.payload.len() }),
        ));

        // persist (section preflight, artifact upsert, raw row extraction)
        let timer = StageTimer::start(STAGE_PERSIST);
        let preflight = match check_required_sections(&outcome.payload, self.reconciliation_enabled)
        {
            Ok(result) => result,
            Err(failure) => {
                timeline
                    .push(timer.finish(STATUS_FAILED, json!({ "error_message": failure.to_string() })));
                return Err(failure.into());
            }
        };
        if !preflight.is_valid() {
            let missing = preflight.missing_sections();
            timeline.push(timer.finish(
                STATUS_FAILED,
                json!({
                    "error_code": ERROR_MISSING_REQUIRED_SECTION,
                    "missing_sections": missing.clone(),
                    "detected_sections": preflight.detected_sections,
                }),
            ));
            return Err(StatementError::MissingRequiredSections { missing }.into());
        }

        let persist_result = (|| -> Result<_> {
            let extraction = extract_payload_rows(&outcome.payload)?;
            let artifact = self.statements.upsert_artifact(
                &run.id,
                &self.account_id,
                &run.period_key,
                &self.flex_query_id,
                extraction.report_date_local,
                &outcome.payload,
            )?;
            let rows = self.statements.insert_raw_rows(
                &run.id,
                &artifact.artifact.id,
                &self.account_id,
                extraction.report_date_local,
                &extraction.rows,
            )?;
            Ok((artifact, rows))
        })();
        let (artifact, raw_rows) = match persist_result {
            Ok(persisted) => persisted,
            Err(failure) => {
                timeline
                    .push(timer.finish(STATUS_FAILED, json!({ "error_message": failure.to_string() })));
                return Err(failure);
            }
        };
        timeline.push(timer.finish(
            STATUS_SUCCESS,
            json!({
                "payload_sha256": artifact.artifact.payload_sha256,
                "raw_artifact_id": artifact.artifact.id,
                "artifact_deduped": artifact.deduplicated,
                "raw_rows_inserted": raw_rows.inserted,
                "raw_rows_deduplicated": raw_rows.deduplicated,
            }),
        ));

        // canonical_mapping (run-scoped; no-op when the artifact brought no new rows)
        let timer = StageTimer::start(STAGE_CANONICAL_MAPPING);
        if raw_rows.inserted == 0 {
            timeline.push(timer.finish(
                STATUS_SKIPPED,
                json!({ "canonical_skip_reason": CANONICAL_SKIP_NO_NEW_RAW_ROWS }),
            ));
        } else {
            let mapping_result = (|| -> Result<_> {
                let rows = self.statements.get_rows_for_run(&run.id)?;
                map_and_persist(
                    &self.mapping,
                    &self.instruments,
                    &self.events,
                    &self.account_id,
                    &self.base_currency,
                    &rows,
                )
            })();
            match mapping_result {
                Ok(counts) => {
                    timeline.push(timer.finish(
                        STATUS_SUCCESS,
                        serde_json::to_value(&counts).unwrap_or(serde_json::Value::Null),
                    ));
                }
                Err(failure) => {
                    timeline.push(
                        timer.finish(STATUS_FAILED, json!({ "error_message": failure.to_string() })),
                    );
                    return Err(failure);
                }
            }
        }

        // snapshot
        let timer = StageTimer::start(STAGE_SNAPSHOT);
        let completed_at = Utc::now();
        match self.snapshots.build_and_persist(
            &self.account_id,
            Some(&run.id),
            completed_at,
            &self.base_currency,
        ) {
            Ok(result) => {
                let report_date = result.report_date_local;
                timeline.push(timer.finish(
                    STATUS_SUCCESS,
                    serde_json::to_value(&result).unwrap_or(serde_json::Value::Null),
                ));
                Ok(Some(report_date))
            }
            Err(failure) => {
                timeline
                    .push(timer.finish(STATUS_FAILED, json!({ "error_message": failure.to_string() })));
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_classify_to_deterministic_codes() {
        let cases: Vec<(Error, &str)> = vec![
            (
                Error::Flex(FlexError::TokenExpired {
                    code: "1012".to_string(),
                    message: "Token has expired.".to_string(),
                }),
                ERROR_TOKEN_EXPIRED,
            ),
            (
                Error::Flex(FlexError::TokenInvalid {
                    code: "1015".to_string(),
                    message: "Token is invalid.".to_string(),
                }),
                ERROR_TOKEN_INVALID,
            ),
            (
                Error::Flex(FlexError::RequestRejected {
                    code: "1014".to_string(),
                    message: "Query is invalid.".to_string(),
                }),
                ERROR_REQUEST,
            ),
            (
                Error::Flex(FlexError::StatementRejected {
                    code: "1021".to_string(),
                    message: "Statement could not be retrieved.".to_string(),
                }),
                ERROR_STATEMENT,
            ),
            (
                Error::Flex(FlexError::PollTimeout { attempts: 7 }),
                ERROR_POLL_TIMEOUT,
            ),
            (Error::Flex(FlexError::Cancelled), ERROR_CANCELLED),
            (
                Error::Statement(StatementError::MissingRequiredSections {
                    missing: vec!["Trades".to_string()],
                }),
                ERROR_MISSING_REQUIRED_SECTION,
            ),
            (
                Error::Mapping(MappingError::ContractViolation {
                    section: "Trades".to_string(),
                    source_row_ref: "Trades:Trade:idx=1".to_string(),
                    field: "quantity".to_string(),
                    raw_value: "N/A".to_string(),
                }),
                ERROR_MAPPING_CONTRACT,
            ),
            (
                Error::Ledger(crate::ledger::LedgerError::InvariantViolation(
                    "negative remaining quantity".to_string(),
                )),
                ERROR_INTERNAL,
            ),
        ];

        for (failure, expected) in cases {
            let (code, message) = classify_failure(&failure);
            assert_eq!(code, expected);
            assert!(!message.is_empty());
        }
    }
}
