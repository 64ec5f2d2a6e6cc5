use chrono::Utc;
use log::{error, info};
use serde_json::json;
use std::sync::Arc;

use super::canonical_pipeline::map_and_persist;
use super::ingestion_constants::*;
use super::ingestion_model::{IngestionRun, RunStatus, RunType, StageEvent, StageTimer};
use super::ingestion_repository::IngestionRunRepository;
use super::ingestion_service::classify_failure;
use crate::errors::{Error, Result};
use crate::events::EventRepository;
use crate::instruments::InstrumentRepository;
use crate::ledger::SnapshotService;
use crate::mapping::CanonicalMappingService;
use crate::settings::Settings;
use crate::statements::StatementRepository;

/// Optional raw-store scope for a reprocess run.
#[derive(Debug, Clone, Default)]
pub struct ReprocessScope {
    pub period_key: Option<String>,
    pub flex_query_id: Option<String>,
}

/// Replays canonical mapping and snapshot generation against the existing
/// raw store, with no transport involvement. Two reprocess runs over
/// identical raw inputs yield identical canonical rows and snapshots.
pub struct ReprocessService {
    account_id: String,
    flex_query_id: String,
    base_currency: String,
    runs: Arc<IngestionRunRepository>,
    statements: Arc<StatementRepository>,
    instruments: Arc<InstrumentRepository>,
    events: Arc<EventRepository>,
    snapshots: Arc<SnapshotService>,
    mapping: CanonicalMappingService,
}

impl ReprocessService {
    pub fn new(
        settings: &Settings,
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
            runs,
            statements,
            instruments,
            events,
            snapshots,
            mapping: CanonicalMappingService::default(),
        }
    }

    /// Runs a replay over the raw store; scope narrows to one statement
    /// period when given, otherwise the full raw history replays.
    pub async fn trigger_reprocess(&self, scope: ReprocessScope) -> Result<IngestionRun> {
        let period_key = scope
            .period_key
            .clone()
            .unwrap_or_else(|| "full".to_string());
        let flex_query_id = scope
            .flex_query_id
            .clone()
            .unwrap_or_else(|| self.flex_query_id.clone());

        let run = self
            .runs
            .create_started(
                &self.account_id,
                RunType::Reprocess,
                &period_key,
                &flex_query_id,
                None,
            )
            .map_err(Error::Ingestion)?;
        info!("Reprocess run {} started (scope {})", run.id, period_key);

        let mut timeline: Vec<StageEvent> = Vec::new();
        match self.execute_stages(&run, &scope, &mut timeline) {
            Ok(report_date) => {
                let finalized = self
                    .runs
                    .finalize(&run.id, RunStatus::Success, report_date, None, None, &timeline)
                    .map_err(Error::Ingestion)?;
                info!("Reprocess run {} succeeded", run.id);
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
                error!("Reprocess run {} failed with {}: {}", run.id, code, message);
                Ok(finalized)
            }
        }
    }

    fn execute_stages(
        &self,
        run: &IngestionRun,
        scope: &ReprocessScope,
        timeline: &mut Vec<StageEvent>,
    ) -> Result<Option<chrono::NaiveDate>> {
        // canonical_mapping over the scoped raw store
        let timer = StageTimer::start(STAGE_CANONICAL_MAPPING);
        let mapping_result = (|| -> Result<_> {
            let period_scope = match (&scope.period_key, &scope.flex_query_id) {
                (Some(period_key), Some(flex_query_id)) => {
                    Some((period_key.as_str(), flex_query_id.as_str()))
                }
                _ => None,
            };
            let rows = self
                .statements
                .get_rows_for_account(&self.account_id, period_scope)?;
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
                timeline
                    .push(timer.finish(STATUS_FAILED, json!({ "error_message": failure.to_string() })));
                return Err(failure);
            }
        }

        // snapshot
        let timer = StageTimer::start(STAGE_SNAPSHOT);
        match self.snapshots.build_and_persist(
            &self.account_id,
            Some(&run.id),
            Utc::now(),
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
