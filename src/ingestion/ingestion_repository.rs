use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

use super::ingestion_errors::{IngestionError, Result};
use super::ingestion_model::{IngestionRun, IngestionRunDB, RunStatus, RunType, StageEvent};
use crate::db::{get_connection, DbPool};
use crate::schema::ingestion_runs;

/// Repository for ingestion run lifecycle persistence and lock enforcement.
///
/// The single-active-run rule is carried by a partial unique index on
/// (account_id) WHERE status = 'started', so lock acquisition and run-row
/// insertion are one atomic statement.
pub struct IngestionRunRepository {
    pool: Arc<DbPool>,
}

impl IngestionRunRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Creates a `started` run, failing with `RunAlreadyActive` when any run
    /// for the account is still started. No row is created on rejection.
    pub fn create_started(
        &self,
        account_id: &str,
        run_type: RunType,
        period_key: &str,
        flex_query_id: &str,
        report_date_local: Option<NaiveDate>,
    ) -> Result<IngestionRun> {
        if account_id.trim().is_empty() {
            return Err(IngestionError::InvalidData(
                "account_id must not be blank".to_string(),
            ));
        }
        if period_key.trim().is_empty() {
            return Err(IngestionError::InvalidData(
                "period_key must not be blank".to_string(),
            ));
        }

        let mut conn = get_connection(&self.pool)
            .map_err(|e| IngestionError::DatabaseError(e.to_string()))?;

        let candidate = IngestionRunDB {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            run_type: run_type.as_str().to_string(),
            status: RunStatus::Started.as_str().to_string(),
            period_key: period_key.to_string(),
            flex_query_id: flex_query_id.to_string(),
            report_date_local: report_date_local.map(|d| d.format("%Y-%m-%d").to_string()),
            started_at_utc: Utc::now().naive_utc(),
            ended_at_utc: None,
            duration_ms: None,
            error_code: None,
            error_message: None,
            diagnostics: None,
        };

        diesel::insert_into(ingestion_runs::table)
            .values(&candidate)
            .execute(&mut conn)
            .map_err(IngestionError::from)?;

        debug!("Started {} run {}", run_type.as_str(), candidate.id);
        Ok(IngestionRun::from(candidate))
    }

    /// Finalizes a run to its terminal state with diagnostics, atomically.
    pub fn finalize(
        &self,
        run_id: &str,
        status: RunStatus,
        report_date_local: Option<NaiveDate>,
        error_code: Option<&str>,
        error_message: Option<&str>,
        timeline: &[StageEvent],
    ) -> Result<IngestionRun> {
        if status == RunStatus::Started {
            return Err(IngestionError::InvalidData(
                "terminal status must be success or failed".to_string(),
            ));
        }

        let mut conn = get_connection(&self.pool)
            .map_err(|e| IngestionError::DatabaseError(e.to_string()))?;

        let existing = ingestion_runs::table
            .find(run_id)
            .select(IngestionRunDB::as_select())
            .first::<IngestionRunDB>(&mut conn)
            .map_err(IngestionError::from)?;

        let ended_at = Utc::now().naive_utc();
        let duration_ms = (ended_at - existing.started_at_utc).num_milliseconds();
        let diagnostics = serde_json::to_string(timeline)
            .map_err(|e| IngestionError::InvalidData(e.to_string()))?;

        diesel::update(ingestion_runs::table.find(run_id))
            .set((
                ingestion_runs::status.eq(status.as_str()),
                ingestion_runs::report_date_local
                    .eq(report_date_local.map(|d| d.format("%Y-%m-%d").to_string())),
                ingestion_runs::ended_at_utc.eq(Some(ended_at)),
                ingestion_runs::duration_ms.eq(Some(duration_ms)),
                ingestion_runs::error_code.eq(error_code),
                ingestion_runs::error_message.eq(error_message),
                ingestion_runs::diagnostics.eq(Some(diagnostics)),
            ))
            .execute(&mut conn)
            .map_err(IngestionError::from)?;

        self.get_run_with_conn(&mut conn, run_id)
    }

    pub fn get_run(&self, run_id: &str) -> Result<IngestionRun> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| IngestionError::DatabaseError(e.to_string()))?;
        self.get_run_with_conn(&mut conn, run_id)
    }

    /// Most recent runs for an account, newest first.
    pub fn get_recent_runs(&self, account_id: &str, limit: i64) -> Result<Vec<IngestionRun>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| IngestionError::DatabaseError(e.to_string()))?;

        ingestion_runs::table
            .filter(ingestion_runs::account_id.eq(account_id))
            .select(IngestionRunDB::as_select())
            .order(ingestion_runs::started_at_utc.desc())
            .limit(limit)
            .load::<IngestionRunDB>(&mut conn)
            .map(|rows| rows.into_iter().map(IngestionRun::from).collect())
            .map_err(IngestionError::from)
    }

    pub fn get_active_run(&self, account_id: &str) -> Result<Option<IngestionRun>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| IngestionError::DatabaseError(e.to_string()))?;

        ingestion_runs::table
            .filter(ingestion_runs::account_id.eq(account_id))
            .filter(ingestion_runs::status.eq(RunStatus::Started.as_str()))
            .select(IngestionRunDB::as_select())
            .first::<IngestionRunDB>(&mut conn)
            .optional()
            .map(|row| row.map(IngestionRun::from))
            .map_err(IngestionError::from)
    }

    fn get_run_with_conn(
        &self,
        conn: &mut crate::db::DbConnection,
        run_id: &str,
    ) -> Result<IngestionRun> {
        ingestion_runs::table
            .find(run_id)
            .select(IngestionRunDB::as_select())
            .first::<IngestionRunDB>(conn)
            .map(IngestionRun::from)
            .map_err(IngestionError::from)
    }
}
