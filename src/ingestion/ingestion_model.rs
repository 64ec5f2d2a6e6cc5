use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Enum representing how a run was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunType {
    Scheduled,
    Manual,
    Reprocess,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Scheduled => "scheduled",
            RunType::Manual => "manual",
            RunType::Reprocess => "reprocess",
        }
    }
}

impl FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(RunType::Scheduled),
            "manual" => Ok(RunType::Manual),
            "reprocess" => Ok(RunType::Reprocess),
            _ => Err(format!("Unknown run type: {}", s)),
        }
    }
}

/// Enum representing the lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Started,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(RunStatus::Started),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// One entry in the persisted diagnostics timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageEvent {
    pub stage: String,
    pub status: String,
    pub started_at_utc: DateTime<Utc>,
    pub ended_at_utc: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

/// Measures one stage and renders its timeline event.
#[derive(Debug)]
pub struct StageTimer {
    stage: &'static str,
    started_at: DateTime<Utc>,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            started_at: Utc::now(),
        }
    }

    pub fn finish(self, status: &str, payload: Value) -> StageEvent {
        let ended_at = Utc::now();
        StageEvent {
            stage: self.stage.to_string(),
            status: status.to_string(),
            started_at_utc: self.started_at,
            ended_at_utc: ended_at,
            duration_ms: (ended_at - self.started_at).num_milliseconds(),
            payload,
        }
    }
}

/// Builds a zero-duration timeline event pinned to one instant.
pub fn instant_event(stage: &str, status: &str, at: DateTime<Utc>, payload: Value) -> StageEvent {
    StageEvent {
        stage: stage.to_string(),
        status: status.to_string(),
        started_at_utc: at,
        ended_at_utc: at,
        duration_ms: 0,
        payload,
    }
}

/// Domain model for one ingestion run row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRun {
    pub id: String,
    pub account_id: String,
    pub run_type: String,
    pub status: String,
    pub period_key: String,
    pub flex_query_id: String,
    pub report_date_local: Option<NaiveDate>,
    pub started_at_utc: DateTime<Utc>,
    pub ended_at_utc: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub diagnostics: Vec<StageEvent>,
}

/// Database model for ingestion runs
#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::ingestion_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IngestionRunDB {
    pub id: String,
    pub account_id: String,
    pub run_type: String,
    pub status: String,
    pub period_key: String,
    pub flex_query_id: String,
    pub report_date_local: Option<String>,
    pub started_at_utc: NaiveDateTime,
    pub ended_at_utc: Option<NaiveDateTime>,
    pub duration_ms: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub diagnostics: Option<String>,
}

impl From<IngestionRunDB> for IngestionRun {
    fn from(db: IngestionRunDB) -> Self {
        let diagnostics: Vec<StageEvent> = db
            .diagnostics
            .as_deref()
            .map(|raw| {
                serde_json::from_str(raw).unwrap_or_else(|e| {
                    log::error!("Failed to parse run {} diagnostics: {}", db.id, e);
                    Vec::new()
                })
            })
            .unwrap_or_default();
        Self {
            id: db.id,
            account_id: db.account_id,
            run_type: db.run_type,
            status: db.status,
            period_key: db.period_key,
            flex_query_id: db.flex_query_id,
            report_date_local: db
                .report_date_local
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            started_at_utc: DateTime::from_naive_utc_and_offset(db.started_at_utc, Utc),
            ended_at_utc: db
                .ended_at_utc
                .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc)),
            duration_ms: db.duration_ms,
            error_code: db.error_code,
            error_message: db.error_message,
            diagnostics,
        }
    }
}
