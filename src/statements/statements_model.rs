use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Domain model for an immutable content-addressed statement payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArtifact {
    pub id: String,
    pub ingestion_run_id: String,
    pub account_id: String,
    pub period_key: String,
    pub flex_query_id: String,
    pub payload_sha256: String,
    pub report_date_local: Option<NaiveDate>,
    pub created_at_utc: NaiveDateTime,
}

/// Database model for raw artifacts
#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::raw_artifacts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RawArtifactDB {
    pub id: String,
    pub ingestion_run_id: String,
    pub account_id: String,
    pub period_key: String,
    pub flex_query_id: String,
    pub payload_sha256: String,
    pub report_date_local: Option<String>,
    pub payload: Vec<u8>,
    pub created_at_utc: NaiveDateTime,
}

impl From<RawArtifactDB> for RawArtifact {
    fn from(db: RawArtifactDB) -> Self {
        Self {
            id: db.id,
            ingestion_run_id: db.ingestion_run_id,
            account_id: db.account_id,
            period_key: db.period_key,
            flex_query_id: db.flex_query_id,
            payload_sha256: db.payload_sha256,
            report_date_local: db
                .report_date_local
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            created_at_utc: db.created_at_utc,
        }
    }
}

/// Result of a content-addressed artifact upsert.
#[derive(Debug, Clone)]
pub struct ArtifactUpsertOutcome {
    pub artifact: RawArtifact,
    /// True when an identical payload was already stored; the idempotency signal.
    pub deduplicated: bool,
}

/// Domain model for one raw statement row.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub id: i64,
    pub ingestion_run_id: String,
    pub raw_artifact_id: String,
    pub account_id: String,
    pub report_date_local: Option<NaiveDate>,
    pub section_name: String,
    pub source_row_ref: String,
    pub source_payload: BTreeMap<String, String>,
}

/// Database model for raw records
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::raw_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RawRecordDB {
    pub id: i64,
    pub ingestion_run_id: String,
    pub raw_artifact_id: String,
    pub account_id: String,
    pub report_date_local: Option<String>,
    pub section_name: String,
    pub source_row_ref: String,
    pub source_payload: String,
    pub created_at_utc: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::raw_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewRawRecordDB {
    pub ingestion_run_id: String,
    pub raw_artifact_id: String,
    pub account_id: String,
    pub report_date_local: Option<String>,
    pub section_name: String,
    pub source_row_ref: String,
    pub source_payload: String,
    pub created_at_utc: NaiveDateTime,
}

impl From<RawRecordDB> for RawRecord {
    fn from(db: RawRecordDB) -> Self {
        let source_payload: BTreeMap<String, String> =
            serde_json::from_str(&db.source_payload).unwrap_or_else(|e| {
                log::error!(
                    "Failed to parse raw record {} payload as JSON: {}",
                    db.id,
                    e
                );
                BTreeMap::new()
            });
        Self {
            id: db.id,
            ingestion_run_id: db.ingestion_run_id,
            raw_artifact_id: db.raw_artifact_id,
            account_id: db.account_id,
            report_date_local: db
                .report_date_local
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            section_name: db.section_name,
            source_row_ref: db.source_row_ref,
            source_payload,
        }
    }
}

/// Counters from a raw-row batch insert.
#[derive(Debug, Clone, Default)]
pub struct RawRowInsertOutcome {
    pub inserted: usize,
    pub deduplicated: usize,
}

/// One row extracted from a statement section container.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub section_name: String,
    pub source_row_ref: String,
    pub source_payload: BTreeMap<String, String>,
}

/// All rows extracted from one Flex payload, plus statement metadata.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub report_date_local: Option<NaiveDate>,
    pub rows: Vec<ExtractedRow>,
}

/// Result of the required-section preflight check.
#[derive(Debug, Clone)]
pub struct SectionPreflightResult {
    pub detected_sections: Vec<String>,
    pub missing_hard_required: Vec<String>,
    pub missing_reconciliation_required: Vec<String>,
}

impl SectionPreflightResult {
    pub fn is_valid(&self) -> bool {
        self.missing_hard_required.is_empty() && self.missing_reconciliation_required.is_empty()
    }

    /// Sorted union of all missing required section names.
    pub fn missing_sections(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .missing_hard_required
            .iter()
            .chain(self.missing_reconciliation_required.iter())
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}
