use chrono::Utc;
use diesel::prelude::*;
use log::debug;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use super::statements_errors::{Result, StatementError};
use super::statements_model::*;
use crate::db::{get_connection, DbPool};
use crate::schema::{raw_artifacts, raw_records};

/// Repository owning raw artifact and raw row persistence.
///
/// This layer has no awareness of canonical semantics; it is the provenance
/// floor every downstream number traces back to.
pub struct StatementRepository {
    pool: Arc<DbPool>,
}

impl StatementRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Inserts a content-addressed artifact or returns the existing row.
    ///
    /// The dedupe key is (account, period_key, flex_query_id, sha256(payload));
    /// an existing artifact is never overwritten.
    pub fn upsert_artifact(
        &self,
        ingestion_run_id: &str,
        account_id: &str,
        period_key: &str,
        flex_query_id: &str,
        report_date_local: Option<chrono::NaiveDate>,
        payload: &[u8],
    ) -> Result<ArtifactUpsertOutcome> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| StatementError::DatabaseError(e.to_string()))?;

        let payload_sha256 = sha256_hex(payload);
        let candidate = RawArtifactDB {
            id: Uuid::new_v4().to_string(),
            ingestion_run_id: ingestion_run_id.to_string(),
            account_id: account_id.to_string(),
            period_key: period_key.to_string(),
            flex_query_id: flex_query_id.to_string(),
            payload_sha256: payload_sha256.clone(),
            report_date_local: report_date_local.map(|d| d.format("%Y-%m-%d").to_string()),
            payload: payload.to_vec(),
            created_at_utc: Utc::now().naive_utc(),
        };

        let inserted = diesel::insert_into(raw_artifacts::table)
            .values(&candidate)
            .on_conflict((
                raw_artifacts::account_id,
                raw_artifacts::period_key,
                raw_artifacts::flex_query_id,
                raw_artifacts::payload_sha256,
            ))
            .do_nothing()
            .execute(&mut conn)?;

        let stored = raw_artifacts::table
            .filter(raw_artifacts::account_id.eq(account_id))
            .filter(raw_artifacts::period_key.eq(period_key))
            .filter(raw_artifacts::flex_query_id.eq(flex_query_id))
            .filter(raw_artifacts::payload_sha256.eq(&payload_sha256))
            .select(RawArtifactDB::as_select())
            .first::<RawArtifactDB>(&mut conn)?;

        debug!(
            "Artifact {} for sha {} ({})",
            stored.id,
            payload_sha256,
            if inserted == 0 { "deduplicated" } else { "created" }
        );

        Ok(ArtifactUpsertOutcome {
            artifact: RawArtifact::from(stored),
            deduplicated: inserted == 0,
        })
    }

    /// Inserts extracted rows with (artifact, section, source_row_ref) dedupe.
    pub fn insert_raw_rows(
        &self,
        ingestion_run_id: &str,
        raw_artifact_id: &str,
        account_id: &str,
        report_date_local: Option<chrono::NaiveDate>,
        rows: &[ExtractedRow],
    ) -> Result<RawRowInsertOutcome> {
        if rows.is_empty() {
            return Ok(RawRowInsertOutcome::default());
        }

        let mut conn = get_connection(&self.pool)
            .map_err(|e| StatementError::DatabaseError(e.to_string()))?;
        let now = Utc::now().naive_utc();
        let report_date_text = report_date_local.map(|d| d.format("%Y-%m-%d").to_string());

        let mut outcome = RawRowInsertOutcome::default();
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            for row in rows {
                let payload_json = serde_json::to_string(&row.source_payload)
                    .unwrap_or_else(|_| "{}".to_string());
                let new_row = NewRawRecordDB {
                    ingestion_run_id: ingestion_run_id.to_string(),
                    raw_artifact_id: raw_artifact_id.to_string(),
                    account_id: account_id.to_string(),
                    report_date_local: report_date_text.clone(),
                    section_name: row.section_name.clone(),
                    source_row_ref: row.source_row_ref.clone(),
                    source_payload: payload_json,
                    created_at_utc: now,
                };

                let inserted = diesel::insert_into(raw_records::table)
                    .values(&new_row)
                    .on_conflict((
                        raw_records::raw_artifact_id,
                        raw_records::section_name,
                        raw_records::source_row_ref,
                    ))
                    .do_nothing()
                    .execute(conn)?;

                if inserted == 0 {
                    outcome.deduplicated += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
            Ok(())
        })?;

        debug!(
            "Raw rows for artifact {}: {} inserted, {} deduplicated",
            raw_artifact_id, outcome.inserted, outcome.deduplicated
        );
        Ok(outcome)
    }

    /// Raw rows owned by one run, in insertion order.
    pub fn get_rows_for_run(&self, ingestion_run_id: &str) -> Result<Vec<RawRecord>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| StatementError::DatabaseError(e.to_string()))?;

        raw_records::table
            .filter(raw_records::ingestion_run_id.eq(ingestion_run_id))
            .select(RawRecordDB::as_select())
            .order(raw_records::id.asc())
            .load::<RawRecordDB>(&mut conn)
            .map(|rows| rows.into_iter().map(RawRecord::from).collect())
            .map_err(StatementError::from)
    }

    /// All raw rows for an account, optionally scoped to one statement period.
    pub fn get_rows_for_account(
        &self,
        account_id: &str,
        period_scope: Option<(&str, &str)>,
    ) -> Result<Vec<RawRecord>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| StatementError::DatabaseError(e.to_string()))?;

        let mut query = raw_records::table
            .inner_join(raw_artifacts::table)
            .filter(raw_records::account_id.eq(account_id))
            .into_boxed();

        if let Some((period_key, flex_query_id)) = period_scope {
            query = query
                .filter(raw_artifacts::period_key.eq(period_key))
                .filter(raw_artifacts::flex_query_id.eq(flex_query_id));
        }

        query
            .select(RawRecordDB::as_select())
            .order(raw_records::id.asc())
            .load::<RawRecordDB>(&mut conn)
            .map(|rows| rows.into_iter().map(RawRecord::from).collect())
            .map_err(StatementError::from)
    }

    /// Raw rows of one section for an account; valuation candidate input.
    pub fn get_rows_for_section(
        &self,
        account_id: &str,
        section_name: &str,
    ) -> Result<Vec<RawRecord>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| StatementError::DatabaseError(e.to_string()))?;

        raw_records::table
            .filter(raw_records::account_id.eq(account_id))
            .filter(raw_records::section_name.eq(section_name))
            .select(RawRecordDB::as_select())
            .order(raw_records::id.asc())
            .load::<RawRecordDB>(&mut conn)
            .map(|rows| rows.into_iter().map(RawRecord::from).collect())
            .map_err(StatementError::from)
    }
}

fn sha256_hex(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_is_stable() {
        let digest = sha256_hex(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
