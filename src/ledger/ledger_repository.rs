use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

use super::ledger_errors::{LedgerError, Result};
use super::ledger_model::*;
use crate::db::{get_connection, DbPool};
use crate::schema::{pnl_snapshots_daily, position_lots};

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Repository for position lots and daily P&L snapshots.
pub struct LedgerRepository {
    pool: Arc<DbPool>,
}

impl LedgerRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Persists lots and snapshot rows in one transaction so reruns converge
    /// atomically.
    pub fn persist_snapshot_batch(
        &self,
        lots: &[PositionLotUpsert],
        snapshots: &[PnlSnapshotUpsert],
    ) -> Result<()> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| LedgerError::DatabaseError(e.to_string()))?;
        let now = Utc::now().naive_utc();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            for lot in lots {
                let candidate = PositionLotDB {
                    id: lot.id.clone(),
                    account_id: lot.account_id.clone(),
                    instrument_id: lot.instrument_id.clone(),
                    open_event_trade_fill_id: lot.open_event_trade_fill_id.clone(),
                    opened_at_utc: lot.opened_at_utc.naive_utc(),
                    closed_at_utc: lot.closed_at_utc.map(|dt| dt.naive_utc()),
                    open_quantity: lot.open_quantity.to_string(),
                    remaining_quantity: lot.remaining_quantity.to_string(),
                    open_price: lot.open_price.to_string(),
                    cost_basis_open: lot.cost_basis_open.to_string(),
                    realized_pnl_to_date: lot.realized_pnl_to_date.to_string(),
                    status: lot.status.clone(),
                    created_at_utc: now,
                    updated_at_utc: now,
                };

                diesel::insert_into(position_lots::table)
                    .values(&candidate)
                    .on_conflict(position_lots::id)
                    .do_update()
                    .set((
                        position_lots::remaining_quantity
                            .eq(candidate.remaining_quantity.clone()),
                        position_lots::realized_pnl_to_date
                            .eq(candidate.realized_pnl_to_date.clone()),
                        position_lots::closed_at_utc.eq(candidate.closed_at_utc),
                        position_lots::status.eq(candidate.status.clone()),
                        position_lots::updated_at_utc.eq(now),
                    ))
                    .execute(conn)?;
            }

            for snapshot in snapshots {
                let candidate = PnlSnapshotDailyDB {
                    id: Uuid::new_v4().to_string(),
                    account_id: snapshot.account_id.clone(),
                    report_date_local: date_text(snapshot.report_date_local),
                    instrument_id: snapshot.instrument_id.clone(),
                    position_qty: snapshot.position_qty.to_string(),
                    cost_basis: snapshot.cost_basis.map(|d| d.to_string()),
                    realized_pnl: snapshot.realized_pnl.to_string(),
                    unrealized_pnl: snapshot.unrealized_pnl.to_string(),
                    total_pnl: snapshot.total_pnl.to_string(),
                    fees: snapshot.fees.to_string(),
                    withholding_tax: snapshot.withholding_tax.to_string(),
                    currency: snapshot.currency.clone(),
                    provisional: snapshot.provisional,
                    valuation_source: snapshot.valuation_source.clone(),
                    fx_source: snapshot.fx_source.clone(),
                    ingestion_run_id: snapshot.ingestion_run_id.clone(),
                    created_at_utc: now,
                    updated_at_utc: now,
                };

                diesel::insert_into(pnl_snapshots_daily::table)
                    .values(&candidate)
                    .on_conflict((
                        pnl_snapshots_daily::account_id,
                        pnl_snapshots_daily::report_date_local,
                        pnl_snapshots_daily::instrument_id,
                    ))
                    .do_update()
                    .set((
                        pnl_snapshots_daily::position_qty.eq(candidate.position_qty.clone()),
                        pnl_snapshots_daily::cost_basis.eq(candidate.cost_basis.clone()),
                        pnl_snapshots_daily::realized_pnl.eq(candidate.realized_pnl.clone()),
                        pnl_snapshots_daily::unrealized_pnl
                            .eq(candidate.unrealized_pnl.clone()),
                        pnl_snapshots_daily::total_pnl.eq(candidate.total_pnl.clone()),
                        pnl_snapshots_daily::fees.eq(candidate.fees.clone()),
                        pnl_snapshots_daily::withholding_tax
                            .eq(candidate.withholding_tax.clone()),
                        pnl_snapshots_daily::currency.eq(candidate.currency.clone()),
                        pnl_snapshots_daily::provisional.eq(candidate.provisional),
                        pnl_snapshots_daily::valuation_source
                            .eq(candidate.valuation_source.clone()),
                        pnl_snapshots_daily::fx_source.eq(candidate.fx_source.clone()),
                        pnl_snapshots_daily::ingestion_run_id
                            .eq(candidate.ingestion_run_id.clone()),
                        pnl_snapshots_daily::updated_at_utc.eq(now),
                    ))
                    .execute(conn)?;
            }
            Ok(())
        })?;

        debug!(
            "Persisted snapshot batch: {} lots, {} snapshot rows",
            lots.len(),
            snapshots.len()
        );
        Ok(())
    }

    pub fn get_lots_for_instrument(
        &self,
        account_id: &str,
        instrument_id: &str,
    ) -> Result<Vec<PositionLot>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| LedgerError::DatabaseError(e.to_string()))?;

        position_lots::table
            .filter(position_lots::account_id.eq(account_id))
            .filter(position_lots::instrument_id.eq(instrument_id))
            .select(PositionLotDB::as_select())
            .order(position_lots::opened_at_utc.asc())
            .load::<PositionLotDB>(&mut conn)
            .map(|rows| rows.into_iter().map(PositionLot::from).collect())
            .map_err(LedgerError::from)
    }

    pub fn get_snapshots_for_date(
        &self,
        account_id: &str,
        report_date_local: NaiveDate,
    ) -> Result<Vec<PnlSnapshotDaily>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| LedgerError::DatabaseError(e.to_string()))?;

        pnl_snapshots_daily::table
            .filter(pnl_snapshots_daily::account_id.eq(account_id))
            .filter(pnl_snapshots_daily::report_date_local.eq(date_text(report_date_local)))
            .select(PnlSnapshotDailyDB::as_select())
            .order(pnl_snapshots_daily::instrument_id.asc())
            .load::<PnlSnapshotDailyDB>(&mut conn)
            .map(|rows| rows.into_iter().map(PnlSnapshotDaily::from).collect())
            .map_err(LedgerError::from)
    }

    pub fn get_snapshot(
        &self,
        account_id: &str,
        report_date_local: NaiveDate,
        instrument_id: &str,
    ) -> Result<Option<PnlSnapshotDaily>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| LedgerError::DatabaseError(e.to_string()))?;

        pnl_snapshots_daily::table
            .filter(pnl_snapshots_daily::account_id.eq(account_id))
            .filter(pnl_snapshots_daily::report_date_local.eq(date_text(report_date_local)))
            .filter(pnl_snapshots_daily::instrument_id.eq(instrument_id))
            .select(PnlSnapshotDailyDB::as_select())
            .first::<PnlSnapshotDailyDB>(&mut conn)
            .optional()
            .map(|row| row.map(PnlSnapshotDaily::from))
            .map_err(LedgerError::from)
    }
}
