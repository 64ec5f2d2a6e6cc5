use chrono::{DateTime, Utc};
use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::fifo_engine::{compute_fifo, FifoTradeInput};
use super::ledger_model::{PnlSnapshotUpsert, PositionLotUpsert, SnapshotBuildResult};
use super::ledger_repository::LedgerRepository;
use super::snapshot_dates::resolve_report_date_local;
use crate::errors::Result;
use crate::events::{Cashflow, EventRepository, TradeFill, TradeSide};
use crate::instruments::InstrumentRepository;
use crate::valuation::ValuationService;
use std::str::FromStr;

/// Builds and persists per-instrument daily P&L snapshots from canonical
/// events. Fully regenerable: reruns over the same events converge.
pub struct SnapshotService {
    events: Arc<EventRepository>,
    instruments: Arc<InstrumentRepository>,
    valuation: Arc<ValuationService>,
    ledger: Arc<LedgerRepository>,
}

impl SnapshotService {
    pub fn new(
        events: Arc<EventRepository>,
        instruments: Arc<InstrumentRepository>,
        valuation: Arc<ValuationService>,
        ledger: Arc<LedgerRepository>,
    ) -> Self {
        Self {
            events,
            instruments,
            valuation,
            ledger,
        }
    }

    /// Builds the daily snapshot for the local business date of the given
    /// run-completion instant and persists it in one atomic batch.
    pub fn build_and_persist(
        &self,
        account_id: &str,
        ingestion_run_id: Option<&str>,
        run_completed_at_utc: DateTime<Utc>,
        functional_currency: &str,
    ) -> Result<SnapshotBuildResult> {
        let report_date = resolve_report_date_local(run_completed_at_utc);
        debug!(
            "Building snapshot for account {} on {}",
            account_id, report_date
        );

        let trades = self
            .events
            .get_trade_fills_through_date(account_id, report_date)?;
        let cashflows = self
            .events
            .get_cashflows_through_date(account_id, report_date)?;
        let manual_instruments: HashSet<String> = self
            .events
            .get_manual_case_instrument_ids(account_id)?
            .into_iter()
            .collect();

        let trades_by_instrument = group_trades(&trades);
        let cashflows_by_instrument = group_cashflows(&cashflows);

        let mut lot_upserts: Vec<PositionLotUpsert> = Vec::new();
        let mut snapshot_upserts: Vec<PnlSnapshotUpsert> = Vec::new();
        let mut provisional_count = 0usize;

        for (instrument_id, instrument_trades) in &trades_by_instrument {
            let instrument = self.instruments.get_instrument(instrument_id)?;

            let fifo_inputs: Vec<FifoTradeInput> = instrument_trades
                .iter()
                .map(|fill| FifoTradeInput {
                    event_trade_fill_id: fill.id.clone(),
                    source_raw_record_id: fill.source_raw_record_id,
                    trade_timestamp_utc: fill.trade_timestamp_utc,
                    side: TradeSide::from_str(&fill.side).unwrap_or(TradeSide::Buy),
                    quantity: fill.quantity,
                    price: fill.price,
                    fees: trade_fee_impact(fill),
                })
                .collect();
            let fifo = compute_fifo(&fifo_inputs).map_err(crate::errors::Error::Ledger)?;

            let instrument_cashflows = cashflows_by_instrument
                .get(instrument_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let withholding_through_date: Decimal = instrument_cashflows
                .iter()
                .filter_map(|flow| flow.withholding_tax)
                .map(|amount| amount.abs())
                .sum();
            let cash_fees_through_date: Decimal = instrument_cashflows
                .iter()
                .filter_map(|flow| flow.fees)
                .map(|amount| amount.abs())
                .sum();
            let withholding_on_date: Decimal = instrument_cashflows
                .iter()
                .filter(|flow| flow.report_date_local == report_date)
                .filter_map(|flow| flow.withholding_tax)
                .map(|amount| amount.abs())
                .sum();
            let fees_on_date: Decimal = instrument_cashflows
                .iter()
                .filter(|flow| flow.report_date_local == report_date)
                .filter_map(|flow| flow.fees)
                .map(|amount| amount.abs())
                .sum();

            let realized_pnl =
                fifo.realized_pnl - withholding_through_date - cash_fees_through_date;

            let mark = self
                .valuation
                .resolve_eod_mark(account_id, &instrument.conid, report_date)?;
            let position_qty = fifo.position_quantity;
            let open_cost_basis = fifo.open_cost_basis();
            let has_open_position = !position_qty.is_zero();

            let unrealized_pnl = match (has_open_position, mark.price) {
                (true, Some(price)) => position_qty * price - open_cost_basis,
                _ => Decimal::ZERO,
            };

            let last_trade = instrument_trades.last();
            let fx = self.valuation.resolve_execution_fx(
                account_id,
                last_trade.copied(),
                &instrument.currency,
                functional_currency,
                report_date,
            )?;

            let provisional = mark.provisional
                || fx.provisional
                || manual_instruments.contains(instrument_id.as_str());
            if provisional {
                provisional_count += 1;
            }

            let total_pnl = realized_pnl + unrealized_pnl;
            snapshot_upserts.push(PnlSnapshotUpsert {
                account_id: account_id.to_string(),
                report_date_local: report_date,
                instrument_id: instrument_id.clone(),
                position_qty,
                cost_basis: if has_open_position {
                    Some(open_cost_basis)
                } else {
                    None
                },
                realized_pnl,
                unrealized_pnl,
                total_pnl,
                fees: fees_on_date,
                withholding_tax: withholding_on_date,
                currency: functional_currency.to_string(),
                provisional,
                valuation_source: mark.source.as_str().to_string(),
                fx_source: fx.source.as_str().to_string(),
                ingestion_run_id: ingestion_run_id.map(str::to_string),
            });

            for lot in &fifo.lots {
                lot_upserts.push(PositionLotUpsert {
                    id: deterministic_lot_id(
                        account_id,
                        instrument_id,
                        &lot.open_event_trade_fill_id,
                    ),
                    account_id: account_id.to_string(),
                    instrument_id: instrument_id.clone(),
                    open_event_trade_fill_id: lot.open_event_trade_fill_id.clone(),
                    opened_at_utc: lot.opened_at_utc,
                    closed_at_utc: lot.closed_at_utc,
                    open_quantity: lot.open_quantity,
                    remaining_quantity: lot.remaining_quantity,
                    open_price: lot.open_price,
                    cost_basis_open: lot.cost_basis_open,
                    realized_pnl_to_date: lot.realized_pnl_to_date,
                    status: lot.status.as_str().to_string(),
                });
            }
        }

        self.ledger
            .persist_snapshot_batch(&lot_upserts, &snapshot_upserts)
            .map_err(crate::errors::Error::Ledger)?;

        info!(
            "Snapshot for {} on {}: {} instruments, {} lots, {} provisional",
            account_id,
            report_date,
            snapshot_upserts.len(),
            lot_upserts.len(),
            provisional_count
        );

        Ok(SnapshotBuildResult {
            report_date_local: report_date,
            snapshot_count: snapshot_upserts.len(),
            position_lot_count: lot_upserts.len(),
            provisional_count,
        })
    }
}

fn group_trades(trades: &[TradeFill]) -> BTreeMap<String, Vec<&TradeFill>> {
    let mut grouped: BTreeMap<String, Vec<&TradeFill>> = BTreeMap::new();
    for fill in trades {
        grouped
            .entry(fill.instrument_id.clone())
            .or_default()
            .push(fill);
    }
    grouped
}

fn group_cashflows(cashflows: &[Cashflow]) -> BTreeMap<String, Vec<&Cashflow>> {
    let mut grouped: BTreeMap<String, Vec<&Cashflow>> = BTreeMap::new();
    for flow in cashflows {
        if let Some(instrument_id) = &flow.instrument_id {
            grouped.entry(instrument_id.clone()).or_default().push(flow);
        }
    }
    grouped
}

fn trade_fee_impact(fill: &TradeFill) -> Decimal {
    fill.fees.map(|d| d.abs()).unwrap_or(Decimal::ZERO)
        + fill.commission.map(|d| d.abs()).unwrap_or(Decimal::ZERO)
}

fn deterministic_lot_id(account_id: &str, instrument_id: &str, open_fill_id: &str) -> String {
    let identity = format!("{}:{}:{}", account_id, instrument_id, open_fill_id);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, identity.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_lot_id_is_stable() {
        let first = deterministic_lot_id("U123", "inst-1", "E1");
        let second = deterministic_lot_id("U123", "inst-1", "E1");
        assert_eq!(first, second);
        assert_ne!(first, deterministic_lot_id("U123", "inst-1", "E2"));
    }
}
