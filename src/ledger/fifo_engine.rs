use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

use super::ledger_errors::{LedgerError, Result};
use crate::events::TradeSide;

/// One trade fill feeding the FIFO computation.
#[derive(Debug, Clone)]
pub struct FifoTradeInput {
    pub event_trade_fill_id: String,
    /// Deterministic tiebreaker when timestamps collide.
    pub source_raw_record_id: i64,
    pub trade_timestamp_utc: DateTime<Utc>,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Combined fee magnitude (fees + commission) for this fill.
    pub fees: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotStatus {
    Open,
    Closed,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Open => "open",
            LotStatus::Closed => "closed",
        }
    }
}

/// One FIFO lot after the computation, quantities signed by direction.
#[derive(Debug, Clone, PartialEq)]
pub struct FifoLot {
    pub open_event_trade_fill_id: String,
    pub source_raw_record_id: i64,
    pub opened_at_utc: DateTime<Utc>,
    pub closed_at_utc: Option<DateTime<Utc>>,
    pub open_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub open_price: Decimal,
    pub cost_basis_open: Decimal,
    pub realized_pnl_to_date: Decimal,
    pub status: LotStatus,
}

/// Deterministic output of one instrument's FIFO replay.
#[derive(Debug, Clone, PartialEq)]
pub struct FifoComputation {
    /// Signed open quantity after all fills.
    pub position_quantity: Decimal,
    /// Realized P&L including closing-side fee allocations.
    pub realized_pnl: Decimal,
    /// Every lot the replay produced, open and closed, in opening order.
    pub lots: Vec<FifoLot>,
}

impl FifoComputation {
    pub fn open_lots(&self) -> impl Iterator<Item = &FifoLot> {
        self.lots.iter().filter(|lot| lot.status == LotStatus::Open)
    }

    /// Cost basis of the open position: remaining quantity at unit basis,
    /// which retains the allocated share of opening fees.
    pub fn open_cost_basis(&self) -> Decimal {
        self.open_lots()
            .filter(|lot| !lot.open_quantity.is_zero())
            .map(|lot| lot.cost_basis_open / lot.open_quantity * lot.remaining_quantity)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Long,
    Short,
}

#[derive(Debug)]
struct OpenLotState {
    direction: Direction,
    open_event_trade_fill_id: String,
    source_raw_record_id: i64,
    opened_at_utc: DateTime<Utc>,
    open_quantity: Decimal,
    open_price: Decimal,
    unit_basis: Decimal,
    remaining_quantity: Decimal,
    realized_pnl_to_date: Decimal,
}

impl OpenLotState {
    fn into_lot(self, closed_at: Option<DateTime<Utc>>) -> FifoLot {
        let sign = match self.direction {
            Direction::Long => Decimal::ONE,
            Direction::Short => -Decimal::ONE,
        };
        let status = if self.remaining_quantity.is_zero() {
            LotStatus::Closed
        } else {
            LotStatus::Open
        };
        FifoLot {
            open_event_trade_fill_id: self.open_event_trade_fill_id,
            source_raw_record_id: self.source_raw_record_id,
            opened_at_utc: self.opened_at_utc,
            closed_at_utc: if status == LotStatus::Closed { closed_at } else { None },
            open_quantity: self.open_quantity * sign,
            remaining_quantity: self.remaining_quantity * sign,
            open_price: self.open_price,
            cost_basis_open: self.unit_basis * self.open_quantity * sign,
            realized_pnl_to_date: self.realized_pnl_to_date,
            status,
        }
    }
}

/// Replays trade fills through a FIFO queue of lots.
///
/// A BUY appends a long lot; a SELL consumes from the head of the queue (and
/// opens a short lot when it exceeds the open long quantity). Opening fees
/// enter the lot basis; closing-side fees are charged against realized P&L in
/// full at close time. Identical input sequences produce identical results.
pub fn compute_fifo(trades: &[FifoTradeInput]) -> Result<FifoComputation> {
    let mut sorted: Vec<&FifoTradeInput> = trades.iter().collect();
    sorted.sort_by_key(|trade| (trade.trade_timestamp_utc, trade.source_raw_record_id));

    let mut open_lots: VecDeque<OpenLotState> = VecDeque::new();
    let mut finished_lots: Vec<FifoLot> = Vec::new();
    let mut realized_pnl = Decimal::ZERO;

    for trade in sorted {
        let quantity = trade.quantity.abs();
        if quantity.is_zero() {
            continue;
        }
        let fees = trade.fees.abs();

        let opens_direction = match trade.side {
            TradeSide::Buy => Direction::Long,
            TradeSide::Sell => Direction::Short,
        };
        let closes_direction = match opens_direction {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        };

        let mut quantity_left = quantity;
        let mut matched_quantity = Decimal::ZERO;
        let mut matched_realized = Decimal::ZERO;

        while quantity_left > Decimal::ZERO
            && open_lots
                .front()
                .map(|lot| lot.direction == closes_direction)
                .unwrap_or(false)
        {
            let lot = open_lots.front_mut().unwrap();
            let close_quantity = quantity_left.min(lot.remaining_quantity);
            let lot_realized = match closes_direction {
                Direction::Long => (trade.price - lot.unit_basis) * close_quantity,
                Direction::Short => (lot.unit_basis - trade.price) * close_quantity,
            };

            lot.remaining_quantity -= close_quantity;
            lot.realized_pnl_to_date += lot_realized;
            matched_realized += lot_realized;
            matched_quantity += close_quantity;
            quantity_left -= close_quantity;

            if lot.remaining_quantity < Decimal::ZERO {
                return Err(LedgerError::InvariantViolation(format!(
                    "negative remaining quantity on lot opened by {}",
                    lot.open_event_trade_fill_id
                )));
            }
            if lot.remaining_quantity.is_zero() {
                let exhausted = open_lots.pop_front().unwrap();
                finished_lots.push(exhausted.into_lot(Some(trade.trade_timestamp_utc)));
            }
        }

        if matched_quantity > Decimal::ZERO {
            let close_fee_share = fees * (matched_quantity / quantity);
            realized_pnl += matched_realized - close_fee_share;
        }

        if quantity_left > Decimal::ZERO {
            let open_fee_share = fees * (quantity_left / quantity);
            let unit_basis = match opens_direction {
                Direction::Long => (trade.price * quantity_left + open_fee_share) / quantity_left,
                Direction::Short => (trade.price * quantity_left - open_fee_share) / quantity_left,
            };
            open_lots.push_back(OpenLotState {
                direction: opens_direction,
                open_event_trade_fill_id: trade.event_trade_fill_id.clone(),
                source_raw_record_id: trade.source_raw_record_id,
                opened_at_utc: trade.trade_timestamp_utc,
                open_quantity: quantity_left,
                open_price: trade.price,
                unit_basis,
                remaining_quantity: quantity_left,
                realized_pnl_to_date: Decimal::ZERO,
            });
        }
    }

    let mut lots = finished_lots;
    lots.extend(open_lots.into_iter().map(|lot| lot.into_lot(None)));
    lots.sort_by_key(|lot| (lot.opened_at_utc, lot.source_raw_record_id));

    let position_quantity: Decimal = lots
        .iter()
        .filter(|lot| lot.status == LotStatus::Open)
        .map(|lot| lot.remaining_quantity)
        .sum();

    Ok(FifoComputation {
        position_quantity,
        realized_pnl,
        lots,
    })
}

/// Unrealized P&L of the open lots at a mark price.
pub fn unrealized_at_mark(computation: &FifoComputation, mark_price: Decimal) -> Decimal {
    computation
        .open_lots()
        .filter(|lot| !lot.open_quantity.is_zero())
        .map(|lot| {
            let unit_basis = lot.cost_basis_open / lot.open_quantity;
            (mark_price - unit_basis) * lot.remaining_quantity
        })
        .sum()
}
