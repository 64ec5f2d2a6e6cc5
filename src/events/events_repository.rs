use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use log::{debug, warn};
use std::sync::Arc;
use uuid::Uuid;

use super::events_errors::{EventError, Result};
use super::events_model::*;
use crate::db::{get_connection, DbPool};
use crate::schema::{event_cashflows, event_corp_actions, event_fx_rates, event_trade_fills};

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Repository for canonical event persistence.
///
/// Every operation is a natural-key UPSERT so retried runs converge without
/// operator intervention.
pub struct EventRepository {
    pool: Arc<DbPool>,
}

impl EventRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Upserts a trade fill by (account, ib_exec_id).
    ///
    /// On collision only the mutable numeric fields are rewritten; the
    /// ingestion run of the earliest observation is preserved.
    pub fn upsert_trade_fill(&self, request: &TradeFillUpsert) -> Result<TradeFill> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| EventError::DatabaseError(e.to_string()))?;
        let now = Utc::now().naive_utc();

        let candidate = TradeFillDB {
            id: Uuid::new_v4().to_string(),
            account_id: request.account_id.clone(),
            instrument_id: request.instrument_id.clone(),
            ingestion_run_id: request.ingestion_run_id.clone(),
            source_raw_record_id: request.source_raw_record_id,
            ib_exec_id: request.ib_exec_id.clone(),
            transaction_id: request.transaction_id.clone(),
            trade_timestamp_utc: request.trade_timestamp_utc.naive_utc(),
            report_date_local: date_text(request.report_date_local),
            side: request.side.as_str().to_string(),
            quantity: request.quantity.to_string(),
            price: request.price.to_string(),
            cost: request.cost.map(|d| d.to_string()),
            commission: request.commission.map(|d| d.to_string()),
            fees: request.fees.map(|d| d.to_string()),
            realized_pnl: request.realized_pnl.map(|d| d.to_string()),
            net_cash: request.net_cash.map(|d| d.to_string()),
            net_cash_in_base: request.net_cash_in_base.map(|d| d.to_string()),
            fx_rate_to_base: request.fx_rate_to_base.map(|d| d.to_string()),
            currency: request.currency.clone(),
            functional_currency: request.functional_currency.clone(),
            created_at_utc: now,
            updated_at_utc: now,
        };

        diesel::insert_into(event_trade_fills::table)
            .values(&candidate)
            .on_conflict((
                event_trade_fills::account_id,
                event_trade_fills::ib_exec_id,
            ))
            .do_update()
            .set((
                event_trade_fills::commission.eq(candidate.commission.clone()),
                event_trade_fills::realized_pnl.eq(candidate.realized_pnl.clone()),
                event_trade_fills::net_cash.eq(candidate.net_cash.clone()),
                event_trade_fills::cost.eq(candidate.cost.clone()),
                event_trade_fills::updated_at_utc.eq(now),
            ))
            .execute(&mut conn)?;

        let stored = event_trade_fills::table
            .filter(event_trade_fills::account_id.eq(&request.account_id))
            .filter(event_trade_fills::ib_exec_id.eq(&request.ib_exec_id))
            .select(TradeFillDB::as_select())
            .first::<TradeFillDB>(&mut conn)?;

        Ok(TradeFill::from(stored))
    }

    /// Upserts a cashflow by (account, transaction_id, cash_action, currency).
    ///
    /// A duplicate key arriving with a different amount or date rewrites the
    /// numeric fields and marks the row as a correction; an identical
    /// duplicate is a no-op.
    pub fn upsert_cashflow(&self, request: &CashflowUpsert) -> Result<Cashflow> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| EventError::DatabaseError(e.to_string()))?;
        let now = Utc::now().naive_utc();

        let stored = conn.transaction::<CashflowDB, diesel::result::Error, _>(|conn| {
            let existing = event_cashflows::table
                .filter(event_cashflows::account_id.eq(&request.account_id))
                .filter(event_cashflows::transaction_id.eq(&request.transaction_id))
                .filter(event_cashflows::cash_action.eq(&request.cash_action))
                .filter(event_cashflows::currency.eq(&request.currency))
                .select(CashflowDB::as_select())
                .first::<CashflowDB>(conn)
                .optional()?;

            match existing {
                None => {
                    let candidate = CashflowDB {
                        id: Uuid::new_v4().to_string(),
                        account_id: request.account_id.clone(),
                        instrument_id: request.instrument_id.clone(),
                        ingestion_run_id: request.ingestion_run_id.clone(),
                        source_raw_record_id: request.source_raw_record_id,
                        transaction_id: request.transaction_id.clone(),
                        cash_action: request.cash_action.clone(),
                        report_date_local: date_text(request.report_date_local),
                        effective_at_utc: request.effective_at_utc.map(|dt| dt.naive_utc()),
                        amount: request.amount.to_string(),
                        amount_in_base: request.amount_in_base.map(|d| d.to_string()),
                        currency: request.currency.clone(),
                        functional_currency: request.functional_currency.clone(),
                        withholding_tax: request.withholding_tax.map(|d| d.to_string()),
                        fees: request.fees.map(|d| d.to_string()),
                        is_correction: false,
                        created_at_utc: now,
                        updated_at_utc: now,
                    };
                    diesel::insert_into(event_cashflows::table)
                        .values(&candidate)
                        .execute(conn)?;
                    Ok(candidate)
                }
                Some(current) => {
                    let amount_changed = Cashflow::from(current.clone()).amount != request.amount;
                    let date_changed =
                        current.report_date_local != date_text(request.report_date_local);

                    if !amount_changed && !date_changed {
                        return Ok(current);
                    }

                    debug!(
                        "Cashflow correction for transaction {} ({}): amount/date changed",
                        request.transaction_id, request.cash_action
                    );
                    diesel::update(event_cashflows::table.find(&current.id))
                        .set((
                            event_cashflows::amount.eq(request.amount.to_string()),
                            event_cashflows::amount_in_base
                                .eq(request.amount_in_base.map(|d| d.to_string())),
                            event_cashflows::report_date_local
                                .eq(date_text(request.report_date_local)),
                            event_cashflows::effective_at_utc
                                .eq(request.effective_at_utc.map(|dt| dt.naive_utc())),
                            event_cashflows::withholding_tax
                                .eq(request.withholding_tax.map(|d| d.to_string())),
                            event_cashflows::fees.eq(request.fees.map(|d| d.to_string())),
                            event_cashflows::is_correction.eq(true),
                            event_cashflows::updated_at_utc.eq(now),
                        ))
                        .execute(conn)?;

                    event_cashflows::table
                        .find(&current.id)
                        .select(CashflowDB::as_select())
                        .first::<CashflowDB>(conn)
                }
            }
        })?;

        Ok(Cashflow::from(stored))
    }

    /// Upserts an FX event by (account, transaction, currency, functional currency).
    pub fn upsert_fx_rate(&self, request: &FxRateUpsert) -> Result<FxRateEvent> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| EventError::DatabaseError(e.to_string()))?;
        let now = Utc::now().naive_utc();

        let candidate = FxRateEventDB {
            id: Uuid::new_v4().to_string(),
            account_id: request.account_id.clone(),
            ingestion_run_id: request.ingestion_run_id.clone(),
            source_raw_record_id: request.source_raw_record_id,
            transaction_id: request.transaction_id.clone(),
            report_date_local: date_text(request.report_date_local),
            currency: request.currency.clone(),
            functional_currency: request.functional_currency.clone(),
            fx_rate: request.fx_rate.map(|d| d.to_string()),
            fx_source: request.fx_source.clone(),
            provisional: request.provisional,
            diagnostic_code: request.diagnostic_code.clone(),
            created_at_utc: now,
            updated_at_utc: now,
        };

        diesel::insert_into(event_fx_rates::table)
            .values(&candidate)
            .on_conflict((
                event_fx_rates::account_id,
                event_fx_rates::transaction_id,
                event_fx_rates::currency,
                event_fx_rates::functional_currency,
            ))
            .do_update()
            .set((
                event_fx_rates::report_date_local.eq(candidate.report_date_local.clone()),
                event_fx_rates::fx_rate.eq(candidate.fx_rate.clone()),
                event_fx_rates::fx_source.eq(candidate.fx_source.clone()),
                event_fx_rates::provisional.eq(candidate.provisional),
                event_fx_rates::diagnostic_code.eq(candidate.diagnostic_code.clone()),
                event_fx_rates::updated_at_utc.eq(now),
            ))
            .execute(&mut conn)?;

        let stored = event_fx_rates::table
            .filter(event_fx_rates::account_id.eq(&request.account_id))
            .filter(event_fx_rates::transaction_id.eq(&request.transaction_id))
            .filter(event_fx_rates::currency.eq(&request.currency))
            .filter(event_fx_rates::functional_currency.eq(&request.functional_currency))
            .select(FxRateEventDB::as_select())
            .first::<FxRateEventDB>(&mut conn)?;

        Ok(FxRateEvent::from(stored))
    }

    /// Upserts a corporate action with the frozen primary/fallback key pair.
    ///
    /// A simultaneous collision on both keys is ambiguous: the upsert is
    /// skipped, the surviving rows are flagged for mandatory manual review,
    /// and downstream outputs for the instrument become provisional.
    pub fn upsert_corp_action(&self, request: &CorpActionUpsert) -> Result<CorpActionOutcome> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| EventError::DatabaseError(e.to_string()))?;
        let now = Utc::now().naive_utc();

        conn.transaction::<CorpActionOutcome, diesel::result::Error, _>(|conn| {
            let by_action_id = match &request.action_id {
                Some(action_id) => event_corp_actions::table
                    .filter(event_corp_actions::account_id.eq(&request.account_id))
                    .filter(event_corp_actions::action_id.eq(action_id))
                    .select(CorpActionDB::as_select())
                    .first::<CorpActionDB>(conn)
                    .optional()?,
                None => None,
            };

            let mut fallback_query = event_corp_actions::table
                .filter(event_corp_actions::account_id.eq(&request.account_id))
                .filter(event_corp_actions::conid.eq(&request.conid))
                .filter(
                    event_corp_actions::report_date_local
                        .eq(date_text(request.report_date_local)),
                )
                .filter(event_corp_actions::reorg_code.eq(&request.reorg_code))
                .into_boxed();
            fallback_query = match &request.transaction_id {
                Some(transaction_id) => fallback_query
                    .filter(event_corp_actions::transaction_id.eq(transaction_id.clone())),
                None => fallback_query.filter(event_corp_actions::transaction_id.is_null()),
            };
            let by_fallback = fallback_query
                .select(CorpActionDB::as_select())
                .first::<CorpActionDB>(conn)
                .optional()?;

            if let (Some(primary), Some(fallback)) = (&by_action_id, &by_fallback) {
                if primary.id != fallback.id {
                    warn!(
                        "Corporate action identity conflict for conid {} on {}: manual case opened",
                        request.conid, request.report_date_local
                    );
                    diesel::update(
                        event_corp_actions::table
                            .filter(event_corp_actions::id.eq_any(vec![
                                primary.id.clone(),
                                fallback.id.clone(),
                            ])),
                    )
                    .set((
                        event_corp_actions::requires_manual.eq(true),
                        event_corp_actions::provisional.eq(true),
                        event_corp_actions::updated_at_utc.eq(now),
                    ))
                    .execute(conn)?;
                    return Ok(CorpActionOutcome::ManualCase);
                }
            }

            let existing = by_action_id.or(by_fallback);
            match existing {
                Some(current) => {
                    diesel::update(event_corp_actions::table.find(&current.id))
                        .set((
                            event_corp_actions::instrument_id.eq(request.instrument_id.clone()),
                            event_corp_actions::description.eq(request.description.clone()),
                            event_corp_actions::updated_at_utc.eq(now),
                        ))
                        .execute(conn)?;
                    Ok(CorpActionOutcome::Updated)
                }
                None => {
                    let candidate = CorpActionDB {
                        id: Uuid::new_v4().to_string(),
                        account_id: request.account_id.clone(),
                        instrument_id: request.instrument_id.clone(),
                        conid: request.conid.clone(),
                        ingestion_run_id: request.ingestion_run_id.clone(),
                        source_raw_record_id: request.source_raw_record_id,
                        action_id: request.action_id.clone(),
                        transaction_id: request.transaction_id.clone(),
                        reorg_code: request.reorg_code.clone(),
                        report_date_local: date_text(request.report_date_local),
                        description: request.description.clone(),
                        requires_manual: false,
                        provisional: false,
                        created_at_utc: now,
                        updated_at_utc: now,
                    };
                    diesel::insert_into(event_corp_actions::table)
                        .values(&candidate)
                        .execute(conn)?;
                    Ok(CorpActionOutcome::Inserted)
                }
            }
        })
        .map_err(EventError::from)
    }

    /// Trade fills for an account up to and including a local report date,
    /// ordered for deterministic FIFO replay.
    pub fn get_trade_fills_through_date(
        &self,
        account_id: &str,
        through_date: NaiveDate,
    ) -> Result<Vec<TradeFill>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| EventError::DatabaseError(e.to_string()))?;

        event_trade_fills::table
            .filter(event_trade_fills::account_id.eq(account_id))
            .filter(event_trade_fills::report_date_local.le(date_text(through_date)))
            .select(TradeFillDB::as_select())
            .order((
                event_trade_fills::trade_timestamp_utc.asc(),
                event_trade_fills::source_raw_record_id.asc(),
            ))
            .load::<TradeFillDB>(&mut conn)
            .map(|rows| rows.into_iter().map(TradeFill::from).collect())
            .map_err(EventError::from)
    }

    /// Cashflows for an account up to and including a local report date.
    pub fn get_cashflows_through_date(
        &self,
        account_id: &str,
        through_date: NaiveDate,
    ) -> Result<Vec<Cashflow>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| EventError::DatabaseError(e.to_string()))?;

        event_cashflows::table
            .filter(event_cashflows::account_id.eq(account_id))
            .filter(event_cashflows::report_date_local.le(date_text(through_date)))
            .select(CashflowDB::as_select())
            .order(event_cashflows::report_date_local.asc())
            .load::<CashflowDB>(&mut conn)
            .map(|rows| rows.into_iter().map(Cashflow::from).collect())
            .map_err(EventError::from)
    }

    /// Conversion-rate FX candidates for one currency pair, oldest first.
    pub fn get_conversion_rate_candidates(
        &self,
        account_id: &str,
        currency: &str,
        functional_currency: &str,
    ) -> Result<Vec<FxRateEvent>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| EventError::DatabaseError(e.to_string()))?;

        event_fx_rates::table
            .filter(event_fx_rates::account_id.eq(account_id))
            .filter(event_fx_rates::currency.eq(currency))
            .filter(event_fx_rates::functional_currency.eq(functional_currency))
            .filter(event_fx_rates::fx_source.eq("conversion_rates"))
            .select(FxRateEventDB::as_select())
            .order((
                event_fx_rates::report_date_local.asc(),
                event_fx_rates::source_raw_record_id.asc(),
            ))
            .load::<FxRateEventDB>(&mut conn)
            .map(|rows| rows.into_iter().map(FxRateEvent::from).collect())
            .map_err(EventError::from)
    }

    /// Instrument ids carrying an unresolved manual corporate-action case.
    pub fn get_manual_case_instrument_ids(&self, account_id: &str) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| EventError::DatabaseError(e.to_string()))?;

        let rows: Vec<Option<String>> = event_corp_actions::table
            .filter(event_corp_actions::account_id.eq(account_id))
            .filter(event_corp_actions::requires_manual.eq(true))
            .select(event_corp_actions::instrument_id)
            .load::<Option<String>>(&mut conn)?;

        let mut ids: Vec<String> = rows.into_iter().flatten().collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    pub fn get_trade_fill_by_exec_id(
        &self,
        account_id: &str,
        ib_exec_id: &str,
    ) -> Result<Option<TradeFill>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| EventError::DatabaseError(e.to_string()))?;

        event_trade_fills::table
            .filter(event_trade_fills::account_id.eq(account_id))
            .filter(event_trade_fills::ib_exec_id.eq(ib_exec_id))
            .select(TradeFillDB::as_select())
            .first::<TradeFillDB>(&mut conn)
            .optional()
            .map(|row| row.map(TradeFill::from))
            .map_err(EventError::from)
    }
}
