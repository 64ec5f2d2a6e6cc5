use chrono::Utc;
use diesel::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::instruments_errors::{InstrumentError, Result};
use super::instruments_model::{Instrument, InstrumentDB, InstrumentUpsert};
use crate::db::{get_connection, DbPool};
use crate::schema::instruments;

/// Repository for conid-first instrument identity.
pub struct InstrumentRepository {
    pool: Arc<DbPool>,
}

impl InstrumentRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Upserts one instrument by (account, conid), refreshing alias attributes.
    pub fn upsert_instrument(&self, request: &InstrumentUpsert) -> Result<Instrument> {
        if request.conid.trim().is_empty() {
            return Err(InstrumentError::InvalidData(
                "conid must not be blank".to_string(),
            ));
        }

        let mut conn = get_connection(&self.pool)
            .map_err(|e| InstrumentError::DatabaseError(e.to_string()))?;
        let now = Utc::now().naive_utc();

        let candidate = InstrumentDB {
            id: Uuid::new_v4().to_string(),
            account_id: request.account_id.clone(),
            conid: request.conid.clone(),
            symbol: request.symbol.clone(),
            local_symbol: request.local_symbol.clone(),
            isin: request.isin.clone(),
            cusip: request.cusip.clone(),
            figi: request.figi.clone(),
            asset_category: request.asset_category.clone(),
            currency: request.currency.clone(),
            description: request.description.clone(),
            is_active: true,
            created_at_utc: now,
            updated_at_utc: now,
        };

        diesel::insert_into(instruments::table)
            .values(&candidate)
            .on_conflict((instruments::account_id, instruments::conid))
            .do_update()
            .set((
                instruments::symbol.eq(&request.symbol),
                instruments::local_symbol.eq(&request.local_symbol),
                instruments::isin.eq(&request.isin),
                instruments::cusip.eq(&request.cusip),
                instruments::figi.eq(&request.figi),
                instruments::asset_category.eq(&request.asset_category),
                instruments::currency.eq(&request.currency),
                instruments::description.eq(&request.description),
                instruments::updated_at_utc.eq(now),
            ))
            .execute(&mut conn)?;

        let stored = instruments::table
            .filter(instruments::account_id.eq(&request.account_id))
            .filter(instruments::conid.eq(&request.conid))
            .select(InstrumentDB::as_select())
            .first::<InstrumentDB>(&mut conn)?;

        Ok(Instrument::from(stored))
    }

    /// Upserts a batch and returns the instrument map keyed by conid.
    pub fn upsert_instruments(
        &self,
        requests: &[InstrumentUpsert],
    ) -> Result<HashMap<String, Instrument>> {
        // Last write per conid wins within one batch.
        let mut unique: HashMap<String, &InstrumentUpsert> = HashMap::new();
        for request in requests {
            unique.insert(request.conid.clone(), request);
        }

        let mut by_conid = HashMap::new();
        for (conid, request) in unique {
            let instrument = self.upsert_instrument(request)?;
            by_conid.insert(conid, instrument);
        }
        Ok(by_conid)
    }

    pub fn get_instrument(&self, instrument_id: &str) -> Result<Instrument> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| InstrumentError::DatabaseError(e.to_string()))?;

        instruments::table
            .find(instrument_id)
            .select(InstrumentDB::as_select())
            .first::<InstrumentDB>(&mut conn)
            .map(Instrument::from)
            .map_err(InstrumentError::from)
    }

    pub fn get_instruments_for_account(&self, account_id: &str) -> Result<Vec<Instrument>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| InstrumentError::DatabaseError(e.to_string()))?;

        instruments::table
            .filter(instruments::account_id.eq(account_id))
            .select(InstrumentDB::as_select())
            .order(instruments::conid.asc())
            .load::<InstrumentDB>(&mut conn)
            .map(|rows| rows.into_iter().map(Instrument::from).collect())
            .map_err(InstrumentError::from)
    }

    pub fn find_by_conid(&self, account_id: &str, conid: &str) -> Result<Option<Instrument>> {
        let mut conn = get_connection(&self.pool)
            .map_err(|e| InstrumentError::DatabaseError(e.to_string()))?;

        instruments::table
            .filter(instruments::account_id.eq(account_id))
            .filter(instruments::conid.eq(conid))
            .select(InstrumentDB::as_select())
            .first::<InstrumentDB>(&mut conn)
            .optional()
            .map(|row| row.map(Instrument::from))
            .map_err(InstrumentError::from)
    }
}
