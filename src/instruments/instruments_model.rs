use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Domain model for a conid-first instrument.
///
/// `conid` is the authoritative identity; symbol, ISIN, CUSIP and FIGI are
/// aliases refreshed on every upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: String,
    pub account_id: String,
    pub conid: String,
    pub symbol: String,
    pub local_symbol: Option<String>,
    pub isin: Option<String>,
    pub cusip: Option<String>,
    pub figi: Option<String>,
    pub asset_category: String,
    pub currency: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at_utc: NaiveDateTime,
    pub updated_at_utc: NaiveDateTime,
}

/// Database model for instruments
#[derive(Queryable, Selectable, Identifiable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::instruments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InstrumentDB {
    pub id: String,
    pub account_id: String,
    pub conid: String,
    pub symbol: String,
    pub local_symbol: Option<String>,
    pub isin: Option<String>,
    pub cusip: Option<String>,
    pub figi: Option<String>,
    pub asset_category: String,
    pub currency: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at_utc: NaiveDateTime,
    pub updated_at_utc: NaiveDateTime,
}

impl From<InstrumentDB> for Instrument {
    fn from(db: InstrumentDB) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            conid: db.conid,
            symbol: db.symbol,
            local_symbol: db.local_symbol,
            isin: db.isin,
            cusip: db.cusip,
            figi: db.figi,
            asset_category: db.asset_category,
            currency: db.currency,
            description: db.description,
            is_active: db.is_active,
            created_at_utc: db.created_at_utc,
            updated_at_utc: db.updated_at_utc,
        }
    }
}

/// Input model for a conid-first instrument upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentUpsert {
    pub account_id: String,
    pub conid: String,
    pub symbol: String,
    pub local_symbol: Option<String>,
    pub isin: Option<String>,
    pub cusip: Option<String>,
    pub figi: Option<String>,
    pub asset_category: String,
    pub currency: String,
    pub description: Option<String>,
}
