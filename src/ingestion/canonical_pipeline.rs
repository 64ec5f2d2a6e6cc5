use log::debug;

use crate::errors::{Error, Result};
use crate::events::{CorpActionOutcome, EventRepository};
use crate::instruments::InstrumentRepository;
use crate::mapping::{CanonicalMappingService, CanonicalUpsertCounts, MappingError};
use crate::statements::RawRecord;

/// Maps run-scoped raw rows into canonical events and persists them.
///
/// Shared by the ingestion and reprocess orchestrators so both converge on
/// identical canonical state. Instrument upserts complete before any
/// dependent event upsert.
pub fn map_and_persist(
    mapping: &CanonicalMappingService,
    instruments: &InstrumentRepository,
    events: &EventRepository,
    account_id: &str,
    functional_currency: &str,
    rows: &[RawRecord],
) -> Result<CanonicalUpsertCounts> {
    let batch = mapping.build_canonical_batch(account_id, functional_currency, rows)?;

    let instruments_by_conid = instruments.upsert_instruments(&batch.instruments)?;
    let mut counts = CanonicalUpsertCounts {
        instrument_count: instruments_by_conid.len(),
        ..CanonicalUpsertCounts::default()
    };

    for mapped in &batch.trade_fills {
        let instrument = instruments_by_conid.get(&mapped.conid).ok_or_else(|| {
            Error::Mapping(MappingError::InvalidData(format!(
                "unresolved instrument for trade conid {}",
                mapped.conid
            )))
        })?;
        let mut request = mapped.request.clone();
        request.instrument_id = instrument.id.clone();
        events.upsert_trade_fill(&request)?;
        counts.trade_fill_count += 1;
    }

    for mapped in &batch.cashflows {
        let mut request = mapped.request.clone();
        request.instrument_id = mapped
            .conid
            .as_ref()
            .and_then(|conid| instruments_by_conid.get(conid))
            .map(|instrument| instrument.id.clone());
        events.upsert_cashflow(&request)?;
        counts.cashflow_count += 1;
    }

    for request in &batch.fx_rates {
        events.upsert_fx_rate(request)?;
        counts.fx_count += 1;
    }

    for request in &batch.corp_actions {
        let mut request = request.clone();
        request.instrument_id = instruments_by_conid
            .get(&request.conid)
            .map(|instrument| instrument.id.clone());
        match events.upsert_corp_action(&request)? {
            CorpActionOutcome::ManualCase => {
                counts.manual_case_count += 1;
            }
            CorpActionOutcome::Inserted | CorpActionOutcome::Updated => {
                counts.corp_action_count += 1;
            }
        }
    }

    debug!(
        "Canonical mapping persisted: {} instruments, {} fills, {} cashflows, {} fx, {} corp actions, {} manual cases",
        counts.instrument_count,
        counts.trade_fill_count,
        counts.cashflow_count,
        counts.fx_count,
        counts.corp_action_count,
        counts.manual_case_count
    );
    Ok(counts)
}
