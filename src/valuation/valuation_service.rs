use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

use super::valuation_model::*;
use crate::errors::Result;
use crate::events::{EventRepository, TradeFill};
use crate::mapping::field_parsers::{parse_date, parse_decimal, parse_timestamp_utc};
use crate::statements::statements_constants::{SECTION_OPEN_POSITIONS, SECTION_TRADES};
use crate::statements::{RawRecord, StatementRepository};

const FX_RATE_SCALE: u32 = 10;

/// Applies the frozen EOD-mark hierarchy for one (conid, report date).
///
/// Pure over the candidate slices; tie-breaks are deterministic.
pub fn select_eod_mark(
    open_positions: &[OpenPositionMarkCandidate],
    trades: &[TradeMarkCandidate],
    conid: &str,
    report_date: NaiveDate,
) -> MarkResolution {
    // Priority 1: broker OpenPositions mark for the same conid and date.
    let mut p1: Vec<&OpenPositionMarkCandidate> = open_positions
        .iter()
        .filter(|candidate| candidate.conid == conid)
        .filter(|candidate| candidate.report_date == Some(report_date))
        .filter(|candidate| candidate.mark_price.is_some())
        .collect();
    p1.sort_by_key(|candidate| candidate.raw_record_id);
    if let Some(winner) = p1.last() {
        return MarkResolution {
            price: winner.mark_price,
            source: ValuationSource::OpenPositionsMark,
            provisional: false,
            diagnostic_code: None,
        };
    }

    // Priority 2: a trade's close price on the report date.
    let mut p2: Vec<&TradeMarkCandidate> = trades
        .iter()
        .filter(|candidate| candidate.conid == conid)
        .filter(|candidate| candidate.report_date == Some(report_date))
        .filter(|candidate| candidate.close_price.is_some())
        .collect();
    p2.sort_by_key(|candidate| {
        (
            candidate.trade_datetime,
            candidate.transaction_id_numeric,
        )
    });
    if let Some(winner) = p2.last() {
        return MarkResolution {
            price: winner.close_price,
            source: ValuationSource::TradesClosePrice,
            provisional: false,
            diagnostic_code: None,
        };
    }

    // Priority 3: last trade price on or before the report date.
    let mut p3: Vec<&TradeMarkCandidate> = trades
        .iter()
        .filter(|candidate| candidate.conid == conid)
        .filter(|candidate| matches!(candidate.report_date, Some(date) if date <= report_date))
        .filter(|candidate| candidate.trade_price.is_some())
        .collect();
    p3.sort_by_key(|candidate| {
        (
            candidate.trade_datetime,
            candidate.transaction_id_numeric,
            candidate.raw_record_id,
        )
    });
    if let Some(winner) = p3.last() {
        return MarkResolution {
            price: winner.trade_price,
            source: ValuationSource::TradePriceOnOrBefore,
            provisional: true,
            diagnostic_code: Some(DIAG_EOD_MARK_FALLBACK_LAST_TRADE.to_string()),
        };
    }

    MarkResolution {
        price: None,
        source: ValuationSource::MissingAllSources,
        provisional: true,
        diagnostic_code: Some(DIAG_EOD_MARK_MISSING_ALL_SOURCES.to_string()),
    }
}

/// Applies the frozen execution-FX hierarchy for one currency pair.
pub fn select_execution_fx(
    trade: Option<&TradeFxInputs>,
    conversion_rates: &[ConversionRateCandidate],
    currency: &str,
    functional_currency: &str,
    report_date: NaiveDate,
) -> FxResolution {
    if currency == functional_currency {
        return FxResolution {
            rate: Some(Decimal::ONE),
            source: FxSource::Identity,
            provisional: false,
            diagnostic_code: None,
        };
    }

    if let Some(inputs) = trade {
        // Priority 1: the execution-time rate reported on the trade row.
        if let Some(rate) = inputs.fx_rate_to_base {
            return FxResolution {
                rate: Some(rate),
                source: FxSource::TradesFxRate,
                provisional: false,
                diagnostic_code: None,
            };
        }

        // Priority 2: derived |netCashInBase| / |netCash|, half-even at 10 digits.
        if let (Some(net_cash), Some(net_cash_in_base)) =
            (inputs.net_cash, inputs.net_cash_in_base)
        {
            if !net_cash.is_zero() {
                let derived = (net_cash_in_base.abs() / net_cash.abs())
                    .round_dp_with_strategy(FX_RATE_SCALE, RoundingStrategy::MidpointNearestEven);
                return FxResolution {
                    rate: Some(derived),
                    source: FxSource::Derived,
                    provisional: false,
                    diagnostic_code: None,
                };
            }
        }
    }

    // Priority 3: ConversionRates on the exact date, else nearest previous date.
    let exact_or_previous = conversion_rates
        .iter()
        .filter(|candidate| candidate.report_date <= report_date)
        .max_by_key(|candidate| (candidate.report_date, candidate.raw_record_id));
    if let Some(winner) = exact_or_previous {
        return FxResolution {
            rate: Some(winner.rate),
            source: FxSource::ConversionRates,
            provisional: false,
            diagnostic_code: None,
        };
    }

    FxResolution {
        rate: None,
        source: FxSource::MissingAllSources,
        provisional: true,
        diagnostic_code: Some(DIAG_FX_RATE_MISSING_ALL_SOURCES.to_string()),
    }
}

/// Repository-backed resolver assembling candidate inputs from the store.
pub struct ValuationService {
    statements: Arc<StatementRepository>,
    events: Arc<EventRepository>,
}

impl ValuationService {
    pub fn new(statements: Arc<StatementRepository>, events: Arc<EventRepository>) -> Self {
        Self { statements, events }
    }

    /// EOD mark for one conid on a local report date.
    pub fn resolve_eod_mark(
        &self,
        account_id: &str,
        conid: &str,
        report_date: NaiveDate,
    ) -> Result<MarkResolution> {
        let open_position_rows = self
            .statements
            .get_rows_for_section(account_id, SECTION_OPEN_POSITIONS)?;
        let trade_rows = self
            .statements
            .get_rows_for_section(account_id, SECTION_TRADES)?;

        let open_positions: Vec<OpenPositionMarkCandidate> = open_position_rows
            .iter()
            .filter_map(open_position_candidate)
            .collect();
        let trades: Vec<TradeMarkCandidate> =
            trade_rows.iter().filter_map(trade_mark_candidate).collect();

        Ok(select_eod_mark(&open_positions, &trades, conid, report_date))
    }

    /// Execution FX for one event row's currency into the functional currency.
    pub fn resolve_execution_fx(
        &self,
        account_id: &str,
        trade: Option<&TradeFill>,
        currency: &str,
        functional_currency: &str,
        report_date: NaiveDate,
    ) -> Result<FxResolution> {
        let conversion_rates: Vec<ConversionRateCandidate> = self
            .events
            .get_conversion_rate_candidates(account_id, currency, functional_currency)?
            .into_iter()
            .filter_map(|event| {
                event.fx_rate.map(|rate| ConversionRateCandidate {
                    report_date: event.report_date_local,
                    rate,
                    raw_record_id: event.source_raw_record_id,
                })
            })
            .collect();

        let trade_inputs = trade.map(|fill| TradeFxInputs {
            fx_rate_to_base: fill.fx_rate_to_base,
            net_cash: fill.net_cash,
            net_cash_in_base: fill.net_cash_in_base,
        });

        Ok(select_execution_fx(
            trade_inputs.as_ref(),
            &conversion_rates,
            currency,
            functional_currency,
            report_date,
        ))
    }
}

// Candidate builders are permissive: a row that fails to parse is simply not
// a candidate, because resolution must never raise.

fn open_position_candidate(row: &RawRecord) -> Option<OpenPositionMarkCandidate> {
    let conid = row.source_payload.get("conid")?.trim().to_string();
    if conid.is_empty() {
        return None;
    }
    Some(OpenPositionMarkCandidate {
        conid,
        report_date: payload_date(row),
        mark_price: row
            .source_payload
            .get("markPrice")
            .and_then(|raw| parse_decimal(raw)),
        raw_record_id: row.id,
    })
}

fn trade_mark_candidate(row: &RawRecord) -> Option<TradeMarkCandidate> {
    let conid = row.source_payload.get("conid")?.trim().to_string();
    if conid.is_empty() {
        return None;
    }
    Some(TradeMarkCandidate {
        conid,
        report_date: payload_date(row),
        trade_datetime: row
            .source_payload
            .get("dateTime")
            .and_then(|raw| parse_timestamp_utc(raw)),
        transaction_id_numeric: row
            .source_payload
            .get("transactionID")
            .and_then(|raw| raw.trim().parse::<i64>().ok()),
        close_price: row
            .source_payload
            .get("closePrice")
            .and_then(|raw| parse_decimal(raw)),
        trade_price: row
            .source_payload
            .get("tradePrice")
            .and_then(|raw| parse_decimal(raw)),
        raw_record_id: row.id,
    })
}

fn payload_date(row: &RawRecord) -> Option<NaiveDate> {
    row.source_payload
        .get("reportDate")
        .and_then(|raw| parse_date(raw))
        .or(row.report_date_local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn trade_candidate(
        report_date: NaiveDate,
        close_price: Option<Decimal>,
        trade_price: Option<Decimal>,
        hour: u32,
        transaction_id: i64,
        raw_record_id: i64,
    ) -> TradeMarkCandidate {
        TradeMarkCandidate {
            conid: "42".to_string(),
            report_date: Some(report_date),
            trade_datetime: Some(
                Utc.from_utc_datetime(&report_date.and_hms_opt(hour, 0, 0).unwrap()),
            ),
            transaction_id_numeric: Some(transaction_id),
            close_price,
            trade_price,
            raw_record_id,
        }
    }

    #[test]
    fn test_mark_priority_1_open_positions_wins() {
        let open_positions = vec![OpenPositionMarkCandidate {
            conid: "42".to_string(),
            report_date: Some(date(2026, 2, 10)),
            mark_price: Some(dec!(50.25)),
            raw_record_id: 1,
        }];
        let trades = vec![trade_candidate(
            date(2026, 2, 10),
            Some(dec!(49.00)),
            Some(dec!(48.00)),
            14,
            1,
            2,
        )];

        let resolution = select_eod_mark(&open_positions, &trades, "42", date(2026, 2, 10));
        assert_eq!(resolution.price, Some(dec!(50.25)));
        assert_eq!(resolution.source, ValuationSource::OpenPositionsMark);
        assert!(!resolution.provisional);
    }

    #[test]
    fn test_mark_priority_2_latest_close_price_wins() {
        let trades = vec![
            trade_candidate(date(2026, 2, 10), Some(dec!(49.00)), None, 10, 1, 1),
            trade_candidate(date(2026, 2, 10), Some(dec!(49.50)), None, 15, 2, 2),
            // Same dateTime as the winner but lower transaction id.
            trade_candidate(date(2026, 2, 10), Some(dec!(49.25)), None, 15, 1, 3),
        ];

        let resolution = select_eod_mark(&[], &trades, "42", date(2026, 2, 10));
        assert_eq!(resolution.price, Some(dec!(49.50)));
        assert_eq!(resolution.source, ValuationSource::TradesClosePrice);
        assert!(!resolution.provisional);
    }

    #[test]
    fn test_mark_priority_3_is_provisional_fallback() {
        let trades = vec![
            trade_candidate(date(2026, 2, 9), None, Some(dec!(42.17)), 14, 1, 1),
            trade_candidate(date(2026, 2, 8), None, Some(dec!(41.00)), 14, 2, 2),
        ];

        let resolution = select_eod_mark(&[], &trades, "42", date(2026, 2, 10));
        assert_eq!(resolution.price, Some(dec!(42.17)));
        assert_eq!(resolution.source, ValuationSource::TradePriceOnOrBefore);
        assert!(resolution.provisional);
        assert_eq!(
            resolution.diagnostic_code.as_deref(),
            Some("EOD_MARK_FALLBACK_LAST_TRADE")
        );
    }

    #[test]
    fn test_mark_missing_all_sources() {
        let resolution = select_eod_mark(&[], &[], "42", date(2026, 2, 10));
        assert_eq!(resolution.price, None);
        assert!(resolution.provisional);
        assert_eq!(
            resolution.diagnostic_code.as_deref(),
            Some("EOD_MARK_MISSING_ALL_SOURCES")
        );
    }

    #[test]
    fn test_fx_identity_for_same_currency() {
        let resolution = select_execution_fx(None, &[], "USD", "USD", date(2026, 2, 10));
        assert_eq!(resolution.rate, Some(Decimal::ONE));
        assert_eq!(resolution.source, FxSource::Identity);
    }

    #[test]
    fn test_fx_priority_1_trade_rate() {
        let inputs = TradeFxInputs {
            fx_rate_to_base: Some(dec!(3.55)),
            net_cash: Some(dec!(-1000)),
            net_cash_in_base: Some(dec!(-3600)),
        };
        let resolution =
            select_execution_fx(Some(&inputs), &[], "USD", "ILS", date(2026, 2, 10));
        assert_eq!(resolution.rate, Some(dec!(3.55)));
        assert_eq!(resolution.source, FxSource::TradesFxRate);
    }

    #[test]
    fn test_fx_priority_2_derived_half_even() {
        let inputs = TradeFxInputs {
            fx_rate_to_base: None,
            net_cash: Some(dec!(-1000.00)),
            net_cash_in_base: Some(dec!(-3600.00)),
        };
        let resolution =
            select_execution_fx(Some(&inputs), &[], "USD", "ILS", date(2026, 2, 10));
        assert_eq!(resolution.source, FxSource::Derived);
        assert!(!resolution.provisional);
        assert_eq!(resolution.rate, Some(dec!(3.6000000000)));
    }

    #[test]
    fn test_fx_derived_rounds_half_even_at_ten_digits() {
        let inputs = TradeFxInputs {
            fx_rate_to_base: None,
            net_cash: Some(dec!(3)),
            net_cash_in_base: Some(dec!(1)),
        };
        let resolution =
            select_execution_fx(Some(&inputs), &[], "USD", "ILS", date(2026, 2, 10));
        assert_eq!(resolution.rate, Some(dec!(0.3333333333)));
    }

    #[test]
    fn test_fx_priority_3_exact_date_beats_previous() {
        let candidates = vec![
            ConversionRateCandidate {
                report_date: date(2026, 2, 9),
                rate: dec!(3.58),
                raw_record_id: 1,
            },
            ConversionRateCandidate {
                report_date: date(2026, 2, 10),
                rate: dec!(3.61),
                raw_record_id: 2,
            },
        ];
        let resolution =
            select_execution_fx(None, &candidates, "USD", "ILS", date(2026, 2, 10));
        assert_eq!(resolution.rate, Some(dec!(3.61)));
        assert_eq!(resolution.source, FxSource::ConversionRates);
    }

    #[test]
    fn test_fx_priority_3_nearest_previous_date() {
        let candidates = vec![
            ConversionRateCandidate {
                report_date: date(2026, 2, 6),
                rate: dec!(3.50),
                raw_record_id: 1,
            },
            ConversionRateCandidate {
                report_date: date(2026, 2, 8),
                rate: dec!(3.57),
                raw_record_id: 2,
            },
            // Future dates are never eligible.
            ConversionRateCandidate {
                report_date: date(2026, 2, 12),
                rate: dec!(3.70),
                raw_record_id: 3,
            },
        ];
        let resolution =
            select_execution_fx(None, &candidates, "USD", "ILS", date(2026, 2, 10));
        assert_eq!(resolution.rate, Some(dec!(3.57)));
    }

    #[test]
    fn test_fx_priority_3_tie_breaks_on_raw_record_id() {
        let candidates = vec![
            ConversionRateCandidate {
                report_date: date(2026, 2, 10),
                rate: dec!(3.60),
                raw_record_id: 5,
            },
            ConversionRateCandidate {
                report_date: date(2026, 2, 10),
                rate: dec!(3.62),
                raw_record_id: 9,
            },
        ];
        let resolution =
            select_execution_fx(None, &candidates, "USD", "ILS", date(2026, 2, 10));
        assert_eq!(resolution.rate, Some(dec!(3.62)));
    }

    #[test]
    fn test_fx_missing_all_sources_blocks_output() {
        let resolution = select_execution_fx(None, &[], "USD", "ILS", date(2026, 2, 10));
        assert_eq!(resolution.rate, None);
        assert!(resolution.provisional);
        assert_eq!(
            resolution.diagnostic_code.as_deref(),
            Some("FX_RATE_MISSING_ALL_SOURCES")
        );
    }
}
