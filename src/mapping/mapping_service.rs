use chrono::{DateTime, NaiveDate, Utc};
use std::str::FromStr;

use super::field_parsers::{
    optional_date, optional_decimal, optional_text, parse_timestamp_utc, required_decimal,
    required_text, RowContext,
};
use super::mapping_constants::{
    DEFAULT_ASSET_CATEGORY, DIAG_FX_RATE_MISSING_ALL_SOURCES, FX_SOURCE_CONVERSION_RATES,
    FX_SOURCE_TRADES, KNOWN_REORG_CODES,
};
use super::mapping_errors::{MappingError, Result};
use super::mapping_model::{CanonicalBatch, MappedCashflow, MappedTradeFill};
use crate::events::{CashflowUpsert, CorpActionUpsert, FxRateUpsert, TradeFillUpsert, TradeSide};
use crate::instruments::InstrumentUpsert;
use crate::statements::statements_constants::{
    SECTION_CASH_TRANSACTIONS, SECTION_CONVERSION_RATES, SECTION_CORPORATE_ACTIONS,
    SECTION_TRADES,
};
use crate::statements::RawRecord;

/// Placeholder rewritten by the canonical pipeline once instruments resolve.
pub const UNRESOLVED_INSTRUMENT_ID: &str = "";

/// Transforms run-scoped raw rows into canonical event upsert requests.
///
/// Routing is strictly by section name. Normalization is fail-fast: one bad
/// required field fails the whole batch.
pub struct CanonicalMappingService {
    default_asset_category: String,
}

impl Default for CanonicalMappingService {
    fn default() -> Self {
        Self::new(DEFAULT_ASSET_CATEGORY.to_string())
    }
}

impl CanonicalMappingService {
    pub fn new(default_asset_category: String) -> Self {
        Self {
            default_asset_category,
        }
    }

    pub fn build_canonical_batch(
        &self,
        account_id: &str,
        functional_currency: &str,
        rows: &[RawRecord],
    ) -> Result<CanonicalBatch> {
        if account_id.trim().is_empty() {
            return Err(MappingError::InvalidData(
                "account_id must not be blank".to_string(),
            ));
        }
        if functional_currency.trim().is_empty() {
            return Err(MappingError::InvalidData(
                "functional_currency must not be blank".to_string(),
            ));
        }

        let mut batch = CanonicalBatch::default();
        for row in rows {
            match row.section_name.as_str() {
                SECTION_TRADES => self.map_trade_row(account_id, functional_currency, row, &mut batch)?,
                SECTION_CASH_TRANSACTIONS => {
                    self.map_cashflow_row(account_id, functional_currency, row, &mut batch)?
                }
                SECTION_CONVERSION_RATES => {
                    self.map_conversion_rate_row(account_id, functional_currency, row, &mut batch)?
                }
                SECTION_CORPORATE_ACTIONS => {
                    self.map_corp_action_row(account_id, row, &mut batch)?
                }
                // Other sections are persisted raw but never mapped.
                _ => {}
            }
        }
        Ok(batch)
    }

    fn map_trade_row(
        &self,
        account_id: &str,
        functional_currency: &str,
        row: &RawRecord,
        batch: &mut CanonicalBatch,
    ) -> Result<()> {
        let payload = &row.source_payload;
        let ctx = RowContext {
            section: &row.section_name,
            source_row_ref: &row.source_row_ref,
        };

        let ib_exec_id = required_text(payload, "ibExecID", ctx)?;
        let conid = required_text(payload, "conid", ctx)?;
        let side_raw = required_text(payload, "buySell", ctx)?.to_uppercase();
        let side = TradeSide::from_str(&side_raw).map_err(|_| ctx.violation("buySell", &side_raw))?;
        let quantity = required_decimal(payload, "quantity", ctx)?;
        let price = required_decimal(payload, "tradePrice", ctx)?;
        let currency = required_text(payload, "currency", ctx)?;
        let report_date_local = self.resolve_report_date(row, ctx)?;
        let trade_timestamp_utc = self.resolve_trade_timestamp(row, report_date_local, ctx)?;
        let transaction_id = optional_text(payload, "transactionID");
        let fx_rate_to_base = optional_decimal(payload, "fxRateToBase", ctx)?;

        batch
            .instruments
            .push(self.build_instrument(account_id, &conid, &currency, payload));

        batch.trade_fills.push(MappedTradeFill {
            conid,
            request: TradeFillUpsert {
                account_id: account_id.to_string(),
                instrument_id: UNRESOLVED_INSTRUMENT_ID.to_string(),
                ingestion_run_id: row.ingestion_run_id.clone(),
                source_raw_record_id: row.id,
                ib_exec_id,
                transaction_id: transaction_id.clone(),
                trade_timestamp_utc,
                report_date_local,
                side,
                quantity,
                price,
                cost: optional_decimal(payload, "cost", ctx)?,
                commission: optional_decimal(payload, "ibCommission", ctx)?,
                fees: optional_decimal(payload, "fees", ctx)?,
                realized_pnl: optional_decimal(payload, "fifoPnlRealized", ctx)?,
                net_cash: optional_decimal(payload, "netCash", ctx)?,
                net_cash_in_base: optional_decimal(payload, "netCashInBase", ctx)?,
                fx_rate_to_base,
                currency: currency.clone(),
                functional_currency: functional_currency.to_string(),
            },
        });

        // An execution-time rate on the trade row is the priority-1 FX source;
        // materialize it as the resolved FX event for that transaction.
        if let (Some(rate), Some(transaction_id)) = (fx_rate_to_base, transaction_id) {
            batch.fx_rates.push(FxRateUpsert {
                account_id: account_id.to_string(),
                ingestion_run_id: row.ingestion_run_id.clone(),
                source_raw_record_id: row.id,
                transaction_id,
                report_date_local,
                currency,
                functional_currency: functional_currency.to_string(),
                fx_rate: Some(rate),
                fx_source: FX_SOURCE_TRADES.to_string(),
                provisional: false,
                diagnostic_code: None,
            });
        }

        Ok(())
    }

    fn map_cashflow_row(
        &self,
        account_id: &str,
        functional_currency: &str,
        row: &RawRecord,
        batch: &mut CanonicalBatch,
    ) -> Result<()> {
        let payload = &row.source_payload;
        let ctx = RowContext {
            section: &row.section_name,
            source_row_ref: &row.source_row_ref,
        };

        let transaction_id = required_text(payload, "transactionID", ctx)?;
        let cash_action = required_text(payload, "type", ctx)?;
        let amount = required_decimal(payload, "amount", ctx)?;
        let currency = required_text(payload, "currency", ctx)?;
        let report_date_local = self.resolve_report_date(row, ctx)?;

        let conid = optional_text(payload, "conid");
        if let Some(conid) = &conid {
            batch
                .instruments
                .push(self.build_instrument(account_id, conid, &currency, payload));
        }

        let effective_at_utc = optional_text(payload, "dateTime")
            .and_then(|raw| parse_timestamp_utc(&raw));

        batch.cashflows.push(MappedCashflow {
            conid,
            request: CashflowUpsert {
                account_id: account_id.to_string(),
                instrument_id: None,
                ingestion_run_id: row.ingestion_run_id.clone(),
                source_raw_record_id: row.id,
                transaction_id,
                cash_action,
                report_date_local,
                effective_at_utc,
                amount,
                amount_in_base: optional_decimal(payload, "amountInBase", ctx)?,
                currency,
                functional_currency: functional_currency.to_string(),
                withholding_tax: optional_decimal(payload, "withholdingTax", ctx)?,
                fees: optional_decimal(payload, "fees", ctx)?,
            },
        });

        Ok(())
    }

    fn map_conversion_rate_row(
        &self,
        account_id: &str,
        functional_currency: &str,
        row: &RawRecord,
        batch: &mut CanonicalBatch,
    ) -> Result<()> {
        let payload = &row.source_payload;
        let ctx = RowContext {
            section: &row.section_name,
            source_row_ref: &row.source_row_ref,
        };

        let currency = required_text(payload, "fromCurrency", ctx)?;
        let report_date_local = self.resolve_report_date(row, ctx)?;
        let transaction_id =
            optional_text(payload, "transactionID").unwrap_or_else(|| row.source_row_ref.clone());
        let fx_rate = optional_decimal(payload, "rate", ctx)?;

        batch.fx_rates.push(FxRateUpsert {
            account_id: account_id.to_string(),
            ingestion_run_id: row.ingestion_run_id.clone(),
            source_raw_record_id: row.id,
            transaction_id,
            report_date_local,
            currency,
            functional_currency: optional_text(payload, "toCurrency")
                .unwrap_or_else(|| functional_currency.to_string()),
            fx_rate,
            fx_source: FX_SOURCE_CONVERSION_RATES.to_string(),
            provisional: fx_rate.is_none(),
            diagnostic_code: if fx_rate.is_none() {
                Some(DIAG_FX_RATE_MISSING_ALL_SOURCES.to_string())
            } else {
                None
            },
        });

        Ok(())
    }

    fn map_corp_action_row(
        &self,
        account_id: &str,
        row: &RawRecord,
        batch: &mut CanonicalBatch,
    ) -> Result<()> {
        let payload = &row.source_payload;
        let ctx = RowContext {
            section: &row.section_name,
            source_row_ref: &row.source_row_ref,
        };

        let conid = required_text(payload, "conid", ctx)?;
        let reorg_code = required_text(payload, "type", ctx)?.to_uppercase();
        if !KNOWN_REORG_CODES.contains(&reorg_code.as_str()) {
            return Err(ctx.violation("type", &reorg_code));
        }
        let report_date_local = self.resolve_report_date(row, ctx)?;
        let currency = optional_text(payload, "currency")
            .unwrap_or_else(|| "USD".to_string());

        batch
            .instruments
            .push(self.build_instrument(account_id, &conid, &currency, payload));

        batch.corp_actions.push(CorpActionUpsert {
            account_id: account_id.to_string(),
            instrument_id: None,
            conid,
            ingestion_run_id: row.ingestion_run_id.clone(),
            source_raw_record_id: row.id,
            action_id: optional_text(payload, "actionID"),
            transaction_id: optional_text(payload, "transactionID"),
            reorg_code,
            report_date_local,
            description: optional_text(payload, "description"),
        });

        Ok(())
    }

    fn build_instrument(
        &self,
        account_id: &str,
        conid: &str,
        currency: &str,
        payload: &std::collections::BTreeMap<String, String>,
    ) -> InstrumentUpsert {
        InstrumentUpsert {
            account_id: account_id.to_string(),
            conid: conid.to_string(),
            symbol: optional_text(payload, "symbol").unwrap_or_else(|| conid.to_string()),
            local_symbol: optional_text(payload, "localSymbol"),
            isin: optional_text(payload, "isin"),
            cusip: optional_text(payload, "cusip"),
            figi: optional_text(payload, "figi"),
            asset_category: optional_text(payload, "assetCategory")
                .unwrap_or_else(|| self.default_asset_category.clone()),
            currency: currency.to_string(),
            description: optional_text(payload, "description"),
        }
    }

    fn resolve_report_date(&self, row: &RawRecord, ctx: RowContext) -> Result<NaiveDate> {
        if let Some(date) = optional_date(&row.source_payload, "reportDate", ctx)? {
            return Ok(date);
        }
        row.report_date_local
            .ok_or_else(|| ctx.violation("reportDate", ""))
    }

    fn resolve_trade_timestamp(
        &self,
        row: &RawRecord,
        report_date_local: NaiveDate,
        ctx: RowContext,
    ) -> Result<DateTime<Utc>> {
        match optional_text(&row.source_payload, "dateTime") {
            Some(raw) => parse_timestamp_utc(&raw).ok_or_else(|| ctx.violation("dateTime", &raw)),
            None => Ok(DateTime::from_naive_utc_and_offset(
                report_date_local.and_hms_opt(0, 0, 0).unwrap(),
                Utc,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn raw_row(section: &str, id: i64, pairs: &[(&str, &str)]) -> RawRecord {
        RawRecord {
            id,
            ingestion_run_id: "run-1".to_string(),
            raw_artifact_id: "artifact-1".to_string(),
            account_id: "U123".to_string(),
            report_date_local: NaiveDate::from_ymd_opt(2026, 2, 10),
            section_name: section.to_string(),
            source_row_ref: format!("{}:Row:idx={}", section, id),
            source_payload: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<String, String>>(),
        }
    }

    fn service() -> CanonicalMappingService {
        CanonicalMappingService::default()
    }

    #[test]
    fn test_trade_row_maps_fill_instrument_and_fx_hint() {
        let row = raw_row(
            "Trades",
            1,
            &[
                ("ibExecID", "E1"),
                ("conid", "42"),
                ("buySell", "BUY"),
                ("quantity", "100"),
                ("tradePrice", "50.00"),
                ("currency", "USD"),
                ("symbol", "ACME"),
                ("transactionID", "T1"),
                ("ibCommission", "-1.00"),
                ("fxRateToBase", "3.55"),
                ("dateTime", "2026-02-10T14:30:00Z"),
            ],
        );

        let batch = service()
            .build_canonical_batch("U123", "USD", &[row])
            .unwrap();

        assert_eq!(batch.instruments.len(), 1);
        assert_eq!(batch.instruments[0].conid, "42");
        assert_eq!(batch.instruments[0].symbol, "ACME");

        assert_eq!(batch.trade_fills.len(), 1);
        let fill = &batch.trade_fills[0].request;
        assert_eq!(fill.ib_exec_id, "E1");
        assert_eq!(fill.quantity, dec!(100));
        assert_eq!(fill.price, dec!(50.00));
        assert_eq!(fill.commission, Some(dec!(-1.00)));
        assert_eq!(fill.side, TradeSide::Buy);

        // fxRateToBase present => priority-1 FX event for the transaction.
        assert_eq!(batch.fx_rates.len(), 1);
        assert_eq!(batch.fx_rates[0].fx_source, "trades_fx_rate");
        assert_eq!(batch.fx_rates[0].fx_rate, Some(dec!(3.55)));
        assert!(!batch.fx_rates[0].provisional);
    }

    #[test]
    fn test_trade_row_missing_exec_id_fails_fast() {
        let row = raw_row(
            "Trades",
            1,
            &[
                ("conid", "42"),
                ("buySell", "BUY"),
                ("quantity", "100"),
                ("tradePrice", "50.00"),
                ("currency", "USD"),
            ],
        );

        let err = service()
            .build_canonical_batch("U123", "USD", &[row])
            .unwrap_err();
        match err {
            MappingError::ContractViolation { field, section, .. } => {
                assert_eq!(field, "ibExecID");
                assert_eq!(section, "Trades");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_trade_row_rejects_naive_timestamp() {
        let row = raw_row(
            "Trades",
            1,
            &[
                ("ibExecID", "E1"),
                ("conid", "42"),
                ("buySell", "SELL"),
                ("quantity", "10"),
                ("tradePrice", "5"),
                ("currency", "USD"),
                ("dateTime", "2026-02-10 14:30:00"),
            ],
        );
        assert!(service().build_canonical_batch("U123", "USD", &[row]).is_err());
    }

    #[test]
    fn test_cashflow_row_maps_amounts() {
        let row = raw_row(
            "CashTransactions",
            2,
            &[
                ("transactionID", "T7"),
                ("type", "Dividends"),
                ("amount", "10.00"),
                ("currency", "USD"),
                ("conid", "42"),
                ("withholdingTax", "-2.50"),
            ],
        );

        let batch = service()
            .build_canonical_batch("U123", "USD", &[row])
            .unwrap();
        assert_eq!(batch.cashflows.len(), 1);
        let cashflow = &batch.cashflows[0];
        assert_eq!(cashflow.conid.as_deref(), Some("42"));
        assert_eq!(cashflow.request.amount, dec!(10.00));
        assert_eq!(cashflow.request.withholding_tax, Some(dec!(-2.50)));
        assert_eq!(batch.instruments.len(), 1);
    }

    #[test]
    fn test_conversion_rate_row_maps_fx_candidate() {
        let row = raw_row(
            "ConversionRates",
            3,
            &[("fromCurrency", "ILS"), ("toCurrency", "USD"), ("rate", "0.28")],
        );

        let batch = service()
            .build_canonical_batch("U123", "USD", &[row])
            .unwrap();
        assert_eq!(batch.fx_rates.len(), 1);
        let fx = &batch.fx_rates[0];
        assert_eq!(fx.currency, "ILS");
        assert_eq!(fx.functional_currency, "USD");
        assert_eq!(fx.fx_source, "conversion_rates");
        assert!(!fx.provisional);
    }

    #[test]
    fn test_conversion_rate_without_rate_is_provisional() {
        let row = raw_row("ConversionRates", 3, &[("fromCurrency", "ILS")]);
        let batch = service()
            .build_canonical_batch("U123", "USD", &[row])
            .unwrap();
        assert!(batch.fx_rates[0].provisional);
        assert_eq!(
            batch.fx_rates[0].diagnostic_code.as_deref(),
            Some("FX_RATE_MISSING_ALL_SOURCES")
        );
    }

    #[test]
    fn test_corp_action_row_maps_with_known_reorg_code() {
        let row = raw_row(
            "CorporateActions",
            4,
            &[("conid", "42"), ("type", "FS"), ("actionID", "A9")],
        );
        let batch = service()
            .build_canonical_batch("U123", "USD", &[row])
            .unwrap();
        assert_eq!(batch.corp_actions.len(), 1);
        assert_eq!(batch.corp_actions[0].reorg_code, "FS");
        assert_eq!(batch.corp_actions[0].action_id.as_deref(), Some("A9"));
    }

    #[test]
    fn test_corp_action_row_rejects_unknown_reorg_code() {
        let row = raw_row(
            "CorporateActions",
            4,
            &[("conid", "42"), ("type", "ZZ")],
        );
        assert!(service().build_canonical_batch("U123", "USD", &[row]).is_err());
    }

    #[test]
    fn test_unmapped_sections_are_ignored() {
        let row = raw_row("SecuritiesInfo", 5, &[("conid", "42")]);
        let batch = service()
            .build_canonical_batch("U123", "USD", &[row])
            .unwrap();
        assert!(batch.instruments.is_empty());
        assert!(batch.trade_fills.is_empty());
        assert!(batch.cashflows.is_empty());
        assert!(batch.fx_rates.is_empty());
        assert!(batch.corp_actions.is_empty());
    }
}
