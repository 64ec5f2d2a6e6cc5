#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use ibkr_flex_ledger::db::{self, DbPool};
use ibkr_flex_ledger::flex::{
    FlexError, FlexFetchOutcome, FlexFetchPort, FlexRequestAck, PollAttemptEvent,
};
use ibkr_flex_ledger::settings::{FlexRetrySettings, Settings};

/// Creates a pool on a fresh file-backed database under tests/output/.
pub fn get_db_connection_pool() -> Arc<DbPool> {
    let db_dir = "./tests/output";
    std::fs::create_dir_all(db_dir).expect("Failed to create test output directory");
    let db_path = format!("{}/ledger_{}.db", db_dir, uuid::Uuid::new_v4());

    let pool = db::create_pool(&db_path).expect("Failed to create database pool");
    db::run_migrations(&pool).expect("Failed to run migrations");
    pool
}

pub fn test_settings() -> Settings {
    Settings {
        account_id: "U123".to_string(),
        flex_token: "token".to_string(),
        flex_query_id: "Q1".to_string(),
        flex_base_url: "https://flex.example".to_string(),
        database_url: ":memory:".to_string(),
        base_currency: "USD".to_string(),
        reconciliation_enabled: false,
        retry: FlexRetrySettings::default(),
    }
}

/// Transport stub returning a canned payload without any network traffic.
pub struct MockFlexClient {
    pub payload: Vec<u8>,
    pub poll_attempts: Vec<PollAttemptEvent>,
}

impl MockFlexClient {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            poll_attempts: Vec::new(),
        }
    }
}

#[async_trait]
impl FlexFetchPort for MockFlexClient {
    async fn request_statement(&self, _query_id: &str) -> Result<FlexRequestAck, FlexError> {
        Ok(FlexRequestAck {
            reference_code: "REF-1".to_string(),
            statement_url: "https://flex.example/GetStatement".to_string(),
        })
    }

    async fn download_statement(
        &self,
        _ack: &FlexRequestAck,
        _cancel: &CancellationToken,
    ) -> Result<FlexFetchOutcome, FlexError> {
        Ok(FlexFetchOutcome {
            payload: self.payload.clone(),
            poll_attempts: self.poll_attempts.clone(),
        })
    }
}

/// A complete statement carrying every hard-required section, one round-trip
/// trade pair, a dividend and a conversion rate.
pub fn sample_statement_xml() -> Vec<u8> {
    br#"<FlexQueryResponse queryName="ledger" type="AF">
  <FlexStatements count="1">
    <FlexStatement accountId="U123" reportDate="2026-02-12">
      <AccountInformation accountId="U123" currency="USD" />
      <SecuritiesInfo>
        <SecurityInfo conid="42" symbol="ACME" assetCategory="STK" currency="USD" />
      </SecuritiesInfo>
      <Trades>
        <Trade ibExecID="E1" transactionID="1001" conid="42" symbol="ACME" buySell="BUY" quantity="100" tradePrice="50.00" ibCommission="-1.00" currency="USD" dateTime="2026-02-10T14:30:00Z" reportDate="2026-02-10" netCash="-5001.00" />
        <Trade ibExecID="E2" transactionID="1002" conid="42" symbol="ACME" buySell="SELL" quantity="40" tradePrice="55.00" ibCommission="-0.60" currency="USD" dateTime="2026-02-12T14:31:00Z" reportDate="2026-02-12" closePrice="55.50" netCash="2199.40" />
      </Trades>
      <OpenPositions>
        <OpenPosition conid="42" symbol="ACME" position="60" markPrice="55.25" reportDate="2026-02-12" />
      </OpenPositions>
      <CashTransactions>
        <CashTransaction transactionID="2001" type="Dividends" conid="42" symbol="ACME" amount="10.00" currency="USD" reportDate="2026-02-11" />
      </CashTransactions>
      <CorporateActions />
      <ConversionRates>
        <ConversionRate fromCurrency="ILS" toCurrency="USD" rate="0.28" reportDate="2026-02-12" />
      </ConversionRates>
    </FlexStatement>
  </FlexStatements>
</FlexQueryResponse>"#
        .to_vec()
}
