/// Sections that must be present in every downloaded statement.
pub const HARD_REQUIRED_SECTIONS: [&str; 7] = [
    "Trades",
    "OpenPositions",
    "CashTransactions",
    "CorporateActions",
    "ConversionRates",
    "SecuritiesInfo",
    "AccountInformation",
];

/// Sections required only when reconciliation publishing is enabled.
pub const RECONCILIATION_REQUIRED_SECTIONS: [&str; 2] = [
    "MTMPerformanceSummaryInBase",
    "FIFOPerformanceSummaryInBase",
];

/// Sections persisted raw for later use but never allowed to block a run.
pub const FUTURE_PROOF_SECTIONS: [&str; 6] = [
    "InterestAccruals",
    "ChangeInDividendAccruals",
    "OpenDividendAccruals",
    "ChangeInNAV",
    "StmtFunds",
    "UnbundledCommissionDetails",
];

pub const SECTION_TRADES: &str = "Trades";
pub const SECTION_OPEN_POSITIONS: &str = "OpenPositions";
pub const SECTION_CASH_TRANSACTIONS: &str = "CashTransactions";
pub const SECTION_CONVERSION_RATES: &str = "ConversionRates";
pub const SECTION_CORPORATE_ACTIONS: &str = "CorporateActions";
