/// Fallback asset category when the source payload omits one.
pub const DEFAULT_ASSET_CATEGORY: &str = "STK";

/// IBKR corporate-action reorg type codes accepted at the mapping boundary.
pub const KNOWN_REORG_CODES: [&str; 29] = [
    "BC", "BM", "CA", "CC", "CD", "CI", "CO", "CP", "DW", "ED", "FA", "FI", "FS", "GV", "HD",
    "HI", "IC", "KC", "OR", "PI", "PV", "RI", "RS", "SD", "SO", "SR", "TC", "TI", "TO",
];

pub const FX_SOURCE_TRADES: &str = "trades_fx_rate";
pub const FX_SOURCE_DERIVED: &str = "derived";
pub const FX_SOURCE_CONVERSION_RATES: &str = "conversion_rates";
pub const FX_SOURCE_IDENTITY: &str = "identity";

pub const DIAG_FX_RATE_MISSING_ALL_SOURCES: &str = "FX_RATE_MISSING_ALL_SOURCES";
