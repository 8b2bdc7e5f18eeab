//! Stock API request and response types.
//!
//! Numeric fields use [`Decimal`] and accept either JSON numbers or numeric
//! strings. Fields the client does not interpret are kept in `extra`.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Request Enums
// =============================================================================

/// Asset class filter for symbol search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    /// Listed equities.
    Stock,
    /// Crypto pairs.
    Crypto,
    /// Currency pairs.
    Forex,
}

impl AssetType {
    /// Query parameter value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "STOCK",
            Self::Crypto => "CRYPTO",
            Self::Forex => "FOREX",
        }
    }
}

/// Side of a stock transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionDirection {
    /// Buy shares.
    #[serde(alias = "buy", alias = "Buy")]
    Buy,
    /// Sell shares.
    #[serde(alias = "sell", alias = "Sell")]
    Sell,
}

impl TransactionDirection {
    /// Query parameter value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TransactionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Responses
// =============================================================================

/// One symbol search match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSearchResult {
    /// Ticker symbol.
    #[serde(alias = "symbol")]
    pub stock_ticker: String,
    /// Display name.
    #[serde(default, alias = "description")]
    pub stock_name: Option<String>,
    /// Asset class as reported by the server.
    #[serde(default)]
    pub asset_type: Option<String>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Latest quote for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    /// Ticker symbol.
    pub stock_ticker: String,
    /// Display name.
    #[serde(default)]
    pub stock_name: Option<String>,
    /// Current price.
    #[serde(rename = "c")]
    pub current_price: Decimal,
    /// Absolute change on the day.
    #[serde(rename = "d", default)]
    pub change: Option<Decimal>,
    /// Percent change on the day.
    #[serde(rename = "dp", default)]
    pub percent_change: Option<Decimal>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One historical OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    #[serde(default)]
    pub volume: Option<Decimal>,
    /// Remaining fields (date and any extras).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Historical price series for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPrices {
    /// Bars in server order.
    #[serde(default)]
    pub historical_price: Vec<HistoricalBar>,
}

/// Transaction identifier; the server may send either form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionId {
    /// Numeric identifier.
    Number(i64),
    /// Text identifier (UUID etc.).
    Text(String),
}

/// An executed stock transaction from the user's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction identifier.
    pub id: TransactionId,
    /// Ticker symbol.
    pub stock_ticker: String,
    /// Buy or sell.
    pub direction: TransactionDirection,
    /// Number of shares.
    pub quantity: Decimal,
    /// Fill price per share.
    pub execution_price: Decimal,
    /// Fee charged.
    #[serde(default)]
    pub transaction_fee: Decimal,
    /// Creation timestamp as sent by the server.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Transaction {
    /// Parsed creation time. Accepts RFC 3339 or a naive ISO timestamp (read
    /// as UTC).
    #[must_use]
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    /// Gross value of the fill, excluding fees.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quantity * self.execution_price
    }
}
