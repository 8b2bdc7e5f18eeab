//! Stock REST API Client
//!
//! Thin `reqwest` wrapper over the trading backend's stock endpoints. Calls
//! carry the same bearer token the realtime feed authenticates with.
//!
//! | Method | Path                  | Query                           |
//! |--------|-----------------------|---------------------------------|
//! | GET    | `/stock/search`       | `ticker`, `asset_type?`         |
//! | GET    | `/stock`              | `ticker`                        |
//! | GET    | `/stock/historical`   | `ticker`                        |
//! | GET    | `/stock/quote`        | `ticker`                        |
//! | POST   | `/stock/transaction`  | `ticker`, `direction`, `quantity` |
//! | GET    | `/user/transactions`  |                                 |

mod error;
mod types;

use std::time::Duration;

use reqwest::{Client, Method, StatusCode, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::ApiError;
pub use types::{
    AssetType, HistoricalBar, HistoricalPrices, StockQuote, StockSearchResult, Transaction,
    TransactionDirection, TransactionId,
};

use crate::domain::credential::AccessToken;

/// Default per-request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the stock REST API.
#[derive(Debug, Clone)]
pub struct StockApiClient {
    client: Client,
    base_url: Url,
    token: Option<AccessToken>,
}

impl StockApiClient {
    /// Create a client for `base_url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!(
                "'{base_url}' cannot be a base URL"
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Attach a bearer token to every request.
    #[must_use]
    pub fn with_token(mut self, token: AccessToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Replace (or clear) the bearer token.
    pub fn set_token(&mut self, token: Option<AccessToken>) {
        self.token = token;
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    /// Top symbol matches for `ticker`, optionally filtered by asset class.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or bad JSON.
    pub async fn search_stocks(
        &self,
        ticker: &str,
        asset_type: Option<AssetType>,
    ) -> Result<Vec<StockSearchResult>, ApiError> {
        let mut query = vec![("ticker", ticker.to_string())];
        if let Some(asset_type) = asset_type {
            query.push(("asset_type", asset_type.as_str().to_string()));
        }
        self.request(Method::GET, "stock/search", &query).await
    }

    /// Info bundle for a symbol (asset type, quote, profile, financials,
    /// news). Returned untyped since its sections vary by asset class.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or bad JSON.
    pub async fn get_stock_info(&self, ticker: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, "stock", &[("ticker", ticker.to_string())])
            .await
    }

    /// Historical OHLCV series for a symbol.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or bad JSON.
    pub async fn get_stock_historical(&self, ticker: &str) -> Result<HistoricalPrices, ApiError> {
        self.request(
            Method::GET,
            "stock/historical",
            &[("ticker", ticker.to_string())],
        )
        .await
    }

    /// Latest quote for a symbol.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or bad JSON.
    pub async fn get_stock_quote(&self, ticker: &str) -> Result<StockQuote, ApiError> {
        self.request(Method::GET, "stock/quote", &[("ticker", ticker.to_string())])
            .await
    }

    /// Place a market transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] for a non-positive quantity, or
    /// an error on network failure, non-success status or bad JSON.
    pub async fn place_stock_transaction(
        &self,
        ticker: &str,
        direction: TransactionDirection,
        quantity: Decimal,
    ) -> Result<Value, ApiError> {
        if quantity <= Decimal::ZERO {
            return Err(ApiError::InvalidRequest(format!(
                "quantity must be positive, got {quantity}"
            )));
        }

        tracing::info!(ticker, %direction, %quantity, "Placing stock transaction");
        self.request(
            Method::POST,
            "stock/transaction",
            &[
                ("ticker", ticker.to_string()),
                ("direction", direction.as_str().to_string()),
                ("quantity", quantity.normalize().to_string()),
            ],
        )
        .await
    }

    /// The signed-in user's transaction history.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or bad JSON.
    pub async fn list_user_transactions(&self) -> Result<Vec<Transaction>, ApiError> {
        self.request(Method::GET, "user/transactions", &[]).await
    }

    // =========================================================================
    // Transport
    // =========================================================================

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        let mut request = self.client.request(method.clone(), url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let text = if body.trim().is_empty() { "null" } else { &body };
            return Ok(serde_json::from_str(text)?);
        }

        tracing::warn!(%method, path, status = status.as_u16(), "Stock API request failed");
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
            StatusCode::NOT_FOUND => ApiError::NotFound(path.to_string()),
            _ => ApiError::Api {
                status: status.as_u16(),
                message: error_detail(&body),
            },
        })
    }
}

/// Pull a human-readable message out of an error body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}
