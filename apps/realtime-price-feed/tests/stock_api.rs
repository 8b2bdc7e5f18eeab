//! Stock REST Client Tests
//!
//! Exercises every endpoint against a wiremock server: paths, query
//! parameters, bearer auth, and status code mapping.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use rust_decimal_macros::dec;
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use realtime_price_feed::infrastructure::rest::{
    AssetType, DEFAULT_HTTP_TIMEOUT, TransactionDirection, TransactionId,
};
use realtime_price_feed::{AccessToken, ApiError, StockApiClient};

const TOKEN: &str = "test-token";

async fn setup() -> (MockServer, StockApiClient) {
    let server = MockServer::start().await;
    let client = StockApiClient::new(&format!("{}/api", server.uri()), DEFAULT_HTTP_TIMEOUT)
        .unwrap()
        .with_token(AccessToken::new(TOKEN).unwrap());
    (server, client)
}

#[tokio::test]
async fn search_sends_ticker_and_asset_type() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/stock/search"))
        .and(query_param("ticker", "gol"))
        .and(query_param("asset_type", "STOCK"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"stock_ticker": "GS", "stock_name": "Goldman Sachs", "exchange": "NYSE"},
            {"symbol": "GOLD", "description": "Barrick Gold"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let results = assert_ok!(client.search_stocks("gol", Some(AssetType::Stock)).await);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].stock_ticker, "GS");
    assert_eq!(results[0].extra.get("exchange"), Some(&json!("NYSE")));
    assert_eq!(results[1].stock_ticker, "GOLD");
    assert_eq!(results[1].stock_name.as_deref(), Some("Barrick Gold"));
}

#[tokio::test]
async fn stock_info_returns_raw_json() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/stock"))
        .and(query_param("ticker", "GS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stock_ticker": "GS",
            "sector": "Financials"
        })))
        .mount(&server)
        .await;

    let info = assert_ok!(client.get_stock_info("GS").await);
    assert_eq!(info["sector"], "Financials");
}

#[tokio::test]
async fn historical_prices_parse() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/stock/historical"))
        .and(query_param("ticker", "AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "historical_price": [
                {"open": 187.1, "high": "190.2", "low": 186.0, "close": 189.5, "date": "2025-01-02"}
            ]
        })))
        .mount(&server)
        .await;

    let history = assert_ok!(client.get_stock_historical("AAPL").await);
    assert_eq!(history.historical_price.len(), 1);
    let bar = &history.historical_price[0];
    assert_eq!(bar.high, dec!(190.2));
    assert_eq!(bar.close, dec!(189.5));
    assert_eq!(bar.volume, None);
}

#[tokio::test]
async fn quote_parses_short_field_names() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/stock/quote"))
        .and(query_param("ticker", "GS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stock_ticker": "GS",
            "c": 560.13,
            "d": "1.5",
            "dp": 0.27
        })))
        .mount(&server)
        .await;

    let quote = assert_ok!(client.get_stock_quote("GS").await);
    assert_eq!(quote.current_price, dec!(560.13));
    assert_eq!(quote.change, Some(dec!(1.5)));
    assert_eq!(quote.percent_change, Some(dec!(0.27)));
}

#[tokio::test]
async fn transaction_posts_normalized_quantity() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/stock/transaction"))
        .and(query_param("ticker", "GS"))
        .and(query_param("direction", "BUY"))
        .and(query_param("quantity", "2.5"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "filled"})))
        .expect(1)
        .mount(&server)
        .await;

    let body = assert_ok!(
        client
            .place_stock_transaction("GS", TransactionDirection::Buy, dec!(2.500))
            .await
    );
    assert_eq!(body["status"], "filled");
}

#[tokio::test]
async fn transaction_rejects_non_positive_quantity_without_request() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    for quantity in [dec!(0), dec!(-1)] {
        let result = client
            .place_stock_transaction("GS", TransactionDirection::Sell, quantity)
            .await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }
}

#[tokio::test]
async fn user_transactions_parse() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/user/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "stock_ticker": "GS", "direction": "BUY", "quantity": "2",
             "execution_price": 560.0, "transaction_fee": 1.0,
             "created_at": "2025-01-02T15:04:05Z"},
            {"id": "tx-2", "stock_ticker": "AAPL", "direction": "sell", "quantity": 1,
             "execution_price": "189.5"}
        ])))
        .mount(&server)
        .await;

    let transactions = assert_ok!(client.list_user_transactions().await);

    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].id, TransactionId::Number(1));
    assert_eq!(transactions[0].notional(), dec!(1120));
    assert!(transactions[0].created_at_utc().is_some());
    assert_eq!(transactions[1].id, TransactionId::Text("tx-2".into()));
    assert_eq!(transactions[1].direction, TransactionDirection::Sell);
    assert_eq!(transactions[1].transaction_fee, dec!(0));
}

#[tokio::test]
async fn no_token_sends_no_authorization_header() {
    let server = MockServer::start().await;
    let client = StockApiClient::new(&server.uri(), DEFAULT_HTTP_TIMEOUT).unwrap();
    Mock::given(method("GET"))
        .and(path("/user/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let transactions = assert_ok!(client.list_user_transactions().await);
    assert!(transactions.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn unauthorized_maps_to_error() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/stock/quote"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
        .mount(&server)
        .await;

    let err = client.get_stock_quote("GS").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn not_found_maps_to_error() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/stock"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client.get_stock_info("NOPE").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(ref p) if p == "stock"));
}

#[tokio::test]
async fn server_error_carries_detail_and_is_retryable() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/stock/transaction"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({"detail": "market closed"})),
        )
        .mount(&server)
        .await;

    let err = client
        .place_stock_transaction("GS", TransactionDirection::Buy, dec!(1))
        .await
        .unwrap_err();

    match &err {
        ApiError::Api { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "market closed");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn malformed_body_is_a_parse_error() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/stock/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client.get_stock_quote("GS").await.unwrap_err();
    assert!(matches!(err, ApiError::JsonParse(_)));
}

#[tokio::test]
async fn empty_body_reads_as_null() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/stock"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let info = assert_ok!(client.get_stock_info("GS").await);
    assert!(info.is_null());
}
