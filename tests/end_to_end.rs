// tests/end_to_end.rs
//
// Facade + parser + store against the stub marketplace, and the local API on top.

mod common;

use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

use common::spawn_marketplace;
use lending_club_scraper::error::{AuthError, RetrievalError};
use lending_club_scraper::handlers::AppState;
use lending_club_scraper::models::{Credentials, UserData};
use lending_club_scraper::routes::routes;
use lending_club_scraper::services::client::{Admission, LendingClubClient};
use lending_club_scraper::services::db::DbStore;
use lending_club_scraper::services::task::{Operation, RetrievalOutput};

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn json_decimal(value: &Value) -> BigDecimal {
    match value.as_str() {
        Some(s) => dec(s),
        None => dec(&value.to_string()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn alice_logs_in_and_her_data_is_cached() {
    let stub = spawn_marketplace(&[("alice@example.com", "pw")]).await;
    let client = LendingClubClient::from_config(stub.config(), Admission::Reject);
    let db = DbStore::in_memory().await.unwrap();
    let credentials = Credentials::new("alice@example.com", "pw");

    let overview = client.login_and_fetch(&credentials).await.unwrap();
    assert_eq!(overview.account_summary.user_email, "alice@example.com");
    assert_eq!(overview.account_summary.total_payments, dec("1000.00"));
    assert_eq!(overview.account_summary.account_value, dec("5000.00"));
    assert_eq!(overview.net_annualized_return.adjusted_net_annualized_return, dec("0.0425"));

    let remember = UserData::from(&credentials);
    db.save_login_result(&overview, Some(&remember)).await.unwrap();

    let summary = db.get_account_summary("alice@example.com").await.unwrap().unwrap();
    assert_eq!(summary.record.total_payments, dec("1000.00"));
    assert_eq!(summary.record.account_value, dec("5000.00"));
    let nar = db.get_nar_calculation("alice@example.com").await.unwrap().unwrap();
    assert_eq!(nar.record.adjusted_net_annualized_return, dec("0.0425"));
    assert_eq!(db.get_user("alice@example.com").await.unwrap(), Some(remember));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_page_operations_log_in_on_their_own() {
    let stub = spawn_marketplace(&[("alice@example.com", "pw")]).await;
    let client = LendingClubClient::from_config(stub.config(), Admission::Queue);
    let credentials = Credentials::new("alice@example.com", "pw");

    let summary = client.get_account_summary(&credentials).await.unwrap();
    assert_eq!(summary.available_cash, dec("312.47"));

    let nar = client.get_net_annualized_return(&credentials).await.unwrap();
    assert_eq!(nar.weighted_average_rate, dec("0.131"));

    let output = client.execute(Operation::NetAnnualizedReturn, credentials).await.unwrap();
    assert!(matches!(output, RetrievalOutput::NetAnnualizedReturn(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_password_surfaces_as_auth_error() {
    let stub = spawn_marketplace(&[("alice@example.com", "pw")]).await;
    let client = LendingClubClient::from_config(stub.config(), Admission::Reject);

    let result = client
        .login_and_fetch(&Credentials::new("alice@example.com", "nope"))
        .await;

    assert_eq!(result.unwrap_err(), RetrievalError::Auth(AuthError::InvalidCredentials));
    assert_eq!(stub.state.page_hits.load(std::sync::atomic::Ordering::SeqCst), 0);
}

async fn api_state(stub_config: lending_club_scraper::config::MarketplaceConfig) -> Arc<AppState> {
    Arc::new(AppState {
        db: Arc::new(DbStore::in_memory().await.unwrap()),
        client: LendingClubClient::from_config(stub_config, Admission::Reject),
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_login_then_read_cached_records() {
    let stub = spawn_marketplace(&[("alice@example.com", "pw")]).await;
    let api = routes(api_state(stub.config()).await);

    let response = warp::test::request()
        .method("POST")
        .path("/api/v1/login")
        .json(&json!({ "email": "alice@example.com", "password": "pw", "remember": true }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["persisted"], json!(true));
    assert_eq!(
        json_decimal(&body["overview"]["account_summary"]["account_value"]),
        dec("5000.00")
    );

    let response = warp::test::request()
        .path("/api/v1/users")
        .reply(&api)
        .await;
    assert_eq!(response.status(), 200);
    let users: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(users, json!(["alice@example.com"]));

    let response = warp::test::request()
        .path("/api/v1/accounts/alice@example.com/summary")
        .reply(&api)
        .await;
    assert_eq!(response.status(), 200);
    let cached: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(json_decimal(&cached["record"]["total_payments"]), dec("1000.00"));
    assert!(cached["updated_at"].is_string());

    let response = warp::test::request()
        .path("/api/v1/accounts/alice@example.com/nar")
        .reply(&api)
        .await;
    assert_eq!(response.status(), 200);
    let cached: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(
        json_decimal(&cached["record"]["adjusted_net_annualized_return"]),
        dec("0.0425")
    );

    // remembered password is recalled when the client leaves it out
    let response = warp::test::request()
        .method("POST")
        .path("/api/v1/login")
        .json(&json!({ "email": "alice@example.com" }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_errors_say_what_went_wrong() {
    let stub = spawn_marketplace(&[("alice@example.com", "pw")]).await;
    let api = routes(api_state(stub.config()).await);

    let response = warp::test::request()
        .method("POST")
        .path("/api/v1/login")
        .json(&json!({ "email": "alice@example.com", "password": "wrong" }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 401);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["kind"], json!("invalid_credentials"));

    let response = warp::test::request()
        .path("/api/v1/accounts/alice@example.com/summary")
        .reply(&api)
        .await;
    assert_eq!(response.status(), 404);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["kind"], json!("not_found"));

    let response = warp::test::request()
        .method("POST")
        .path("/api/v1/login")
        .json(&json!({ "email": "bob@example.com" }))
        .reply(&api)
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["kind"], json!("bad_request"));
}
