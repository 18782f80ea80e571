use std::sync::Arc;

use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use paygate::{GateStore, InMemoryGateStore, SqliteGateStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use paygate_server::config::GatewayConfig;
use paygate_server::routes;
use paygate_server::state::AppState;

const MERCHANT: &str = "0x1111111111111111111111111111111111111111";
const PRICE: &str = "100000000000000000";

/// Dev-mode config so gates may point at the local mock upstream.
fn test_config() -> GatewayConfig {
    GatewayConfig {
        db_path: ":memory:".to_string(),
        allow_private_upstreams: true,
        ..GatewayConfig::default()
    }
}

fn make_state(store: Arc<dyn GateStore>, config: GatewayConfig) -> web::Data<AppState> {
    web::Data::new(AppState::new(config, store).unwrap())
}

fn registration(api_url: &str) -> serde_json::Value {
    serde_json::json!({
        "p_name": "Weather",
        "p_api_url": api_url,
        "p_merchant_wallet": MERCHANT,
        "p_amount_wei": PRICE,
        "p_valid_for_sec": 300
    })
}

async fn mock_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"city": "Quito", "temp": 18})),
        )
        .mount(&server)
        .await;
    server
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(App::new().app_data($state).configure(routes::configure)).await
    };
}

macro_rules! register {
    ($app:expr, $api_url:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/402/apis")
            .set_json(registration($api_url))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        body["apiId"].as_str().unwrap().to_string()
    }};
}

#[actix_rt::test]
async fn test_unknown_gate_returns_not_found() {
    let state = make_state(Arc::new(InMemoryGateStore::new()), test_config());
    let app = app!(state);

    for token in [None, Some("0xdeadbeef")] {
        let mut req = test::TestRequest::get().uri("/api/no-such-gate");
        if let Some(token) = token {
            req = req.insert_header(("X-402-Session", token));
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "not_found");
        assert_eq!(body["data"], serde_json::json!({}));
    }
}

#[actix_rt::test]
async fn test_blank_id_is_missing_id() {
    let state = make_state(Arc::new(InMemoryGateStore::new()), test_config());
    let app = app!(state);

    for uri in ["/api/", "/api/%20"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "{uri}");
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "missing_id");
    }
}

#[actix_rt::test]
async fn test_register_then_payment_required() {
    let store = Arc::new(InMemoryGateStore::new());
    let state = make_state(store.clone(), test_config());
    let app = app!(state);
    let api_id = register!(app, "https://api.example.com/weather");

    let req = test::TestRequest::get()
        .uri(&format!("/api/{api_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 402);
    let header = resp
        .headers()
        .get("X-402-Session")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body: serde_json::Value = test::read_body_json(resp).await;

    assert_eq!(body["code"], "payment_required");
    let data = &body["data"];
    assert_eq!(header.as_deref(), data["session_id"].as_str());
    assert_eq!(data["network"]["chain_id"], 43114);
    assert_eq!(data["network"]["name"], "Avalanche C-Chain");
    assert_eq!(data["merchant_wallet"], MERCHANT);
    assert_eq!(
        data["token_address"],
        "0x0000000000000000000000000000000000000000"
    );
    assert_eq!(data["calls"]["native"]["value"], PRICE);
    assert!(data["calls"]["native"]["calldata"]
        .as_str()
        .unwrap()
        .starts_with("0x"));
    assert_eq!(store.session_count(), 1);
}

#[actix_rt::test]
async fn test_native_payment_unlocks_upstream() {
    let upstream = mock_upstream().await;
    let store = Arc::new(InMemoryGateStore::new());
    let state = make_state(store.clone(), test_config());
    let app = app!(state);
    let api_id = register!(app, &format!("{}/weather", upstream.uri()));

    let req = test::TestRequest::get()
        .uri(&format!("/api/{api_id}"))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["calls"]["native"]["value"], "100000000000000000");
    let token = body["data"]["session_id"].as_str().unwrap().to_string();

    store.confirm_payment(&token, Utc::now()).unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/{api_id}"))
        .insert_header(("X-402-Session", token.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;

    assert_eq!(body["code"], "successful");
    assert_eq!(body["data"]["api"]["id"], api_id.as_str());
    assert_eq!(body["data"]["session"]["session_id_hex"], token.as_str());
    assert!(body["data"]["session"]["expires_at"].is_string());
    assert_eq!(body["data"]["upstream"]["status"], 200);
    assert_eq!(
        body["data"]["upstream"]["body"],
        serde_json::json!({"city": "Quito", "temp": 18})
    );
    assert_eq!(store.session_count(), 1);
}

#[actix_rt::test]
async fn test_expired_session_is_reissued() {
    let store = Arc::new(InMemoryGateStore::new());
    let state = make_state(store.clone(), test_config());
    let app = app!(state);
    let api_id = register!(app, "https://api.example.com/weather");

    let req = test::TestRequest::get()
        .uri(&format!("/api/{api_id}"))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let token = body["data"]["session_id"].as_str().unwrap().to_string();

    // Paid long enough ago that the 300 second window has lapsed.
    store
        .confirm_payment(&token, Utc::now() - Duration::seconds(600))
        .unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/{api_id}"))
        .insert_header(("X-402-Session", token.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 402);
    let body: serde_json::Value = test::read_body_json(resp).await;

    assert_eq!(body["code"], "session_expired");
    assert_eq!(body["meta"]["previous_session"], token.as_str());
    assert!(body["meta"]["expired_at"].is_string());
    assert_ne!(body["data"]["session_id"], token.as_str());
    assert_eq!(store.session_count(), 2);
}

#[actix_rt::test]
async fn test_upstream_failure_is_bad_gateway() {
    let store = Arc::new(InMemoryGateStore::new());
    let state = make_state(store.clone(), test_config());
    let app = app!(state);
    // Nothing listens on port 1.
    let api_id = register!(app, "http://127.0.0.1:1/down");

    let req = test::TestRequest::get()
        .uri(&format!("/api/{api_id}"))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let token = body["data"]["session_id"].as_str().unwrap().to_string();
    store.confirm_payment(&token, Utc::now()).unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/{api_id}"))
        .insert_header(("X-402-Session", token.as_str()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 502);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "upstream_error");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("failed to fetch API URL"));
}

#[actix_rt::test]
async fn test_registration_rejects_invalid_input() {
    let config = GatewayConfig {
        allow_private_upstreams: false,
        ..test_config()
    };
    let state = make_state(Arc::new(InMemoryGateStore::new()), config);
    let app = app!(state);

    let mut bad_amount = registration("https://api.example.com");
    bad_amount["p_amount_wei"] = serde_json::json!("0");
    let private_url = registration("http://10.0.0.5/internal");
    let mut bad_wallet = registration("https://api.example.com");
    bad_wallet["p_merchant_wallet"] = serde_json::json!("0x1234");
    let missing_fields = serde_json::json!({ "p_api_url": "https://api.example.com" });
    let mut endless_window = registration("https://api.example.com");
    endless_window["p_valid_for_sec"] = serde_json::json!(i64::MAX);

    for payload in [
        bad_amount,
        private_url,
        bad_wallet,
        missing_fields,
        endless_window,
    ] {
        let req = test::TestRequest::post()
            .uri("/api/402/apis")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "{payload}");
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "bad_request");
        assert!(body["error"].is_string());
    }
}

#[actix_rt::test]
async fn test_sqlite_store_serves_gates() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("paygate.db");
    let store = Arc::new(SqliteGateStore::open(db_path.to_str().unwrap()).unwrap());
    let state = make_state(store.clone(), test_config());
    let app = app!(state);
    let api_id = register!(app, "https://api.example.com/weather");

    let req = test::TestRequest::get()
        .uri(&format!("/api/{api_id}"))
        .to_request();
    let first: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let token = first["data"]["session_id"].as_str().unwrap().to_string();

    // A pending token is echoed back rather than replaced.
    let req = test::TestRequest::get()
        .uri(&format!("/api/{api_id}"))
        .insert_header(("X-402-Session", token.as_str()))
        .to_request();
    let second: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(second["code"], "payment_required");
    assert_eq!(second["data"]["session_id"], token.as_str());
}

#[actix_rt::test]
async fn test_health_reports_ok() {
    let state = make_state(Arc::new(InMemoryGateStore::new()), test_config());
    let app = app!(state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "x402-paygate");
}

#[actix_rt::test]
async fn test_metrics_requires_bearer_token_when_configured() {
    let config = GatewayConfig {
        metrics_token: Some("scrape-me".to_string()),
        ..test_config()
    };
    let state = make_state(Arc::new(InMemoryGateStore::new()), config);
    let app = app!(state);

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer scrape-me"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}
