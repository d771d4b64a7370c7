//! End-to-end requests through the full router against an in-memory database.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use workshop_core::access::{Actor, Role};
use workshop_core::config::AppConfig;
use workshop_db::repositories::bootstrap_roles;
use workshop_db::{connect_with_settings, migrations};
use workshop_server::{app, AppState};

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    async fn start() -> Self {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        bootstrap_roles(&pool).await.expect("roles");

        let mut config = AppConfig::default();
        config.auth.jwt_secret = "integration-test-secret".to_owned().into();
        let state = AppState::new(pool, &config);
        Self { router: app(state.clone()), state }
    }

    fn token(&self, role: Role) -> String {
        let actor = Actor {
            subject: format!("{role}@taller"),
            roles: vec![role],
            is_staff: false,
            is_superuser: false,
        };
        self.state.tokens.issue(&actor).expect("token")
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response =
            self.router.clone().oneshot(builder.body(body).expect("request")).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json") };
        (status, value)
    }

    /// Customer, vehicle, one service and one part; returns their ids.
    async fn seed_records(&self, token: &str) -> (i64, i64, i64, i64) {
        let (status, customer) = self
            .call("POST", "/api/customers", Some(token), Some(json!({"name": "Ana Pérez", "phone": "555-0101"})))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{customer}");
        let customer = customer["id"].as_i64().expect("customer id");

        let (status, vehicle) = self
            .call(
                "POST",
                "/api/vehicles",
                Some(token),
                Some(json!({"owner": customer, "plate": "abc-123", "brand": "Toyota", "model": "Hilux", "year": 2019})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{vehicle}");
        assert_eq!(vehicle["plate"], "ABC-123");
        let vehicle = vehicle["id"].as_i64().expect("vehicle id");

        let (status, service) = self
            .call(
                "POST",
                "/api/services",
                Some(token),
                Some(json!({"code": "OIL", "name": "Oil change", "price": "100.00"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{service}");

        let (status, part) = self
            .call(
                "POST",
                "/api/parts",
                Some(token),
                Some(json!({"sku": "FLT-1", "name": "Oil filter", "price": "25.50"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{part}");

        (customer, vehicle, service["id"].as_i64().expect("service id"), part["id"].as_i64().expect("part id"))
    }

    async fn create_quotation(&self, token: &str) -> Value {
        let (customer, vehicle, service, part) = self.seed_records(token).await;
        let (status, quotation) = self
            .call(
                "POST",
                "/api/quotations",
                Some(token),
                Some(json!({
                    "customer": customer,
                    "vehicle": vehicle,
                    "tax_total": "10.00",
                    "services": [{"service": service, "unit_price": "100.00"}],
                    "parts": [{"part": part, "quantity": "2", "unit_price": "25.50"}]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{quotation}");
        quotation
    }
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let app = TestApp::start().await;

    let (status, body) = app.call("GET", "/api/quotations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["correlation_id"].as_str().is_some());

    let (status, _) = app.call("GET", "/api/customers", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, health) = app.call("GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["db"], true);
}

#[tokio::test]
async fn created_quotation_is_numbered_and_priced() {
    let app = TestApp::start().await;
    let asesor = app.token(Role::Asesor);
    let quotation = app.create_quotation(&asesor).await;

    let year = chrono::Utc::now().format("%Y").to_string();
    assert_eq!(quotation["number"], format!("Q-{year}-0001"));
    assert_eq!(quotation["status"], "DRAFT");
    assert_eq!(quotation["subtotal_services"], "100.00");
    assert_eq!(quotation["subtotal_parts"], "51.00");
    assert_eq!(quotation["grand_total"], "161.00");
    assert_eq!(quotation["total"], "161.00");
    assert_eq!(quotation["parts"][0]["line_total"], "51.00");
}

#[tokio::test]
async fn line_endpoints_recompute_stored_totals() {
    let app = TestApp::start().await;
    let asesor = app.token(Role::Asesor);
    let quotation = app.create_quotation(&asesor).await;
    let id = quotation["id"].as_i64().expect("id");
    let part = quotation["parts"][0]["part"].as_i64().expect("part id");

    let (status, line) = app
        .call(
            "POST",
            &format!("/api/quotations/{id}/parts"),
            Some(&asesor),
            Some(json!({"part": part, "unit_price": "9.00", "discount": "0.50"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{line}");
    assert_eq!(line["line_total"], "4.50");

    let (_, refreshed) = app.call("GET", &format!("/api/quotations/{id}"), Some(&asesor), None).await;
    // Stored totals subtract the discount as an amount; the read side treats
    // 0.50 as half the unit price.
    assert_eq!(refreshed["grand_total"], "169.50");
    assert_eq!(refreshed["total"], "165.50");

    let line_id = line["id"].as_i64().expect("line id");
    let (status, _) = app
        .call("DELETE", &format!("/api/quotations/{id}/parts/{line_id}"), Some(&asesor), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, refreshed) = app.call("GET", &format!("/api/quotations/{id}"), Some(&asesor), None).await;
    assert_eq!(refreshed["grand_total"], "161.00");

    let (status, _) = app
        .call("DELETE", &format!("/api/quotations/{id}/parts/{line_id}"), Some(&asesor), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_line_amounts_are_rejected_as_field_errors() {
    let app = TestApp::start().await;
    let asesor = app.token(Role::Asesor);
    let quotation = app.create_quotation(&asesor).await;
    let id = quotation["id"].as_i64().expect("id");
    let service = quotation["services"][0]["service"].as_i64().expect("service id");

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/quotations/{id}/services"),
            Some(&asesor),
            Some(json!({"service": service, "quantity": "79228162514264337593543950335", "unit_price": "2"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["errors"]["quantity"].is_string(), "{body}");

    let (_, refreshed) = app.call("GET", &format!("/api/quotations/{id}"), Some(&asesor), None).await;
    assert_eq!(refreshed["services"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn mecanico_reads_but_cannot_approve() {
    let app = TestApp::start().await;
    let asesor = app.token(Role::Asesor);
    let mecanico = app.token(Role::Mecanico);
    let quotation = app.create_quotation(&asesor).await;
    let id = quotation["id"].as_i64().expect("id");

    let (status, listed) = app.call("GET", "/api/quotations", Some(&mecanico), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);

    let (status, _) = app.call("POST", &format!("/api/quotations/{id}/approve"), Some(&mecanico), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call("POST", "/api/customers", Some(&mecanico), Some(json!({"name": "Luis"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) =
        app.call("POST", &format!("/api/quotations/{id}/approve"), Some(&asesor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved, json!({"id": id, "number": quotation["number"], "status": "APPROVED"}));
}

#[tokio::test]
async fn conversion_requires_an_approved_quotation() {
    let app = TestApp::start().await;
    let asesor = app.token(Role::Asesor);
    let quotation = app.create_quotation(&asesor).await;
    let id = quotation["id"].as_i64().expect("id");

    let (status, body) =
        app.call("POST", &format!("/api/quotations/{id}/to-workorder"), Some(&asesor), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap_or_default().contains("APPROVED"));
    let (_, orders) = app.call("GET", "/api/workorders", Some(&asesor), None).await;
    assert_eq!(orders["count"], 0);

    app.call("POST", &format!("/api/quotations/{id}/approve"), Some(&asesor), None).await;
    let (status, converted) =
        app.call("POST", &format!("/api/quotations/{id}/to-workorder"), Some(&asesor), None).await;
    assert_eq!(status, StatusCode::CREATED, "{converted}");
    assert_eq!(converted["from_quotation"], quotation["number"]);

    let workorder_id = converted["workorder_id"].as_i64().expect("workorder id");
    let (status, order) =
        app.call("GET", &format!("/api/workorders/{workorder_id}"), Some(&asesor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "OPEN");
    assert_eq!(order["services"].as_array().map(Vec::len), Some(1));
    assert_eq!(order["parts"][0]["quantity"], "2.00");
    assert!(order["notes"].as_str().unwrap_or_default().contains(quotation["number"].as_str().unwrap_or("?")));
}

#[tokio::test]
async fn set_status_rejects_unknown_values() {
    let app = TestApp::start().await;
    let asesor = app.token(Role::Asesor);
    let quotation = app.create_quotation(&asesor).await;
    let id = quotation["id"].as_i64().expect("id");
    let uri = format!("/api/quotations/{id}/set-status");

    let (status, _) = app.call("POST", &uri, Some(&asesor), Some(json!({"status": "ARCHIVED"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.call("POST", &uri, Some(&asesor), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.call("POST", &uri, Some(&asesor), Some(json!({"status": "EXPIRED"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "EXPIRED");
}

#[tokio::test]
async fn foreign_vehicle_is_a_field_error() {
    let app = TestApp::start().await;
    let asesor = app.token(Role::Asesor);
    let (_, vehicle, _, _) = app.seed_records(&asesor).await;
    let (_, other) = app
        .call("POST", "/api/customers", Some(&asesor), Some(json!({"name": "Luis Gómez"})))
        .await;

    let (status, body) = app
        .call(
            "POST",
            "/api/quotations",
            Some(&asesor),
            Some(json!({"customer": other["id"], "vehicle": vehicle})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["vehicle"].is_string(), "{body}");
    let (_, listed) = app.call("GET", "/api/quotations", Some(&asesor), None).await;
    assert_eq!(listed["count"], 0);
}

#[tokio::test]
async fn referenced_customer_cannot_be_deleted() {
    let app = TestApp::start().await;
    let asesor = app.token(Role::Asesor);
    let quotation = app.create_quotation(&asesor).await;
    let customer = quotation["customer"].as_i64().expect("customer");

    let (status, body) = app.call("DELETE", &format!("/api/customers/{customer}"), Some(&asesor), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["retryable"], false);

    let (status, _) = app
        .call("DELETE", &format!("/api/quotations/{}", quotation["id"]), Some(&asesor), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn patch_replaces_lines_by_diff_and_keeps_absent_collections() {
    let app = TestApp::start().await;
    let asesor = app.token(Role::Asesor);
    let quotation = app.create_quotation(&asesor).await;
    let id = quotation["id"].as_i64().expect("id");
    let service_line = quotation["services"][0]["id"].as_i64().expect("line id");
    let service = quotation["services"][0]["service"].as_i64().expect("service id");

    let (status, patched) = app
        .call(
            "PATCH",
            &format!("/api/quotations/{id}"),
            Some(&asesor),
            Some(json!({
                "notes": "customer waits",
                "services": [
                    {"id": service_line, "service": service, "unit_price": "120.00"},
                    {"service": service, "unit_price": "30.00"}
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{patched}");
    assert_eq!(patched["notes"], "customer waits");
    assert_eq!(patched["services"].as_array().map(Vec::len), Some(2));
    assert_eq!(patched["parts"].as_array().map(Vec::len), Some(1));
    assert_eq!(patched["grand_total"], "211.00");
}
