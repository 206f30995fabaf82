//! HTTP API tests against the in-memory box office.
//!
//! Requests go through the full router (auth, error mapping, middleware) via
//! `tower::ServiceExt::oneshot`.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use boxoffice_core::{BoxOffice, Principal, UserId};
use boxoffice_web::config::AuthConfig;
use boxoffice_web::{AppState, REQUEST_ID_HEADER, TokenKeys, build_router};
use chrono::Duration;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "test-jwt-secret";
const WEBHOOK_SECRET: &str = "test-webhook-secret";
const TASK_TOKEN: &str = "test-task-token";

struct TestApp {
    router: Router,
    tokens: TokenKeys,
}

impl TestApp {
    fn new() -> Self {
        let auth = AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            task_token: Some(TASK_TOKEN.to_string()),
            webhook_secret: WEBHOOK_SECRET.to_string(),
        };
        let office = Arc::new(BoxOffice::builder().build());
        Self {
            router: build_router(AppState::new(office, &auth)),
            tokens: TokenKeys::from_secret(JWT_SECRET),
        }
    }

    fn token(&self, principal: Principal) -> String {
        self.tokens.issue(principal, Duration::minutes(10)).unwrap()
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        self.send_with(method, uri, token, &[], body).await
    }

    async fn send_with(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let request = match body {
            Some(body) => request
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Sets up a session with rows A and B of four seats at 15.00 each.
    async fn create_session(&self, admin: &str) -> String {
        let sector = Uuid::new_v4();
        let (status, body) = self
            .send(
                "POST",
                "/api/admin/sessions",
                Some(admin),
                Some(json!({
                    "event_name": "Noche de Tango",
                    "starts_at": "2026-12-01T21:00:00Z",
                    "sectors": [{
                        "id": sector,
                        "name": "Platea",
                        "rows": [{ "label": "A", "seats": 4 }, { "label": "B", "seats": 4 }]
                    }],
                    "categories": [{
                        "id": Uuid::new_v4(),
                        "sector_id": sector,
                        "title": "Platea General",
                        "price": 1500
                    }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["seats"], 8);
        body["session_id"].as_str().unwrap().to_string()
    }

    async fn order_seats(&self, buyer: &str, session_id: &str, labels: &[&str]) -> (StatusCode, Value) {
        self.send(
            "POST",
            &format!("/api/sessions/{session_id}/orders"),
            Some(buyer),
            Some(json!({ "labels": labels })),
        )
        .await
    }

    async fn webhook(&self, payment_ref: &Value, outcome: &str) -> (StatusCode, Value) {
        self.send_with(
            "POST",
            "/api/webhooks/payments",
            None,
            &[("X-Webhook-Secret", WEBHOOK_SECRET)],
            Some(json!({ "payment_ref": payment_ref, "status": outcome })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_is_public_and_tagged_with_request_id() {
    let app = TestApp::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn test_session_setup_requires_admin_token() {
    let app = TestApp::new();
    let buyer = app.token(Principal::buyer(UserId::new()));

    let (status, body) = app
        .send("POST", "/api/admin/sessions", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, body) = app
        .send(
            "POST",
            "/api/admin/sessions",
            Some(&buyer),
            Some(json!({
                "event_name": "x",
                "starts_at": "2026-12-01T21:00:00Z",
                "sectors": [],
                "categories": []
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app
        .send("GET", "/api/admin/sessions/not-a-uuid/dashboard", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_seat_map_is_public() {
    let app = TestApp::new();
    let admin = app.token(Principal::admin(UserId::new()));
    let session_id = app.create_session(&admin).await;

    let (status, map) = app.send("GET", &format!("/api/sessions/{session_id}/map"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(map["totals"]["available"], 8);
    assert_eq!(map["sectors"][0]["price"], 1500);

    let (status, seats) = app.send("GET", &format!("/api/sessions/{session_id}/seats"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seats.as_array().unwrap().len(), 8);
    assert_eq!(seats[0]["label"], "A-1");
    assert_eq!(seats[0]["status"], "AVAILABLE");

    let (status, body) = app
        .send("GET", &format!("/api/sessions/{}/map", Uuid::new_v4()), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_taken_seats_conflict_with_labels() {
    let app = TestApp::new();
    let admin = app.token(Principal::admin(UserId::new()));
    let alice = app.token(Principal::buyer(UserId::new()));
    let bob = app.token(Principal::buyer(UserId::new()));
    let session_id = app.create_session(&admin).await;

    let (status, order) = app.order_seats(&alice, &session_id, &["A-1", "A-2"]).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["total"], 3000);

    let (status, body) = app.order_seats(&bob, &session_id, &["A-2", "A-3"]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SEATS_UNAVAILABLE");
    assert_eq!(body["details"]["seats"], json!(["A-2"]));

    // Nothing partial was held for bob
    let (_, seats) = app.send("GET", &format!("/api/sessions/{session_id}/seats"), None, None).await;
    assert_eq!(seats[2]["label"], "A-3");
    assert_eq!(seats[2]["status"], "AVAILABLE");
}

#[tokio::test]
async fn test_selection_limits_and_unknown_labels() {
    let app = TestApp::new();
    let admin = app.token(Principal::admin(UserId::new()));
    let buyer = app.token(Principal::buyer(UserId::new()));
    let session_id = app.create_session(&admin).await;

    let (status, body) = app
        .order_seats(&buyer, &session_id, &["A-1", "A-2", "A-3", "A-4", "B-1", "B-2"])
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "LIMIT_EXCEEDED");
    assert_eq!(body["details"], json!({ "max": 5, "requested": 6 }));

    let (status, body) = app.order_seats(&buyer, &session_id, &["Z-9"]).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "UNKNOWN_SEATS");

    // Extending an order to the limit and past it
    let (_, order) = app.order_seats(&buyer, &session_id, &["A-1", "A-2", "A-3"]).await;
    let order_id = order["id"].as_str().unwrap();
    let (status, order) = app
        .send(
            "POST",
            &format!("/api/orders/{order_id}/seats"),
            Some(&buyer),
            Some(json!({ "labels": ["A-4", "B-1"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["items"].as_array().unwrap().len(), 5);

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/orders/{order_id}/seats"),
            Some(&buyer),
            Some(json!({ "labels": ["B-2"] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_payment_flow_through_webhook() {
    let app = TestApp::new();
    let admin = app.token(Principal::admin(UserId::new()));
    let buyer = app.token(Principal::buyer(UserId::new()));
    let session_id = app.create_session(&admin).await;

    let (_, order) = app.order_seats(&buyer, &session_id, &["B-1", "B-2"]).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, order) = app
        .send("POST", &format!("/api/orders/{order_id}/payment"), Some(&buyer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "AWAITING_PAYMENT");
    let payment_ref = order["payment_ref"].clone();
    assert!(payment_ref.is_string());

    // Wrong secret
    let (status, _) = app
        .send_with(
            "POST",
            "/api/webhooks/payments",
            None,
            &[("X-Webhook-Secret", "nope")],
            Some(json!({ "payment_ref": payment_ref, "status": "confirmed" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, order) = app.webhook(&payment_ref, "confirmed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "PAID");

    // Redelivery is harmless
    let (status, order) = app.webhook(&payment_ref, "confirmed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "PAID");

    let (status, dashboard) = app
        .send("GET", &format!("/api/admin/sessions/{session_id}/dashboard"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["revenue"], 3000);
    assert_eq!(dashboard["tickets_sold"], 2);
    assert_eq!(dashboard["seats"]["sold"], 2);

    let (status, body) = app
        .send("POST", &format!("/api/orders/{order_id}/cancel"), Some(&buyer), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_denied_payment_frees_seats() {
    let app = TestApp::new();
    let admin = app.token(Principal::admin(UserId::new()));
    let buyer = app.token(Principal::buyer(UserId::new()));
    let session_id = app.create_session(&admin).await;

    let (_, order) = app.order_seats(&buyer, &session_id, &["A-4"]).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let (_, order) = app
        .send("POST", &format!("/api/orders/{order_id}/payment"), Some(&buyer), None)
        .await;

    let (status, order) = app.webhook(&order["payment_ref"], "denied").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "EXPIRED");

    let (status, _) = app.webhook(&json!("unknown-ref"), "confirmed").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, seats) = app.send("GET", &format!("/api/sessions/{session_id}/seats"), None, None).await;
    assert_eq!(seats[3]["label"], "A-4");
    assert_eq!(seats[3]["status"], "AVAILABLE");
}

#[tokio::test]
async fn test_confirmation_for_expired_order_is_acknowledged_and_flagged() {
    let app = TestApp::new();
    let admin = app.token(Principal::admin(UserId::new()));
    let buyer = app.token(Principal::buyer(UserId::new()));
    let session_id = app.create_session(&admin).await;

    let (_, order) = app.order_seats(&buyer, &session_id, &["B-1"]).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let (_, order) = app
        .send("POST", &format!("/api/orders/{order_id}/payment"), Some(&buyer), None)
        .await;
    let payment_ref = order["payment_ref"].clone();
    let (_, order) = app.webhook(&payment_ref, "denied").await;
    assert_eq!(order["status"], "EXPIRED");

    // gateway changes its mind after the order is gone
    let (status, order) = app.webhook(&payment_ref, "confirmed").await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["status"], "EXPIRED");

    let (status, flags) = app.send("GET", "/api/admin/reconciliations", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flags.as_array().unwrap().len(), 1);
    assert_eq!(flags[0]["order_id"], order_id.as_str());
    assert_eq!(flags[0]["reason"], "late_confirmation");
}

#[tokio::test]
async fn test_orders_are_private_to_their_owner() {
    let app = TestApp::new();
    let admin = app.token(Principal::admin(UserId::new()));
    let owner = app.token(Principal::buyer(UserId::new()));
    let stranger = app.token(Principal::buyer(UserId::new()));
    let session_id = app.create_session(&admin).await;

    let (_, order) = app.order_seats(&owner, &session_id, &["A-1"]).await;
    let uri = format!("/api/orders/{}", order["id"].as_str().unwrap());

    let (status, _) = app.send("GET", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send("GET", &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app.send("POST", &format!("{uri}/cancel"), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins may cancel on the owner's behalf
    let (status, order) = app.send("POST", &format!("{uri}/cancel"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "CANCELLED");
}

#[tokio::test]
async fn test_expire_task_accepts_task_token_or_admin() {
    let app = TestApp::new();
    let admin = app.token(Principal::admin(UserId::new()));
    let buyer = app.token(Principal::buyer(UserId::new()));

    let (status, _) = app.send("POST", "/api/tasks/expire-orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send_with("POST", "/api/tasks/expire-orders", None, &[("X-Task-Token", "wrong")], None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("POST", "/api/tasks/expire-orders", Some(&buyer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, report) = app
        .send_with("POST", "/api/tasks/expire-orders", None, &[("X-Task-Token", TASK_TOKEN)], None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["expired"], 0);

    let (status, _) = app.send("POST", "/api/tasks/expire-orders", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
}
