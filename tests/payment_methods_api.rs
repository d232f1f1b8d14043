mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::{Extension, Router};
use common::{bearer, snapshot, user, FakeGateway, InMemoryUsers, JWT_SECRET};
use serde_json::{json, Value};
use httpmock::prelude::*;
use signdesk::billing::{PaymentMethodService, StripeAdapter, SubscriptionStatus};
use tower::ServiceExt; // for `oneshot`

fn app(gateway: Arc<FakeGateway>, users: Arc<InMemoryUsers>) -> Router {
    std::env::set_var("JWT_SECRET", JWT_SECRET);
    let service = Arc::new(PaymentMethodService::new(gateway, users));
    signdesk::billing::routes().layer(Extension(service))
}

fn subscribed() -> Arc<InMemoryUsers> {
    let mut record = user(1, Some("cus_1"));
    record.subscription = Some(snapshot("sub_1", SubscriptionStatus::Active));
    Arc::new(InMemoryUsers::default().with_user(record))
}

fn gateway() -> Arc<FakeGateway> {
    Arc::new(
        FakeGateway::new()
            .with_customer("cus_1", Some("pm_2"), &["pm_1", "pm_2"])
            .with_subscription("sub_1", "cus_1", SubscriptionStatus::Active, Some("pm_1")),
    )
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn listing_requires_authentication() {
    let response = app(gateway(), subscribed())
        .oneshot(
            Request::builder()
                .uri("/api/payment-methods")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn listing_marks_subscription_default() {
    let response = app(gateway(), subscribed())
        .oneshot(
            Request::builder()
                .uri("/api/payment-methods")
                .header(header::AUTHORIZATION, bearer(1))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let methods = body.as_array().unwrap();
    assert_eq!(methods.len(), 2);
    let default: Vec<&str> = methods
        .iter()
        .filter(|m| m["isDefault"] == json!(true))
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(default, vec!["pm_1"]);
    assert_eq!(methods[0]["last4"], json!("4242"));
}

#[tokio::test]
async fn deleting_subscription_default_is_refused_with_conflict() {
    let gateway = gateway();
    let response = app(gateway.clone(), subscribed())
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/payment-methods/pm_1")
                .header(header::AUTHORIZATION, bearer(1))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("set a new default first"));
    assert_eq!(gateway.cards_of("cus_1"), vec!["pm_1", "pm_2"]);
}

#[tokio::test]
async fn attach_creates_customer_for_new_user() {
    let users = Arc::new(InMemoryUsers::default().with_user(user(5, None)));
    let response = app(Arc::new(FakeGateway::new()), users.clone())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/payment-methods")
                .header(header::AUTHORIZATION, bearer(5))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"paymentMethodId": "pm_first"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["customerCreated"], json!(true));
    assert_eq!(body["isDefault"], json!(true));
    assert!(users.get(5).unwrap().billing_customer_id.is_some());
}

#[tokio::test]
async fn attach_rejects_blank_payment_method() {
    let response = app(gateway(), subscribed())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/payment-methods")
                .header(header::AUTHORIZATION, bearer(1))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"paymentMethodId": "  "}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn set_default_returns_no_content() {
    let gateway = gateway();
    let response = app(gateway.clone(), subscribed())
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/api/payment-methods/pm_2/default")
                .header(header::AUTHORIZATION, bearer(1))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(gateway.customer_default("cus_1").as_deref(), Some("pm_2"));
    assert_eq!(gateway.subscription_default("sub_1").as_deref(), Some("pm_2"));
}

#[tokio::test]
async fn encoded_path_ids_are_rejected_before_the_provider() {
    let gateway = gateway();
    for uri in [
        "/api/payment-methods/..%2Finvoices%2Fin_victim%2Fvoid%3F",
        "/api/payment-methods/pm_1%3Fexpand%3Dcustomer",
        "/api/payment-methods/..",
    ] {
        let response = app(gateway.clone(), subscribed())
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri(uri)
                    .header(header::AUTHORIZATION, bearer(1))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }

    let response = app(gateway.clone(), subscribed())
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/api/payment-methods/..%2F..%2Fv1%2Fcustomers%2Fcus_2/default")
                .header(header::AUTHORIZATION, bearer(1))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(gateway.calls().is_empty());
    assert_eq!(gateway.cards_of("cus_1"), vec!["pm_1", "pm_2"]);
}

#[tokio::test]
async fn traversal_id_does_not_void_invoice_through_stripe_adapter() {
    std::env::set_var("JWT_SECRET", JWT_SECRET);
    let server = MockServer::start_async().await;
    let void_mock = server.mock(|when, then| {
        when.method(POST).path("/v1/invoices/in_victim/void");
        then.status(200).json_body(json!({"id": "in_victim", "status": "void"}));
    });
    let adapter = StripeAdapter::new(&server.base_url(), "sk_test_123").unwrap();
    let service = Arc::new(PaymentMethodService::new(Arc::new(adapter), subscribed()));
    let app = signdesk::billing::routes().layer(Extension(service));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/payment-methods/..%2Finvoices%2Fin_victim%2Fvoid%3F")
                .header(header::AUTHORIZATION, bearer(1))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(void_mock.hits_async().await, 0);
}
