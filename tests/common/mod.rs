#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use rental_core::build_app;
use rental_core::clients::{
    CreateIntentParams, Customer, MockProcessor, PaymentIntent, PaymentMethodSummary, PaymentProcessor,
    ProcessorResult,
};
use rental_core::config::{EnvironmentConfig, PaymentConfig, ProcessorBackend, StoreBackend, StoreConfig};
use rental_core::dto::car_dto::SaveCarRequest;
use rental_core::services::webhook_service::{WebhookDisposition, WebhookService, CANCELED};
use rental_core::state::AppState;
use rental_core::store::MemoryStore;
use rental_core::utils::jwt::generate_token;
use rental_core::utils::signature::{WebhookVerifier, SIGNATURE_HEADER};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub processor: MockProcessor,
    pub racing: Arc<RacingProcessor>,
}

/// Mock processor whose own webhooks can overtake its API responses: an armed
/// event is signed and handled while the processor call is still in flight.
pub struct RacingProcessor {
    inner: MockProcessor,
    webhooks: OnceLock<WebhookService>,
    on_create: Mutex<Option<String>>,
    cancel_events: Mutex<bool>,
    delivered: Mutex<Vec<(String, WebhookDisposition)>>,
    sequence: AtomicU64,
}

impl RacingProcessor {
    fn new(inner: MockProcessor) -> Self {
        Self {
            inner,
            webhooks: OnceLock::new(),
            on_create: Mutex::new(None),
            cancel_events: Mutex::new(false),
            delivered: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Deliver `event_type` for the next intent before its creation returns
    pub fn before_create_returns(&self, event_type: &str) {
        *self.on_create.lock().unwrap() = Some(event_type.to_string());
    }

    /// Deliver `payment_intent.canceled` before every cancel call returns
    pub fn report_cancellations(&self) {
        *self.cancel_events.lock().unwrap() = true;
    }

    /// `(intent id, disposition)` for every event delivered so far
    pub fn delivered(&self) -> Vec<(String, WebhookDisposition)> {
        self.delivered.lock().unwrap().clone()
    }

    async fn deliver(&self, event_type: &str, intent_id: &str, metadata: &HashMap<String, String>) {
        let webhooks = self.webhooks.get().expect("webhook service attached");
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        let payload = json!({
            "id": format!("evt_inflight_{}", n),
            "type": event_type,
            "data": { "object": { "id": intent_id, "metadata": metadata } }
        })
        .to_string();
        let signature = WebhookVerifier::new(WEBHOOK_SECRET, 300)
            .sign(payload.as_bytes(), Utc::now().timestamp())
            .unwrap();
        let ack = webhooks.handle(payload.as_bytes(), Some(&signature)).await.unwrap();
        self.delivered.lock().unwrap().push((intent_id.to_string(), ack.disposition));
    }
}

#[async_trait]
impl PaymentProcessor for RacingProcessor {
    async fn create_customer(&self, email: &str, name: &str, phone: Option<&str>) -> ProcessorResult<Customer> {
        self.inner.create_customer(email, name, phone).await
    }

    async fn retrieve_customer(&self, customer_id: &str) -> ProcessorResult<Customer> {
        self.inner.retrieve_customer(customer_id).await
    }

    async fn find_customer_by_email(&self, email: &str) -> ProcessorResult<Option<Customer>> {
        self.inner.find_customer_by_email(email).await
    }

    async fn list_payment_methods(&self, customer_id: &str) -> ProcessorResult<Vec<PaymentMethodSummary>> {
        self.inner.list_payment_methods(customer_id).await
    }

    async fn create_payment_intent(&self, params: CreateIntentParams) -> ProcessorResult<PaymentIntent> {
        let metadata = params.metadata.clone();
        let intent = self.inner.create_payment_intent(params).await?;
        let armed = self.on_create.lock().unwrap().take();
        if let Some(event_type) = armed {
            self.deliver(&event_type, &intent.id, &metadata).await;
        }
        Ok(intent)
    }

    async fn capture_payment_intent(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
    ) -> ProcessorResult<PaymentIntent> {
        self.inner.capture_payment_intent(intent_id, amount_cents).await
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent> {
        let intent = self.inner.cancel_payment_intent(intent_id).await?;
        let armed = *self.cancel_events.lock().unwrap();
        if armed {
            self.deliver(CANCELED, intent_id, &HashMap::new()).await;
        }
        Ok(intent)
    }
}

pub fn test_config() -> EnvironmentConfig {
    EnvironmentConfig {
        environment: "test".to_string(),
        port: 0,
        host: "127.0.0.1".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        cors_origins: Vec::new(),
        store_backend: StoreBackend::Memory,
        store: StoreConfig::default(),
        payments: PaymentConfig {
            backend: ProcessorBackend::Mock,
            stripe_secret_key: String::new(),
            stripe_api_base: "http://localhost".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            webhook_tolerance_secs: 300,
            currency: "usd".to_string(),
        },
    }
}

impl TestApp {
    pub fn new() -> Self {
        let processor = MockProcessor::new();
        let racing = Arc::new(RacingProcessor::new(processor.clone()));
        let state = AppState::new(test_config(), Arc::new(MemoryStore::new()), racing.clone());
        let _ = racing.webhooks.set(state.webhooks.clone());
        Self {
            router: build_app(state.clone()),
            state,
            processor,
            racing,
        }
    }

    pub async fn add_car(&self, id: &str, daily_rate: i64) {
        self.state
            .fleet
            .save_car(SaveCarRequest {
                id: Some(id.to_string()),
                brand: "Ferrari".to_string(),
                model: "Roma".to_string(),
                year: 2024,
                daily_rate: Decimal::from(daily_rate),
                weekly_rate: None,
                available: true,
                show_on_homepage: true,
                display_order: 0,
            })
            .await
            .unwrap();
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.dispatch(request).await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, body, Some(&admin_token())).await
    }

    /// Create a booking for `days` days starting `offset` days from today
    pub async fn book(
        &self,
        car_id: &str,
        offset: i64,
        days: i64,
        payment_method: Option<&str>,
    ) -> (StatusCode, Value) {
        let (start, end) = dates(offset, days);
        let mut body = json!({
            "carId": car_id,
            "startDate": start,
            "endDate": end,
            "customer": customer(),
        });
        if let Some(method) = payment_method {
            body["paymentMethodId"] = json!(method);
        }
        self.send(Method::POST, "/bookings", Some(body), None).await
    }

    /// Deliver a correctly signed processor event
    pub async fn webhook(&self, event_id: &str, event_type: &str, intent_id: &str) -> (StatusCode, Value) {
        let payload = json!({
            "id": event_id,
            "type": event_type,
            "data": { "object": { "id": intent_id, "status": "requires_capture" } }
        })
        .to_string();
        let signature = WebhookVerifier::new(WEBHOOK_SECRET, 300)
            .sign(payload.as_bytes(), Utc::now().timestamp())
            .unwrap();
        self.raw_webhook(payload, Some(signature)).await
    }

    pub async fn raw_webhook(&self, payload: String, signature: Option<String>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/webhooks/payments")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        self.dispatch(builder.body(Body::from(payload)).unwrap()).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}

pub fn admin_token() -> String {
    generate_token("admin-1", "ops@example.com", "admin", JWT_SECRET, Duration::hours(1)).unwrap()
}

pub fn customer() -> Value {
    json!({
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "phone": "+15555550100",
        "licenseNumber": "D1234567"
    })
}

pub fn dates(offset: i64, days: i64) -> (NaiveDate, NaiveDate) {
    let start = Utc::now().date_naive() + Duration::days(offset);
    (start, start + Duration::days(days))
}

pub fn money(value: &Value) -> f64 {
    value.as_f64().unwrap_or_else(|| panic!("not a number: {}", value))
}

impl TestApp {
    /// POST an admin action on a booking, e.g. `action(id, "reauthorize-deposit")`
    pub async fn action(&self, booking_id: &str, action: &str) -> (StatusCode, Value) {
        self.admin(Method::POST, &format!("/bookings/{}/{}", booking_id, action), None)
            .await
    }

    pub async fn booking(&self, booking_id: &str) -> Value {
        let (_, body) = self.admin(Method::GET, &format!("/bookings/{}", booking_id), None).await;
        body["data"].clone()
    }
}

pub fn history_count(booking: &Value, action: &str) -> usize {
    booking["history"]
        .as_array()
        .map(|entries| entries.iter().filter(|e| e["action"] == action).count())
        .unwrap_or(0)
}
