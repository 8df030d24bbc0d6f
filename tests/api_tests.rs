mod common;

use axum::http::{Method, StatusCode};
use chrono::Duration;
use serde_json::json;

use common::{customer, dates, money, TestApp, JWT_SECRET};
use rental_core::models::payment_intent::IntentPurpose;
use rental_core::repositories::PaymentIntentRepository;
use rental_core::utils::jwt::generate_token;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
}

#[tokio::test]
async fn test_admin_routes_require_admin_token() {
    let app = TestApp::new();
    app.add_car("car-a", 450).await;
    let (_, body) = app.book("car-a", 5, 2, None).await;
    let booking_id = body["data"]["booking"]["id"].as_str().unwrap().to_string();
    let confirm = format!("/bookings/{}/confirm", booking_id);

    let (status, _) = app.send(Method::POST, &confirm, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::POST, &confirm, None, Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let customer_token =
        generate_token("u-2", "ada@example.com", "customer", JWT_SECRET, Duration::hours(1)).unwrap();
    let (status, _) = app.send(Method::POST, &confirm, None, Some(&customer_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::GET, "/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.admin(Method::POST, &confirm, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "confirmed");
}

#[tokio::test]
async fn test_booking_validation() {
    let app = TestApp::new();
    app.add_car("car-a", 450).await;

    // starts today
    let (status, body) = app.book("car-a", 0, 2, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // longer than 30 days
    let (status, _) = app.book("car-a", 3, 31, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // end before start
    let (start, _) = dates(5, 1);
    let (_, end) = dates(2, 1);
    let (status, _) = app
        .send(
            Method::POST,
            "/bookings",
            Some(json!({ "carId": "car-a", "startDate": start, "endDate": end, "customer": customer() })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.book("missing-car", 3, 2, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_booking_is_not_found() {
    let app = TestApp::new();
    let (status, _) = app.admin(Method::GET, "/bookings/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_signature_is_required() {
    let app = TestApp::new();
    let payload = json!({
        "id": "evt_x",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_x" } }
    })
    .to_string();

    let (status, _) = app.raw_webhook(payload.clone(), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .raw_webhook(payload, Some("t=1700000000,v1=deadbeef".to_string()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_for_unknown_intent_is_acknowledged() {
    let app = TestApp::new();
    let (status, body) = app.webhook("evt_orphan", "payment_intent.succeeded", "pi_unknown").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["disposition"], "ignored");

    let (status, body) = app.webhook("evt_other", "charge.refunded", "pi_unknown").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disposition"], "ignored");
}

#[tokio::test]
async fn test_failed_webhooks_are_listed_for_admins() {
    let app = TestApp::new();
    PaymentIntentRepository::new(app.state.store.clone())
        .link("pi_dangling", "booking-gone", IntentPurpose::Deposit)
        .await
        .unwrap();

    let (status, body) = app.webhook("evt_broken", "payment_intent.succeeded", "pi_dangling").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disposition"], "failed");

    let (status, _) = app.send(Method::GET, "/admin/webhooks/failed", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.admin(Method::GET, "/admin/webhooks/failed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["evt_broken"]));
}

#[tokio::test]
async fn test_fleet_listing_and_blackout_dates() {
    let app = TestApp::new();
    let (status, _) = app
        .admin(
            Method::POST,
            "/admin/cars",
            Some(json!({
                "id": "huracan",
                "brand": "Lamborghini",
                "model": "Huracan",
                "year": 2023,
                "dailyRate": 1200,
                "showOnHomepage": true,
                "displayOrder": 2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .admin(
            Method::POST,
            "/admin/cars",
            Some(json!({
                "id": "g-wagon",
                "brand": "Mercedes",
                "model": "G63",
                "year": 2022,
                "dailyRate": 700,
                "displayOrder": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.send(Method::GET, "/cars", None, None).await;
    let ids: Vec<&str> = body["data"].as_array().unwrap().iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["g-wagon", "huracan"]);

    let (_, body) = app.send(Method::GET, "/cars?homepage=true", None, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (start, end) = dates(10, 3);
    let (status, block) = app
        .admin(
            Method::POST,
            "/admin/cars/huracan/blocked-dates",
            Some(json!({ "startDate": start, "endDate": end, "reason": "service" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let block_id = block["data"]["id"].as_str().unwrap().to_string();

    let uri = format!("/cars/huracan/availability?startDate={}&endDate={}", start, end);
    let (status, body) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available"], false);
    assert_eq!(body["data"]["conflicts"]["bookingConflicts"], false);
    assert_eq!(body["data"]["conflicts"]["customBlocks"].as_array().unwrap().len(), 1);

    let (status, body) = app.book("huracan", 11, 2, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DATES_UNAVAILABLE");

    let (status, _) = app
        .admin(Method::DELETE, &format!("/admin/cars/huracan/blocked-dates/{}", block_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(body["data"]["available"], true);
}

#[tokio::test]
async fn test_promo_code_discounts_booking() {
    let app = TestApp::new();
    app.add_car("car-a", 450).await;

    let (status, _) = app
        .admin(
            Method::POST,
            "/admin/promos",
            Some(json!({ "code": "welcome10", "percentOff": 10, "maxRedemptions": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (start, end) = dates(8, 3);
    let request = json!({
        "carId": "car-a",
        "startDate": start,
        "endDate": end,
        "customer": customer(),
        "promoCode": "WELCOME10"
    });
    let (status, body) = app.send(Method::POST, "/bookings", Some(request), None).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let pricing = &body["data"]["booking"]["pricing"];
    assert_eq!(money(&pricing["subtotal"]), 1350.0);
    assert_eq!(money(&pricing["finalAmount"]), 1215.0);
    assert_eq!(body["data"]["booking"]["payment"]["additionalCharges"][0]["kind"], "promo_discount");

    // single-use code is now exhausted
    let (start, end) = dates(20, 2);
    let request = json!({
        "carId": "car-a",
        "startDate": start,
        "endDate": end,
        "customer": customer(),
        "promoCode": "WELCOME10"
    });
    let (status, _) = app.send(Method::POST, "/bookings", Some(request), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.admin(Method::GET, "/admin/promos", None).await;
    assert_eq!(body["data"][0]["timesRedeemed"], 1);
}

#[tokio::test]
async fn test_credit_below_captured_deposit_needs_refund_flag() {
    let app = TestApp::new();
    app.add_car("car-a", 450).await;
    let (_, body) = app
        .book("car-a", 6, 1, Some(rental_core::clients::mock_processor::CARD_SUCCEEDS))
        .await;
    let booking_id = body["data"]["booking"]["id"].as_str().unwrap().to_string();
    let intent_id = body["data"]["payment"]["paymentIntentId"].as_str().unwrap().to_string();
    app.webhook("evt_hold", "payment_intent.amount_capturable_updated", &intent_id).await;
    let (status, _) = app
        .admin(Method::POST, &format!("/bookings/{}/capture-deposit", booking_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // final 450, captured 500: any credit lands below the deposit
    let uri = format!("/bookings/{}/charge-additional", booking_id);
    let (status, _) = app
        .admin(Method::POST, &uri, Some(json!({ "amount": -100, "description": "Goodwill" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .admin(
            Method::POST,
            &uri,
            Some(json!({ "amount": -100, "description": "Goodwill", "recordRefund": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let booking = &body["data"]["booking"];
    assert_eq!(money(&booking["pricing"]["finalAmount"]), 350.0);
    assert_eq!(booking["payment"]["refunds"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["payment"]["status"], "not_attempted");
}

#[tokio::test]
async fn test_capture_requires_authorized_deposit() {
    let app = TestApp::new();
    app.add_car("car-a", 450).await;
    let (_, body) = app.book("car-a", 5, 2, None).await;
    let booking_id = body["data"]["booking"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .admin(Method::POST, &format!("/bookings/{}/capture-deposit", booking_id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}
