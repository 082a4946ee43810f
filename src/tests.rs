use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use tower::ServiceExt;

use crate::{
    routes,
    service::{
        content::{Course, Lesson, SoftwareDownload, TradingRoom},
        payment::{sign_payload, ProviderStatus},
        product::Tier,
        subscription::SubscriptionStatus,
    },
    utils::test::{product, register_user, setup_test_state, TestContext, BASIC_PRODUCT, PREMIUM_PRODUCT},
};

const API_KEY: &str = "desktop-client-key";
const WEBHOOK_SECRET: &str = "whsec_test_secret";

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn webhook_request(payload: &Value) -> Request<Body> {
    let body = payload.to_string();
    let signature = sign_payload(body.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());
    Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("stripe-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

async fn setup() -> (TestContext, Router) {
    let ctx = setup_test_state().await;
    let router = routes::router(ctx.state.clone());
    (ctx, router)
}

/// Starts a trial on `product_id` and returns the created subscription JSON.
async fn start_trial(router: &Router, token: &str, product_id: &str) -> Value {
    let (status, body) = call(
        router,
        json_request(
            "POST",
            "/api/subscriptions",
            Some(token),
            json!({ "productId": product_id, "subscriptionType": "monthly" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["subscription"].clone()
}

#[tokio::test]
async fn test_health() {
    let (_ctx, router) = setup().await;
    let (status, body) = call(&router, get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn test_register_validation_errors() {
    let (_ctx, router) = setup().await;

    let cases = [
        json!({ "password": "long-enough-password" }),
        json!({ "email": "not-an-email", "password": "long-enough-password" }),
        json!({ "email": "trader@example.com", "password": "short" }),
    ];
    for body in cases {
        let (status, response) = call(&router, json_request("POST", "/api/auth/register", None, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["success"], false);
        assert!(response["message"].is_string());
    }
}

#[tokio::test]
async fn test_login_validation_errors() {
    let (_ctx, router) = setup().await;

    let (status, body) = call(
        &router,
        json_request("POST", "/api/auth/login", None, json!({ "email": "trader@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&router, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_register_login_and_me() {
    let (ctx, router) = setup().await;

    let (status, body) = call(
        &router,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({ "email": "Trader@Example.com", "password": "correct-horse", "firstName": "Ada" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "trader@example.com");
    assert!(ctx.mailer.sent().iter().any(|m| m.to == "trader@example.com"));

    let (status, body) = call(
        &router,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "trader@example.com", "password": "correct-horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = call(&router, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["firstName"], "Ada");

    let (status, body) = call(
        &router,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "trader@example.com", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let (ctx, router) = setup().await;
    register_user(&ctx.state, "trader@example.com").await;

    let (status, _) = call(
        &router,
        json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({ "email": "trader@example.com", "password": "another-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (_ctx, router) = setup().await;

    let (status, body) = call(&router, get("/api/subscriptions", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = call(&router, get("/api/auth/me", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_products_hide_provider_ids() {
    let (_ctx, router) = setup().await;
    let (status, body) = call(&router, get("/api/products", None)).await;
    assert_eq!(status, StatusCode::OK);

    let products = body["products"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert!(products[0].get("stripePrices").is_none());
    assert_eq!(products[0]["subscriptionTypes"]["monthly"], 4900);
}

#[tokio::test]
async fn test_google_redirect_and_callback() {
    let (ctx, router) = setup().await;

    let response = router.clone().oneshot(get("/api/auth/google", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    let nonce = location.split("state=").nth(1).unwrap().to_string();

    let uri = format!("/api/auth/google/callback?code=alice&state={}", nonce);
    let response = router.clone().oneshot(get(&uri, None)).await.unwrap();
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("http://localhost:3000/auth/callback?token="));

    let user = ctx
        .state
        .services
        .auth
        .users()
        .find_by_google_id("google-alice")
        .await
        .unwrap()
        .unwrap();
    assert!(user.is_verified);

    // The state nonce is single use.
    let response = router.clone().oneshot(get(&uri, None)).await.unwrap();
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.ends_with("error=oauth_failed"));
}

async fn google_sign_in(router: &Router, code: &str) -> String {
    let response = router.clone().oneshot(get("/api/auth/google", None)).await.unwrap();
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    let nonce = location.split("state=").nth(1).unwrap().to_string();

    let uri = format!("/api/auth/google/callback?code={}&state={}", code, nonce);
    let response = router.clone().oneshot(get(&uri, None)).await.unwrap();
    response.headers()[header::LOCATION].to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_google_links_existing_account_only_when_verified() {
    let (ctx, router) = setup().await;
    let (user_id, _) = register_user(&ctx.state, "victim@gmail.example.com").await;

    let location = google_sign_in(&router, "unverified-victim").await;
    assert!(location.ends_with("error=oauth_failed"));
    let users = ctx.state.services.auth.users();
    assert!(users.find_by_google_id("google-unverified-victim").await.unwrap().is_none());
    let user = users.find_by_id(&user_id).await.unwrap().unwrap();
    assert!(user.google_id.is_none());

    let location = google_sign_in(&router, "victim").await;
    assert!(location.starts_with("http://localhost:3000/auth/callback?token="));
    let linked = users.find_by_google_id("google-victim").await.unwrap().unwrap();
    assert_eq!(linked.id, user_id);
    assert!(linked.is_verified);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (ctx, router) = setup().await;
    register_user(&ctx.state, "trader@example.com").await;

    let (status, _) = call(
        &router,
        json_request(
            "POST",
            "/api/auth/forgot-password",
            None,
            json!({ "email": "nobody@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &router,
        json_request(
            "POST",
            "/api/auth/forgot-password",
            None,
            json!({ "email": "trader@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let reset = ctx
        .mailer
        .sent()
        .into_iter()
        .find(|m| m.text.contains("reset-password?token="))
        .unwrap();
    assert!(reset.text.contains("expires in 60 minutes"));
    let token = reset
        .text
        .split("token=")
        .nth(1)
        .unwrap()
        .split_whitespace()
        .next()
        .unwrap()
        .to_string();

    let (status, _) = call(
        &router,
        json_request(
            "POST",
            "/api/auth/reset-password",
            None,
            json!({ "token": token, "newPassword": "brand-new-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &router,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "trader@example.com", "password": "brand-new-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_trial_subscription_grants_basic_access() {
    let (ctx, router) = setup().await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;

    let subscription = start_trial(&router, &token, BASIC_PRODUCT).await;
    assert_eq!(subscription["subscriptionStatus"], "trial");
    assert_eq!(subscription["effectiveStatus"], "trial");
    assert_eq!(subscription["licenseNumber"], "LE-1-LIC");
    assert!(subscription["trialExpiresAt"].is_string());

    let (_, body) = call(&router, get("/api/subscriptions/access", Some(&token))).await;
    assert_eq!(body["access"]["hasBasicAccess"], true);
    assert_eq!(body["access"]["hasPremiumAccess"], false);

    let uri = format!("/api/subscriptions/trial-eligibility/{}", BASIC_PRODUCT);
    let (_, body) = call(&router, get(&uri, Some(&token))).await;
    assert_eq!(body["eligibility"]["eligible"], false);

    let uri = format!("/api/subscriptions/trial-eligibility/{}", PREMIUM_PRODUCT);
    let (_, body) = call(&router, get(&uri, Some(&token))).await;
    assert_eq!(body["eligibility"]["eligible"], true);

    assert!(ctx
        .mailer
        .sent()
        .iter()
        .any(|m| m.text.contains("LE-1-LIC")));
}

#[tokio::test]
async fn test_duplicate_subscription_conflicts() {
    let (ctx, router) = setup().await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;
    start_trial(&router, &token, BASIC_PRODUCT).await;

    let (status, body) = call(
        &router,
        json_request(
            "POST",
            "/api/subscriptions",
            Some(&token),
            json!({ "productId": BASIC_PRODUCT, "subscriptionType": "monthly", "paymentMethodId": "pm_1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_license_failure_does_not_block_subscription() {
    let (ctx, router) = setup().await;
    let (user_id, token) = register_user(&ctx.state, "trader@example.com").await;
    ctx.licensing.fail.store(true, Ordering::SeqCst);

    let subscription = start_trial(&router, &token, BASIC_PRODUCT).await;
    assert_eq!(subscription["subscriptionStatus"], "trial");
    assert!(subscription["licenseNumber"].is_null());

    let access = ctx.state.services.subscriptions.access(&user_id).await.unwrap();
    assert!(access.has_basic_access);
}

#[tokio::test]
async fn test_paid_subscription_requires_payment_method() {
    let (ctx, router) = setup().await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;
    ctx.state
        .services
        .products
        .upsert(&product("no-trial", Tier::Basic, 0))
        .await
        .unwrap();

    let (status, _) = call(
        &router,
        json_request(
            "POST",
            "/api/subscriptions",
            Some(&token),
            json!({ "productId": "no-trial", "subscriptionType": "annual" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &router,
        json_request(
            "POST",
            "/api/subscriptions",
            Some(&token),
            json!({ "productId": "no-trial", "subscriptionType": "annual", "paymentMethodId": "pm_card" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["subscription"]["subscriptionStatus"], "active");
    assert!(body["subscription"]["trialStartedAt"].is_null());
}

#[tokio::test]
async fn test_incomplete_payment_is_cancelled() {
    let (ctx, router) = setup().await;
    let (user_id, token) = register_user(&ctx.state, "trader@example.com").await;
    ctx.state
        .services
        .products
        .upsert(&product("no-trial", Tier::Basic, 0))
        .await
        .unwrap();
    *ctx.payments.status_without_trial.lock().unwrap() = ProviderStatus::Incomplete;

    let (status, body) = call(
        &router,
        json_request(
            "POST",
            "/api/subscriptions",
            Some(&token),
            json!({ "productId": "no-trial", "subscriptionType": "monthly", "paymentMethodId": "pm_declined" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], false);
    assert!(ctx.payments.calls().iter().any(|c| c.starts_with("cancel:sub_")));

    let subscriptions = ctx.state.services.subscriptions.list(&user_id).await.unwrap();
    assert!(subscriptions.is_empty());
}

#[tokio::test]
async fn test_upgrade_cancels_basic_and_starts_premium() {
    let (ctx, router) = setup().await;
    let (user_id, token) = register_user(&ctx.state, "trader@example.com").await;
    let basic = start_trial(&router, &token, BASIC_PRODUCT).await;
    let basic_sub = basic["stripeSubscriptionId"].as_str().unwrap().to_string();

    let (status, body) = call(
        &router,
        json_request(
            "POST",
            "/api/subscriptions/upgrade",
            Some(&token),
            json!({
                "fromProductId": BASIC_PRODUCT,
                "toProductId": PREMIUM_PRODUCT,
                "subscriptionType": "monthly",
                "paymentMethodId": "pm_card",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["subscription"]["productId"], PREMIUM_PRODUCT);
    assert_eq!(body["subscription"]["subscriptionStatus"], "active");
    assert!(body["subscription"]["trialStartedAt"].is_null());

    assert!(ctx.payments.calls().contains(&format!("cancel:{}", basic_sub)));

    let subscriptions = ctx.state.services.subscriptions.list(&user_id).await.unwrap();
    let old = subscriptions
        .iter()
        .find(|s| s.entry.product_id == BASIC_PRODUCT)
        .unwrap();
    assert_eq!(old.entry.subscription_status, SubscriptionStatus::Cancelled);
    assert!(!old.entry.auto_renewal);

    let access = ctx.state.services.subscriptions.access(&user_id).await.unwrap();
    assert!(access.has_premium_access);
    assert!(access.has_basic_access);
}

#[tokio::test]
async fn test_concurrent_subscriptions_keep_both_entries() {
    let (ctx, router) = setup().await;
    let (user_id, token) = register_user(&ctx.state, "trader@example.com").await;

    let create = |product_id: &str| {
        json_request(
            "POST",
            "/api/subscriptions",
            Some(&token),
            json!({ "productId": product_id, "subscriptionType": "monthly" }),
        )
    };
    let ((basic, _), (premium, _)) = tokio::join!(
        call(&router, create(BASIC_PRODUCT)),
        call(&router, create(PREMIUM_PRODUCT)),
    );
    assert_eq!(basic, StatusCode::CREATED);
    assert_eq!(premium, StatusCode::CREATED);

    let subscriptions = ctx.state.services.subscriptions.list(&user_id).await.unwrap();
    assert_eq!(subscriptions.len(), 2);
    assert!(subscriptions.iter().any(|s| s.entry.product_id == BASIC_PRODUCT));
    assert!(subscriptions.iter().any(|s| s.entry.product_id == PREMIUM_PRODUCT));

    let access = ctx.state.services.subscriptions.access(&user_id).await.unwrap();
    assert!(access.has_premium_access);
}

#[tokio::test]
async fn test_failed_create_cancels_remote_subscription() {
    let (ctx, router) = setup().await;
    let (user_id, token) = register_user(&ctx.state, "trader@example.com").await;
    ctx.state
        .storage
        .turso()
        .get_connection()
        .execute("DROP TABLE payments", ())
        .await
        .unwrap();

    let (status, body) = call(
        &router,
        json_request(
            "POST",
            "/api/subscriptions",
            Some(&token),
            json!({ "productId": BASIC_PRODUCT, "subscriptionType": "monthly" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);

    let calls = ctx.payments.calls();
    let created = calls
        .iter()
        .find_map(|call| call.strip_prefix(&format!("create_subscription:{}:", BASIC_PRODUCT)))
        .unwrap();
    assert!(calls.contains(&format!("cancel:{}", created)));

    let subscriptions = ctx.state.services.subscriptions.list(&user_id).await.unwrap();
    assert!(subscriptions.is_empty());
}

#[tokio::test]
async fn test_failed_upgrade_keeps_basic_and_cancels_premium() {
    let (ctx, router) = setup().await;
    let (user_id, token) = register_user(&ctx.state, "trader@example.com").await;
    let basic = start_trial(&router, &token, BASIC_PRODUCT).await;
    let basic_sub = basic["stripeSubscriptionId"].as_str().unwrap().to_string();
    ctx.state
        .storage
        .turso()
        .get_connection()
        .execute("DROP TABLE payments", ())
        .await
        .unwrap();

    let (status, _) = call(
        &router,
        json_request(
            "POST",
            "/api/subscriptions/upgrade",
            Some(&token),
            json!({
                "fromProductId": BASIC_PRODUCT,
                "toProductId": PREMIUM_PRODUCT,
                "subscriptionType": "monthly",
                "paymentMethodId": "pm_card",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let calls = ctx.payments.calls();
    let premium_sub = calls
        .iter()
        .find_map(|call| call.strip_prefix(&format!("create_subscription:{}:", PREMIUM_PRODUCT)))
        .unwrap();
    assert!(calls.contains(&format!("cancel:{}", premium_sub)));
    assert!(!calls.contains(&format!("cancel:{}", basic_sub)));

    let subscriptions = ctx.state.services.subscriptions.list(&user_id).await.unwrap();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].entry.subscription_status, SubscriptionStatus::Trial);
}

#[tokio::test]
async fn test_upgrade_requires_higher_tier() {
    let (ctx, router) = setup().await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;
    start_trial(&router, &token, PREMIUM_PRODUCT).await;

    let (status, _) = call(
        &router,
        json_request(
            "POST",
            "/api/subscriptions/upgrade",
            Some(&token),
            json!({
                "fromProductId": PREMIUM_PRODUCT,
                "toProductId": BASIC_PRODUCT,
                "subscriptionType": "monthly",
                "paymentMethodId": "pm_card",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_and_reactivate() {
    let (ctx, router) = setup().await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;
    let subscription = start_trial(&router, &token, BASIC_PRODUCT).await;
    let stripe_id = subscription["stripeSubscriptionId"].as_str().unwrap().to_string();

    let uri = format!("/api/subscriptions/{}/cancel", BASIC_PRODUCT);
    let (status, body) = call(&router, json_request("POST", &uri, Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription"]["autoRenewal"], false);
    assert_eq!(body["subscription"]["subscriptionStatus"], "trial");
    assert_eq!(body["subscription"]["hasAccess"], true);
    assert!(ctx
        .payments
        .calls()
        .contains(&format!("cancel_at_period_end:{}:true", stripe_id)));
    assert!(ctx.mailer.sent().iter().any(|m| m.subject.contains("cancelled")));

    // Cancelling twice is a no-op.
    let (status, _) = call(&router, json_request("POST", &uri, Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/subscriptions/{}/reactivate", BASIC_PRODUCT);
    let (status, body) = call(&router, json_request("POST", &uri, Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription"]["autoRenewal"], true);
}

#[tokio::test]
async fn test_cancel_unknown_subscription() {
    let (ctx, router) = setup().await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;

    let uri = format!("/api/subscriptions/{}/cancel", BASIC_PRODUCT);
    let (status, body) = call(&router, json_request("POST", &uri, Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let (_ctx, router) = setup().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("stripe-signature", "t=1,v1=deadbeef")
        .body(Body::from(r#"{"id":"evt_1","type":"invoice.paid","data":{"object":{}}}"#))
        .unwrap();
    let (status, body) = call(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = call(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_paid_invoice_converts_trial_and_dedupes() {
    let (ctx, router) = setup().await;
    let (user_id, token) = register_user(&ctx.state, "trader@example.com").await;
    let subscription = start_trial(&router, &token, BASIC_PRODUCT).await;
    let stripe_id = subscription["stripeSubscriptionId"].as_str().unwrap().to_string();

    let period_end = Utc::now().timestamp() + 30 * 24 * 3600;
    let event = json!({
        "id": "evt_paid_1",
        "type": "invoice.paid",
        "data": { "object": {
            "id": "in_1",
            "customer": "cus_1",
            "amount_paid": 4900,
            "amount_due": 4900,
            "currency": "usd",
            "parent": { "subscription_details": {
                "subscription": stripe_id,
                "metadata": { "userId": user_id, "productId": BASIC_PRODUCT }
            }},
            "lines": { "data": [ { "period": { "end": period_end } } ] }
        }}
    });

    let (status, body) = call(&router, webhook_request(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "processed");

    let (_, body) = call(&router, get("/api/subscriptions", Some(&token))).await;
    let entry = &body["subscriptions"][0];
    assert_eq!(entry["subscriptionStatus"], "active");
    assert_eq!(entry["effectiveStatus"], "active");

    let (status, body) = call(&router, webhook_request(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");

    let (_, body) = call(&router, get("/api/payments/history", Some(&token))).await;
    let succeeded = body["payments"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["status"] == "succeeded")
        .count();
    assert_eq!(succeeded, 1);
}

#[tokio::test]
async fn test_subscription_events_sync_status() {
    let (ctx, router) = setup().await;
    let (user_id, token) = register_user(&ctx.state, "trader@example.com").await;
    let subscription = start_trial(&router, &token, BASIC_PRODUCT).await;
    let stripe_id = subscription["stripeSubscriptionId"].as_str().unwrap().to_string();

    let now = Utc::now().timestamp();
    let updated = json!({
        "id": "evt_updated",
        "type": "customer.subscription.updated",
        "data": { "object": {
            "id": stripe_id,
            "status": "active",
            "cancel_at_period_end": true,
            "current_period_end": now + 3600,
            "metadata": { "userId": user_id }
        }}
    });
    let (status, _) = call(&router, webhook_request(&updated)).await;
    assert_eq!(status, StatusCode::OK);

    let views = ctx.state.services.subscriptions.list(&user_id).await.unwrap();
    assert!(!views[0].entry.auto_renewal);
    assert!(views[0].has_access);

    let deleted = json!({
        "id": "evt_deleted",
        "type": "customer.subscription.deleted",
        "data": { "object": {
            "id": stripe_id,
            "status": "canceled",
            "ended_at": now - 1,
            "metadata": { "userId": user_id }
        }}
    });
    let (status, _) = call(&router, webhook_request(&deleted)).await;
    assert_eq!(status, StatusCode::OK);

    let access = ctx.state.services.subscriptions.access(&user_id).await.unwrap();
    assert!(!access.has_basic_access);

    // An update delivered after the deletion must not restore access.
    let late = json!({
        "id": "evt_late_update",
        "type": "customer.subscription.updated",
        "data": { "object": {
            "id": stripe_id,
            "status": "active",
            "cancel_at_period_end": false,
            "current_period_end": now + 27 * 24 * 3600,
            "metadata": { "userId": user_id }
        }}
    });
    let (status, _) = call(&router, webhook_request(&late)).await;
    assert_eq!(status, StatusCode::OK);

    let views = ctx.state.services.subscriptions.list(&user_id).await.unwrap();
    assert_eq!(views[0].entry.subscription_status, SubscriptionStatus::Cancelled);
    assert!(!views[0].entry.auto_renewal);
    assert!(!views[0].has_access);
    let access = ctx.state.services.subscriptions.access(&user_id).await.unwrap();
    assert!(!access.has_basic_access);

    // The product was trialed once; a new subscription needs a payment method.
    let uri = format!("/api/subscriptions/trial-eligibility/{}", BASIC_PRODUCT);
    let (_, body) = call(&router, get(&uri, Some(&token))).await;
    assert_eq!(body["eligibility"]["eligible"], false);
}

#[tokio::test]
async fn test_webhook_for_unknown_subscription_is_ignored() {
    let (_ctx, router) = setup().await;
    let event = json!({
        "id": "evt_orphan",
        "type": "customer.subscription.updated",
        "data": { "object": { "id": "sub_unknown", "status": "active" } }
    });
    let (status, body) = call(&router, webhook_request(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "ignored");
}

#[tokio::test]
async fn test_license_validation_requires_api_key() {
    let (_ctx, router) = setup().await;
    let body = json!({ "licenseeNumber": "LE-1" });

    let (status, response) = call(&router, json_request("POST", "/api/license/validate", None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["success"], false);

    let mut request = json_request("POST", "/api/license/validate", None, body);
    request.headers_mut().insert("x-api-key", "wrong-key".parse().unwrap());
    let (status, _) = call(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_license_validation() {
    let (ctx, router) = setup().await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;
    let subscription = start_trial(&router, &token, BASIC_PRODUCT).await;
    let licensee = subscription["licenseeNumber"].as_str().unwrap().to_string();

    let mut request = json_request(
        "POST",
        "/api/license/validate",
        None,
        json!({ "licenseeNumber": licensee }),
    );
    request.headers_mut().insert("x-api-key", API_KEY.parse().unwrap());
    let (status, body) = call(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["tier"], "basic");

    let mut request = json_request(
        "POST",
        "/api/license/validate",
        None,
        json!({ "licenseeNumber": "LE-404" }),
    );
    request.headers_mut().insert("x-api-key", API_KEY.parse().unwrap());
    let (status, body) = call(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);

    let (_, body) = call(&router, get("/api/license", Some(&token))).await;
    assert_eq!(body["licenses"][0]["licenseeNumber"], licensee.as_str());
    assert_eq!(body["licenses"][0]["active"], true);
}

async fn seed_content(ctx: &TestContext) {
    let store = ctx.state.services.content.store();
    store
        .upsert_course(
            &Course {
                id: "foundations".into(),
                title: "Foundations".into(),
                description: "Market basics".into(),
                required_tier: Tier::Basic,
                sort_order: 1,
            },
            &[Lesson {
                id: "l1".into(),
                course_id: "foundations".into(),
                title: "Candlesticks".into(),
                content: "...".into(),
                video_url: None,
                sort_order: 1,
            }],
        )
        .await
        .unwrap();
    store
        .upsert_course(
            &Course {
                id: "advanced".into(),
                title: "Advanced order flow".into(),
                description: String::new(),
                required_tier: Tier::Premium,
                sort_order: 2,
            },
            &[],
        )
        .await
        .unwrap();
    store
        .upsert_download(&SoftwareDownload {
            id: "indicator".into(),
            product_id: Some(BASIC_PRODUCT.into()),
            name: "Indicator pack".into(),
            file_name: "indicators.zip".into(),
            drive_file_id: "drive-123".into(),
            required_tier: Tier::Basic,
            version: "1.0.0".into(),
        })
        .await
        .unwrap();
    store
        .upsert_room(&TradingRoom {
            id: "morning".into(),
            name: "Morning session".into(),
            description: String::new(),
            zoom_meeting_id: "98765".into(),
            required_tier: Tier::Premium,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_content_requires_subscription() {
    let (ctx, router) = setup().await;
    seed_content(&ctx).await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;

    let (status, body) = call(&router, get("/api/courses", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    start_trial(&router, &token, BASIC_PRODUCT).await;

    let (status, body) = call(&router, get("/api/courses", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let courses = body["courses"].as_array().unwrap();
    assert_eq!(courses.len(), 2);
    assert_eq!(courses[0]["locked"], false);
    assert_eq!(courses[1]["locked"], true);

    let (status, body) = call(&router, get("/api/courses/foundations", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["course"]["lessons"][0]["title"], "Candlesticks");

    let (status, _) = call(&router, get("/api/courses/advanced", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&router, get("/api/zoom/rooms", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_download_streams_file() {
    let (ctx, router) = setup().await;
    seed_content(&ctx).await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;
    start_trial(&router, &token, BASIC_PRODUCT).await;

    let response = router
        .clone()
        .oneshot(get("/api/downloads/indicator", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"indicators.zip\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"contents of drive-123");

    let (status, body) = call(&router, get("/api/downloads", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["downloads"][0].get("driveFileId").is_none());

    let (status, _) = call(&router, get("/api/downloads/missing", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_premium_rooms() {
    let (ctx, router) = setup().await;
    seed_content(&ctx).await;
    let (_, token) = register_user(&ctx.state, "trader@example.com").await;
    start_trial(&router, &token, PREMIUM_PRODUCT).await;

    let (status, body) = call(&router, get("/api/zoom/rooms", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let room = &body["rooms"][0];
    assert_eq!(room["name"], "Morning session");
    assert_eq!(room["joinUrl"], "https://zoom.us/j/98765");
    assert_eq!(room["upcoming"].as_array().unwrap().len(), 1);

    // Premium implies basic.
    let (status, _) = call(&router, get("/api/courses/advanced", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_contact_form() {
    let (ctx, router) = setup().await;

    let (status, _) = call(
        &router,
        json_request("POST", "/api/contact", None, json!({ "name": "Ada", "email": "bad" , "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &router,
        json_request(
            "POST",
            "/api/contact",
            None,
            json!({ "name": "Ada", "email": "ada@example.com", "message": "Do you offer coaching?" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let sent = ctx.mailer.sent();
    let message = sent.last().unwrap();
    assert_eq!(message.to, "support@example.com");
    assert_eq!(message.reply_to.as_deref(), Some("ada@example.com"));
}
