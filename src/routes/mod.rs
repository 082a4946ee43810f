mod auth;
mod contact;
mod content;
pub mod extract;
mod license;
pub mod middleware;
mod payment;
mod subscription;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/google", get(auth::google))
        .route("/google/callback", get(auth::google_callback))
        .route("/verify-email", get(auth::verify_email))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/me", get(auth::me));

    let subscription_routes = Router::new()
        .route("/", get(subscription::list).post(subscription::create))
        .route("/access", get(subscription::access))
        .route("/trial-eligibility/{product_id}", get(subscription::trial_eligibility))
        .route("/upgrade", post(subscription::upgrade))
        .route("/{product_id}/cancel", post(subscription::cancel))
        .route("/{product_id}/reactivate", post(subscription::reactivate));

    let payment_routes = Router::new()
        .route("/webhook", post(payment::webhook))
        .route("/history", get(payment::history));

    let license_routes = Router::new()
        .route(
            "/validate",
            post(license::validate).route_layer(from_fn_with_state(state.clone(), middleware::require_api_key)),
        )
        .route("/", get(license::list));

    let basic_routes = Router::new()
        .route("/courses", get(content::courses))
        .route("/courses/{id}", get(content::course))
        .route("/downloads", get(content::downloads))
        .route("/downloads/{id}", get(content::download))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_basic_access));

    let premium_routes = Router::new()
        .route("/zoom/rooms", get(content::rooms))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_premium_access));

    let api = Router::new()
        .route("/health", get(contact::health))
        .route("/products", get(subscription::list_products))
        .route("/contact", post(contact::contact))
        .nest("/auth", auth_routes)
        .nest("/subscriptions", subscription_routes)
        .nest("/payments", payment_routes)
        .nest("/license", license_routes)
        .merge(basic_routes)
        .merge(premium_routes);

    Router::new().nest("/api", api).with_state(state)
}
