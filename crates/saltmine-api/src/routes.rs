use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, chat, contact, debug, pain_points, payment, search, user};

/// All API routes. Layers that only matter in production (CORS, request
/// tracing) are added by the binary.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/pain-points/analyze", post(pain_points::analyze))
        .route("/api/reddit/search", post(search::reddit_search))
        .route("/api/adp/chat", post(chat::relay))
        .route("/api/contact/send", post(contact::send));

    let protected_routes = Router::new()
        .route("/api/payment/create-order", post(payment::create_order))
        .route("/api/payment/capture-order", post(payment::capture_order))
        .route(
            "/api/debug/quota",
            get(debug::quota_status).post(debug::increment_quota),
        )
        .route("/api/user/dashboard", get(user::dashboard))
        .route("/api/user/refresh-session", get(user::refresh_session))
        .route("/api/user/update-password", patch(user::update_password))
        .route("/api/user/update-profile", patch(user::update_profile))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
