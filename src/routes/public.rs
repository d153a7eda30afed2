use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a bearer token: the liveness probe and the
/// login exchange that hands out tokens for everything else.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers. Returns "ok" without touching the store.
        .route("/health", get(|| async { "ok" }))
        // POST /api/users/login
        // Verifies email and password, returns a token and the user summary.
        .route("/api/users/login", post(handlers::login))
}
