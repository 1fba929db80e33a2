use axum::Router;

pub mod lifecycle;
pub mod system;
pub mod webhooks;

/// Router for admin-only endpoints (guarded by the admin token middleware).
pub fn admin_router() -> Router {
    Router::new().nest("/core", lifecycle::router())
}

/// Router for endpoints called by external systems.
pub fn public_router() -> Router {
    Router::new().nest("/payments", webhooks::router())
}
