//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: adapter selection and lifecycle engine wiring
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and parsing helpers
//! - `errors.rs`: consistent `{error, message}` responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use travelos_infra::config::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(build_app_with_services(services, &config.admin_api_token))
}

/// Router over already-wired services.
pub fn build_app_with_services(services: Arc<services::AppServices>, admin_api_token: &str) -> Router {
    let admin_auth = middleware::AdminAuth::new(admin_api_token);

    // Admin routes: require the admin bearer token.
    let admin = routes::admin_router().layer(axum::middleware::from_fn_with_state(
        admin_auth,
        middleware::admin_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::public_router())
        .merge(admin)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
