use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/booking-lifecycle", post(transition_booking))
        .route("/bookings/:id", get(get_booking))
}

pub async fn transition_booking(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::LifecycleRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_json", rejection.body_text());
        }
    };

    let request = match body.into_transition() {
        Ok(request) => request,
        Err(response) => return response,
    };

    match services.engine().transition(request).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_booking(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let booking_id = match dto::parse_booking_id(Some(&id)) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.booking_view(booking_id).await {
        Ok(Some(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "booking_not_found",
            format!("booking not found: {booking_id}"),
        ),
        Err(e) => {
            tracing::error!(booking_id = %booking_id, error = %e, "booking lookup failed");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "booking_lookup_failed", e.to_string())
        }
    }
}
