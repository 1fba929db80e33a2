use axum::http::StatusCode;
use serde::Deserialize;

use travelos_booking::{ActorType, BookingLifecycleStatus, Metadata};
use travelos_core::BookingId;
use travelos_infra::lifecycle_engine::TransitionRequest;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /core/booking-lifecycle`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRequest {
    pub booking_id: Option<String>,
    pub to_status: Option<String>,
    pub actor_type: Option<String>,
    pub actor_id: Option<String>,
    pub note: Option<String>,
    /// Stored on the booking when `toStatus` is `cancelled`.
    pub cancellation_reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub metadata: Option<Metadata>,
}

impl LifecycleRequest {
    pub fn into_transition(self) -> Result<TransitionRequest, axum::response::Response> {
        let booking_id = parse_booking_id(self.booking_id.as_deref())?;

        let to_status = self
            .to_status
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .parse::<BookingLifecycleStatus>()
            .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_to_status", e.to_string()))?;

        let actor_type = match self.actor_type.as_deref().map(str::trim) {
            None | Some("") => ActorType::System,
            Some(raw) => raw.parse::<ActorType>().map_err(|e| {
                errors::json_error(StatusCode::BAD_REQUEST, "invalid_actor_type", e.to_string())
            })?,
        };

        let mut request = TransitionRequest::new(booking_id, to_status, actor_type);
        if let Some(actor_id) = self.actor_id {
            request = request.with_actor_id(actor_id);
        }
        if let Some(note) = self.note {
            request = request.with_note(note);
        }
        if let Some(reason) = self.cancellation_reason {
            request = request.with_cancellation_reason(reason);
        }
        if let Some(key) = self.idempotency_key {
            request = request.with_idempotency_key(key);
        }
        if let Some(metadata) = self.metadata {
            request = request.with_metadata(metadata);
        }
        Ok(request)
    }
}

/// Query string of `POST /payments/webhook`.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    pub provider: Option<String>,
}

pub fn parse_booking_id(raw: Option<&str>) -> Result<BookingId, axum::response::Response> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        errors::json_error(StatusCode::BAD_REQUEST, "booking_id_required", "bookingId is required")
    })?;

    raw.parse::<BookingId>()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_booking_id", e.to_string()))
}
