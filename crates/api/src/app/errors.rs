use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use travelos_booking::PaymentPayloadError;
use travelos_infra::lifecycle_engine::LifecycleError;
use travelos_infra::payment_webhook::WebhookError;

pub fn lifecycle_error_to_response(err: LifecycleError) -> axum::response::Response {
    match err {
        LifecycleError::NotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "booking_not_found", err.to_string())
        }
        LifecycleError::InvalidTransition { .. } => {
            json_error(StatusCode::BAD_REQUEST, "invalid_transition", err.to_string())
        }
        LifecycleError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        LifecycleError::Store(_) => {
            tracing::error!(error = %err, "lifecycle update failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "lifecycle_update_failed",
                err.to_string(),
            )
        }
    }
}

pub fn webhook_error_to_response(err: WebhookError) -> axum::response::Response {
    let (status, code) = match &err {
        WebhookError::Payload(PaymentPayloadError::MissingEventId) => {
            (StatusCode::BAD_REQUEST, "event_id_missing")
        }
        WebhookError::Payload(PaymentPayloadError::MissingBookingId) => {
            (StatusCode::BAD_REQUEST, "booking_id_required")
        }
        WebhookError::Payload(PaymentPayloadError::InvalidBookingId(_)) => {
            (StatusCode::BAD_REQUEST, "invalid_booking_id")
        }
        WebhookError::LedgerUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "webhook_ledger_unavailable")
        }
        WebhookError::BookingNotFound(_) => (StatusCode::NOT_FOUND, "booking_not_found"),
        WebhookError::InvalidTransition { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition")
        }
        WebhookError::Processing(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "webhook_processing_failed")
        }
        WebhookError::PaymentStore(_) => {
            tracing::error!(error = %err, "payment webhook left no payment row");
            (StatusCode::INTERNAL_SERVER_ERROR, "payment_record_failed")
        }
    };
    json_error(status, code, err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use travelos_booking::BookingLifecycleStatus;
    use travelos_core::BookingId;

    #[test]
    fn lifecycle_errors_map_to_caller_and_system_statuses() {
        let cases = [
            (LifecycleError::NotFound(BookingId::new()), StatusCode::NOT_FOUND),
            (
                LifecycleError::InvalidTransition {
                    from: BookingLifecycleStatus::Completed,
                    to: BookingLifecycleStatus::LeadCreated,
                },
                StatusCode::BAD_REQUEST,
            ),
            (LifecycleError::Conflict("raced".into()), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(lifecycle_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn webhook_invalid_transition_is_unprocessable() {
        let err = WebhookError::InvalidTransition {
            from: BookingLifecycleStatus::LeadCreated,
            to: BookingLifecycleStatus::PaymentConfirmed,
        };
        assert_eq!(
            webhook_error_to_response(err).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            webhook_error_to_response(WebhookError::LedgerUnavailable("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            webhook_error_to_response(WebhookError::PaymentStore(
                travelos_infra::payments::PaymentStoreError::Unavailable("down".into())
            ))
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
