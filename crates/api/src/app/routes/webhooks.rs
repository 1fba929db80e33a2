use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use travelos_booking::PaymentProvider;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

const PROVIDER_HEADER: &str = "x-payment-provider";

pub fn router() -> Router {
    Router::new().route("/webhook", post(payment_webhook))
}

pub async fn payment_webhook(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let provider = match resolve_provider(query.provider.as_deref(), &headers) {
        Ok(provider) => provider,
        Err(response) => return response,
    };

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_json", e.to_string());
        }
    };

    match services.webhooks().process(provider, payload).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => errors::webhook_error_to_response(e),
    }
}

/// Query parameter first, then the provider header; defaults to Razorpay.
fn resolve_provider(
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<PaymentProvider, axum::response::Response> {
    let header = headers.get(PROVIDER_HEADER).and_then(|v| v.to_str().ok());
    let Some(raw) = query.or(header).map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(PaymentProvider::Razorpay);
    };

    PaymentProvider::parse(raw).ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_provider",
            format!("unsupported payment provider: '{raw}'"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn provider_resolution_prefers_query_then_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_provider(None, &headers).unwrap(), PaymentProvider::Razorpay);

        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("Stripe"));
        assert_eq!(resolve_provider(None, &headers).unwrap(), PaymentProvider::Stripe);
        assert_eq!(
            resolve_provider(Some("bank_transfer"), &headers).unwrap(),
            PaymentProvider::BankTransfer
        );
        assert_eq!(
            resolve_provider(Some("paypal"), &headers).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
