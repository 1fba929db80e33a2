use std::sync::Arc;

use chrono::Utc;
use reqwest::StatusCode;
use serde_json::json;

use travelos_api::app::services::{AppServices, InMemoryStores};
use travelos_booking::{
    Booking, BookingLifecycleStatus, DocumentKind, PaymentStatus, WebhookEventStatus, WebhookKey,
};
use travelos_core::{BookingId, CustomerId};
use travelos_infra::payments::PaymentsRepository;
use travelos_infra::repository::BookingRepository;
use travelos_infra::webhook_ledger::{LedgerAvailability, WebhookLedger};

const ADMIN_TOKEN: &str = "test-admin-token";

struct TestServer {
    base_url: String,
    stores: InMemoryStores,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory services, bound to an ephemeral port.
        let services = Arc::new(AppServices::in_memory());
        let stores = services
            .in_memory_stores()
            .cloned()
            .expect("in-memory services expose their stores");
        let app = travelos_api::app::build_app_with_services(services, ADMIN_TOKEN);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            stores,
            handle,
        }
    }

    fn seed_booking(&self, status: BookingLifecycleStatus) -> BookingId {
        let mut booking = Booking::new(
            BookingId::new(),
            "TOS-2024-0042",
            CustomerId::new(),
            "INR",
            Utc::now(),
        )
        .at_status(status, Utc::now());
        booking.gross_amount = 4_999_900;
        let id = booking.id;
        self.stores.bookings.insert_booking(booking).unwrap();
        id
    }

    async fn transition(&self, body: serde_json::Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/core/booking-lifecycle", self.base_url))
            .bearer_auth(ADMIN_TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn webhook(&self, provider: Option<&str>, body: serde_json::Value) -> reqwest::Response {
        let mut request = reqwest::Client::new().post(format!("{}/payments/webhook", self.base_url));
        if let Some(provider) = provider {
            request = request.header("x-payment-provider", provider);
        }
        request.json(&body).send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn error_code(res: reqwest::Response) -> String {
    let body: serde_json::Value = res.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_token_required_for_lifecycle_endpoints() {
    let srv = TestServer::spawn().await;
    let id = srv.seed_booking(BookingLifecycleStatus::LeadCreated);
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/core/booking-lifecycle", srv.base_url))
        .json(&json!({"bookingId": id.to_string(), "toStatus": "quotation_sent"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/core/bookings/{}", srv.base_url, id))
        .bearer_auth("wrong-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lifecycle_transition_then_idempotent_replay() {
    let srv = TestServer::spawn().await;
    let id = srv.seed_booking(BookingLifecycleStatus::PaymentPending);

    let body = json!({
        "bookingId": id.to_string(),
        "toStatus": "payment_confirmed",
        "actorType": "admin",
        "actorId": "ops-7",
        "idempotencyKey": "manual-confirm-1",
        "metadata": {"channel": "phone"},
    });

    let res = srv.transition(body.clone()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let first: serde_json::Value = res.json().await.unwrap();
    assert_eq!(first["changed"], json!(true));
    assert_eq!(first["booking"]["lifecycle_status"], json!("payment_confirmed"));
    assert_eq!(first["booking"]["metadata"]["channel"], json!("phone"));
    assert_eq!(first["event"]["actor_id"], json!("ops-7"));

    let res = srv.transition(body).await;
    assert_eq!(res.status(), StatusCode::OK);
    let replay: serde_json::Value = res.json().await.unwrap();
    assert_eq!(replay["changed"], json!(false));
    assert_eq!(replay["event"]["id"], first["event"]["id"]);

    let res = reqwest::Client::new()
        .get(format!("{}/core/bookings/{}", srv.base_url, id))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view: serde_json::Value = res.json().await.unwrap();
    assert_eq!(view["events"].as_array().unwrap().len(), 1);

    assert_eq!(srv.stores.documents.attempt_count(DocumentKind::Invoice), 1);
}

#[tokio::test]
async fn cancellation_records_reason_from_request() {
    let srv = TestServer::spawn().await;
    let explicit = srv.seed_booking(BookingLifecycleStatus::PaymentPending);
    let from_note = srv.seed_booking(BookingLifecycleStatus::QuotationSent);
    let defaulted = srv.seed_booking(BookingLifecycleStatus::LeadCreated);

    let res = srv
        .transition(json!({
            "bookingId": explicit.to_string(),
            "toStatus": "cancelled",
            "actorType": "customer",
            "note": "called the help desk",
            "cancellationReason": "Visa not granted",
        }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["booking"]["cancellation_reason"], json!("Visa not granted"));
    assert!(body["booking"]["cancelled_at"].is_string());

    srv.transition(json!({
        "bookingId": from_note.to_string(),
        "toStatus": "cancelled",
        "note": "duplicate enquiry",
    }))
    .await;
    srv.transition(json!({"bookingId": defaulted.to_string(), "toStatus": "cancelled"}))
        .await;

    for (id, reason) in [
        (explicit, "Visa not granted"),
        (from_note, "duplicate enquiry"),
        (defaulted, "Cancelled by user"),
    ] {
        let stored = srv.stores.bookings.get_booking_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.lifecycle_status, BookingLifecycleStatus::Cancelled);
        assert_eq!(stored.cancellation_reason.as_deref(), Some(reason));
    }
}

#[tokio::test]
async fn lifecycle_rejects_bad_requests_with_typed_codes() {
    let srv = TestServer::spawn().await;
    let completed = srv.seed_booking(BookingLifecycleStatus::Completed);

    let cases = [
        (json!({"toStatus": "completed"}), StatusCode::BAD_REQUEST, "booking_id_required"),
        (
            json!({"bookingId": "not-a-uuid", "toStatus": "completed"}),
            StatusCode::BAD_REQUEST,
            "invalid_booking_id",
        ),
        (
            json!({"bookingId": completed.to_string(), "toStatus": "teleported"}),
            StatusCode::BAD_REQUEST,
            "invalid_to_status",
        ),
        (
            json!({"bookingId": completed.to_string(), "toStatus": "refunded", "actorType": "robot"}),
            StatusCode::BAD_REQUEST,
            "invalid_actor_type",
        ),
        (
            json!({"bookingId": BookingId::new().to_string(), "toStatus": "completed"}),
            StatusCode::NOT_FOUND,
            "booking_not_found",
        ),
        (
            json!({"bookingId": completed.to_string(), "toStatus": "lead_created"}),
            StatusCode::BAD_REQUEST,
            "invalid_transition",
        ),
    ];

    for (body, status, code) in cases {
        let res = srv.transition(body.clone()).await;
        assert_eq!(res.status(), status, "{body}");
        assert_eq!(error_code(res).await, code, "{body}");
    }

    let res = reqwest::Client::new()
        .get(format!("{}/core/bookings/{}", srv.base_url, completed))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    let view: serde_json::Value = res.json().await.unwrap();
    assert_eq!(view["booking"]["lifecycle_status"], json!("completed"));
    assert!(view["events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn payment_webhook_confirms_once_and_skips_redelivery() {
    let srv = TestServer::spawn().await;
    let id = srv.seed_booking(BookingLifecycleStatus::PaymentPending);
    let payload = json!({
        "eventId": "evt-123",
        "eventType": "payment.captured",
        "bookingId": id.to_string(),
    });

    let res = srv.webhook(None, payload.clone()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let first: serde_json::Value = res.json().await.unwrap();
    assert_eq!(first["provider"], json!("razorpay"));
    assert_eq!(first["duplicate"], json!(false));
    assert_eq!(first["changed"], json!(true));
    assert_eq!(first["lifecycleStatus"], json!("payment_confirmed"));

    let res = srv.webhook(Some("Razorpay"), payload).await;
    assert_eq!(res.status(), StatusCode::OK);
    let second: serde_json::Value = res.json().await.unwrap();
    assert_eq!(second["duplicate"], json!(true));

    let key = WebhookKey::new("razorpay", "evt-123").unwrap();
    let row = srv.stores.webhook_ledger.get(&key).await.unwrap().unwrap();
    assert_eq!(row.status, WebhookEventStatus::Processed);
    assert_eq!(row.booking_id, Some(id));
    assert_eq!(srv.stores.documents.attempt_count(DocumentKind::Invoice), 1);
    assert_eq!(srv.stores.payments.len(), 1);
}

#[tokio::test]
async fn captured_payment_is_linked_from_the_webhook_ledger() {
    let srv = TestServer::spawn().await;
    let id = srv.seed_booking(BookingLifecycleStatus::PaymentPending);

    let res = srv
        .webhook(
            Some("razorpay"),
            json!({
                "eventId": "evt-pay-1",
                "eventType": "payment.captured",
                "bookingId": id.to_string(),
                "providerPaymentId": "pay_1",
                "amount": 4_999_900,
                "currency": "INR",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let receipt: serde_json::Value = res.json().await.unwrap();

    let payments = srv.stores.payments.list_payments(id).await.unwrap();
    assert_eq!(payments.len(), 1);
    let payment = &payments[0];
    assert_eq!(payment.provider_payment_id.as_deref(), Some("pay_1"));
    assert_eq!(payment.amount, Some(4_999_900));
    assert_eq!(payment.status, PaymentStatus::Captured);
    assert_eq!(receipt["paymentId"], json!(payment.id.to_string()));

    let key = WebhookKey::new("razorpay", "evt-pay-1").unwrap();
    let row = srv.stores.webhook_ledger.get(&key).await.unwrap().unwrap();
    assert_eq!(row.payment_id, Some(payment.id));
    assert_eq!(payment.webhook_event_id, Some(row.id));

    let res = reqwest::Client::new()
        .get(format!("{}/core/bookings/{}", srv.base_url, id))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    let view: serde_json::Value = res.json().await.unwrap();
    assert_eq!(view["payments"][0]["provider_payment_id"], json!("pay_1"));
}

#[tokio::test]
async fn payment_webhook_error_codes() {
    let srv = TestServer::spawn().await;
    let lead = srv.seed_booking(BookingLifecycleStatus::LeadCreated);

    let res = reqwest::Client::new()
        .post(format!("{}/payments/webhook", srv.base_url))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_json");

    let res = srv.webhook(None, json!({"bookingId": lead.to_string()})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "event_id_missing");

    let res = srv.webhook(None, json!({"eventId": "evt-1"})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "booking_id_required");

    let res = srv
        .webhook(Some("paypal"), json!({"eventId": "evt-1", "bookingId": lead.to_string()}))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_provider");

    let missing = BookingId::new();
    let res = srv
        .webhook(
            Some("stripe"),
            json!({"eventId": "evt-2", "type": "charge.succeeded", "bookingId": missing.to_string()}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let key = WebhookKey::new("stripe", "evt-2").unwrap();
    let row = srv.stores.webhook_ledger.get(&key).await.unwrap().unwrap();
    assert_eq!(row.status, WebhookEventStatus::Failed);

    let res = srv
        .webhook(
            None,
            json!({"eventId": "evt-3", "eventType": "payment.captured", "bookingId": lead.to_string()}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(res).await, "invalid_transition");

    srv.stores
        .webhook_ledger
        .set_availability(LedgerAvailability::Unavailable);
    let res = srv
        .webhook(
            None,
            json!({"eventId": "evt-4", "eventType": "payment.captured", "bookingId": lead.to_string()}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn informational_webhook_is_ignored() {
    let srv = TestServer::spawn().await;
    let id = srv.seed_booking(BookingLifecycleStatus::PaymentPending);

    let res = srv
        .webhook(
            Some("manual"),
            json!({"eventId": "evt-77", "event": "payment.authorized", "bookingId": id.to_string()}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert_eq!(receipt["changed"], json!(false));

    let key = WebhookKey::new("manual", "evt-77").unwrap();
    let row = srv.stores.webhook_ledger.get(&key).await.unwrap().unwrap();
    assert_eq!(row.status, WebhookEventStatus::Ignored);
}
