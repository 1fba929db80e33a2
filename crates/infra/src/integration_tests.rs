//! Integration tests for the full booking lifecycle pipeline.
//!
//! Tests: Transition → Repository → EventBus → Automation → Documents/Notifications
//!
//! Verifies:
//! - Payment confirmation generates exactly one invoice
//! - Invalid transitions leave stored state untouched
//! - Supplier confirmation attempts both documents even when one fails
//! - Concurrent duplicate webhook deliveries mutate the booking once and record one payment
//! - A full happy path keeps the timestamp invariants and the event log consistent

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use travelos_booking::{
        ActorType, Booking, BookingEventBus, BookingLifecycleStatus, DocumentKind,
        PaymentProvider, WebhookKey,
    };
    use travelos_core::{BookingId, CustomerId};

    use crate::automation::register_automation_handlers;
    use crate::documents::InMemoryDocumentGenerator;
    use crate::lifecycle_engine::{LifecycleEngine, LifecycleError, TransitionRequest};
    use crate::notifications::{NotificationKind, RecordingNotifier};
    use crate::payment_webhook::PaymentWebhookProcessor;
    use crate::payments::{InMemoryPaymentsRepository, PaymentsRepository};
    use crate::repository::{BookingRepository, InMemoryBookingRepository};
    use crate::webhook_ledger::{InMemoryWebhookLedger, WebhookLedger};

    struct Harness {
        repo: Arc<InMemoryBookingRepository>,
        engine: Arc<LifecycleEngine<Arc<InMemoryBookingRepository>>>,
        documents: Arc<InMemoryDocumentGenerator>,
        notifier: Arc<RecordingNotifier>,
    }

    fn setup() -> Harness {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let bus = Arc::new(BookingEventBus::new());
        let documents = Arc::new(InMemoryDocumentGenerator::new());
        let notifier = Arc::new(RecordingNotifier::new());
        register_automation_handlers(&bus, documents.clone(), notifier.clone());

        Harness {
            engine: Arc::new(LifecycleEngine::new(repo.clone(), bus)),
            repo,
            documents,
            notifier,
        }
    }

    fn seed(h: &Harness, status: BookingLifecycleStatus) -> BookingId {
        let mut booking = Booking::new(
            BookingId::new(),
            "TOS-2024-0001",
            CustomerId::new(),
            "INR",
            Utc::now(),
        )
        .at_status(status, Utc::now());
        booking.gross_amount = 12_500_000;
        booking.supplier_confirmation_reference = Some("SUP-88".to_string());
        let id = booking.id;
        h.repo.insert_booking(booking).unwrap();
        id
    }

    async fn stored_status(h: &Harness, id: BookingId) -> BookingLifecycleStatus {
        h.repo
            .get_booking_by_id(id)
            .await
            .unwrap()
            .unwrap()
            .lifecycle_status
    }

    #[tokio::test]
    async fn payment_confirmation_generates_one_invoice() {
        let h = setup();
        let id = seed(&h, BookingLifecycleStatus::PaymentPending);

        let outcome = h
            .engine
            .transition(
                TransitionRequest::new(
                    id,
                    BookingLifecycleStatus::PaymentConfirmed,
                    ActorType::Webhook,
                )
                .with_idempotency_key("evt-123"),
            )
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(stored_status(&h, id).await, BookingLifecycleStatus::PaymentConfirmed);

        let events = h.repo.list_lifecycle_events(id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].from_status, Some(BookingLifecycleStatus::PaymentPending));
        assert_eq!(events[0].to_status, BookingLifecycleStatus::PaymentConfirmed);

        assert_eq!(h.documents.attempt_count(DocumentKind::Invoice), 1);
        let invoice = &h.documents.documents_for(id)[0];
        assert_eq!(invoice.kind, DocumentKind::Invoice);
        assert_eq!(invoice.metadata.get("amount"), Some(&json!(12_500_000)));

        // Retrying the same delivery does not generate a second invoice.
        let replay = h
            .engine
            .transition(
                TransitionRequest::new(
                    id,
                    BookingLifecycleStatus::PaymentConfirmed,
                    ActorType::Webhook,
                )
                .with_idempotency_key("evt-123"),
            )
            .await
            .unwrap();
        assert!(!replay.changed);
        assert_eq!(h.documents.attempt_count(DocumentKind::Invoice), 1);
    }

    #[tokio::test]
    async fn completed_booking_cannot_return_to_lead() {
        let h = setup();
        let id = seed(&h, BookingLifecycleStatus::Completed);

        let err = h
            .engine
            .transition(TransitionRequest::new(
                id,
                BookingLifecycleStatus::LeadCreated,
                ActorType::Admin,
            ))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: BookingLifecycleStatus::Completed,
                to: BookingLifecycleStatus::LeadCreated,
            }
        ));
        assert_eq!(stored_status(&h, id).await, BookingLifecycleStatus::Completed);
        assert!(h.repo.list_lifecycle_events(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn supplier_documents_are_both_attempted_when_voucher_fails() {
        let h = setup();
        h.documents.fail_on(DocumentKind::Voucher);
        let id = seed(&h, BookingLifecycleStatus::PaymentConfirmed);

        let outcome = h
            .engine
            .transition(TransitionRequest::new(
                id,
                BookingLifecycleStatus::SupplierConfirmed,
                ActorType::Supplier,
            ))
            .await
            .unwrap();
        assert!(outcome.changed);

        assert_eq!(
            h.documents.attempts(),
            vec![(id, DocumentKind::Voucher), (id, DocumentKind::Itinerary)]
        );
        let generated = h.documents.documents_for(id);
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].kind, DocumentKind::Itinerary);

        // The failed voucher did not block the next admin step.
        let next = h
            .engine
            .transition(TransitionRequest::new(
                id,
                BookingLifecycleStatus::DocumentsGenerated,
                ActorType::Admin,
            ))
            .await
            .unwrap();
        assert_eq!(next.booking.lifecycle_status, BookingLifecycleStatus::DocumentsGenerated);
    }

    #[tokio::test]
    async fn supplier_documents_fire_on_entering_supplier_confirmed_only() {
        let h = setup();
        let id = seed(&h, BookingLifecycleStatus::SupplierConfirmed);

        // Seeded past the supplier step: moving on to documents_generated
        // publishes no supplier event, so nothing is generated.
        let outcome = h
            .engine
            .transition(TransitionRequest::new(
                id,
                BookingLifecycleStatus::DocumentsGenerated,
                ActorType::Admin,
            ))
            .await
            .unwrap();

        assert!(outcome.changed);
        assert!(h.documents.attempts().is_empty());
    }

    #[tokio::test]
    async fn concurrent_duplicate_webhooks_mutate_once() {
        let h = setup();
        let id = seed(&h, BookingLifecycleStatus::PaymentPending);
        let payments = Arc::new(InMemoryPaymentsRepository::new());
        let ledger = Arc::new(InMemoryWebhookLedger::new());
        let processor = Arc::new(PaymentWebhookProcessor::new(
            h.engine.clone(),
            ledger.clone(),
            payments.clone(),
        ));
        let payload = json!({
            "eventId": "evt-999",
            "eventType": "payment.captured",
            "bookingId": id.to_string(),
            "providerPaymentId": "pay_999",
            "amount": 12_500_000,
        });

        let deliveries: Vec<_> = (0..2)
            .map(|_| {
                let processor = processor.clone();
                let payload = payload.clone();
                tokio::spawn(async move {
                    processor.process(PaymentProvider::Razorpay, payload).await
                })
            })
            .collect();

        let mut receipts = Vec::new();
        for delivery in deliveries {
            receipts.push(delivery.await.unwrap().unwrap());
        }

        assert_eq!(receipts.iter().filter(|r| r.duplicate).count(), 1);
        assert_eq!(receipts.iter().filter(|r| r.changed).count(), 1);
        assert_eq!(h.repo.list_lifecycle_events(id).await.unwrap().len(), 1);
        assert_eq!(h.documents.attempt_count(DocumentKind::Invoice), 1);
        assert_eq!(stored_status(&h, id).await, BookingLifecycleStatus::PaymentConfirmed);

        let recorded = payments.list_payments(id).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].provider_payment_id.as_deref(), Some("pay_999"));
        let key = WebhookKey::new("razorpay", "evt-999").unwrap();
        let row = ledger.get(&key).await.unwrap().unwrap();
        assert_eq!(row.payment_id, Some(recorded[0].id));
    }

    #[tokio::test]
    async fn full_journey_keeps_invariants_and_notifies_on_completion() {
        let h = setup();
        let id = seed(&h, BookingLifecycleStatus::LeadCreated);

        let journey = [
            BookingLifecycleStatus::QuotationSent,
            BookingLifecycleStatus::QuotationApproved,
            BookingLifecycleStatus::BookingCreated,
            BookingLifecycleStatus::PaymentPending,
            BookingLifecycleStatus::PaymentConfirmed,
            BookingLifecycleStatus::SupplierConfirmed,
            BookingLifecycleStatus::DocumentsGenerated,
            BookingLifecycleStatus::Completed,
            BookingLifecycleStatus::Refunded,
        ];
        for status in journey {
            let outcome = h
                .engine
                .transition(TransitionRequest::new(id, status, ActorType::Admin))
                .await
                .unwrap();
            assert!(outcome.changed);
            outcome.booking.check_invariants().unwrap();
        }

        let events = h.repo.list_lifecycle_events(id).await.unwrap();
        assert_eq!(events.len(), journey.len());
        for pair in events.windows(2) {
            assert_eq!(pair[1].from_status, Some(pair[0].to_status));
        }

        let booking = h.repo.get_booking_by_id(id).await.unwrap().unwrap();
        assert_eq!(booking.lifecycle_status, BookingLifecycleStatus::Refunded);
        assert!(booking.completed_at.is_none());

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::SendCompletionEmail);
        assert_eq!(sent[0].booking_id, id);

        let kinds: Vec<_> = h.documents.attempts().into_iter().map(|(_, k)| k).collect();
        assert_eq!(
            kinds,
            vec![DocumentKind::Invoice, DocumentKind::Voucher, DocumentKind::Itinerary]
        );
    }

    #[tokio::test]
    async fn refunded_is_terminal() {
        let h = setup();
        let id = seed(&h, BookingLifecycleStatus::Refunded);

        for status in BookingLifecycleStatus::ALL {
            let result = h
                .engine
                .transition(TransitionRequest::new(id, status, ActorType::System))
                .await;
            if status == BookingLifecycleStatus::Refunded {
                assert!(!result.unwrap().changed);
            } else {
                assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));
            }
        }
        assert_eq!(stored_status(&h, id).await, BookingLifecycleStatus::Refunded);
    }
}
