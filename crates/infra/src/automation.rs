//! Post-transition automation.
//!
//! Subscribers on the booking bus that turn committed transitions into documents
//! and notification signals. Every failure is logged and swallowed here: a handler
//! always returns `Ok`, so one broken automation never blocks the others or the
//! transition caller.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info};

use travelos_booking::{
    BookingEventBus, BookingEventName, BookingLifecycleChanged, DocumentKind, GenerateDocument,
    Metadata,
};
use travelos_events::handler_fn;

use crate::documents::DocumentGenerator;
use crate::notifications::{Notification, NotificationKind, Notifier};

/// Register the automation handlers on `bus`.
///
/// Idempotent per bus: returns `false` (and registers nothing) if handlers were
/// already installed.
pub fn register_automation_handlers(
    bus: &BookingEventBus,
    documents: Arc<dyn DocumentGenerator>,
    notifier: Arc<dyn Notifier>,
) -> bool {
    bus.initialize_once(|bus| {
        let generator = documents.clone();
        bus.on(
            BookingEventName::PaymentConfirmed,
            handler_fn(move |payload: Arc<BookingLifecycleChanged>| {
                let generator = generator.clone();
                async move {
                    on_payment_confirmed(generator.as_ref(), &payload).await;
                    Ok(())
                }
            }),
        );

        let generator = documents.clone();
        bus.on(
            BookingEventName::SupplierConfirmed,
            handler_fn(move |payload: Arc<BookingLifecycleChanged>| {
                let generator = generator.clone();
                async move {
                    on_supplier_confirmed(generator.as_ref(), &payload).await;
                    Ok(())
                }
            }),
        );

        bus.on(
            BookingEventName::Completed,
            handler_fn(move |payload: Arc<BookingLifecycleChanged>| {
                let notifier = notifier.clone();
                async move {
                    on_completed(notifier.as_ref(), &payload).await;
                    Ok(())
                }
            }),
        );

        info!("booking automation handlers registered");
    })
}

fn request(payload: &BookingLifecycleChanged, body: serde_json::Value) -> GenerateDocument {
    GenerateDocument {
        booking_id: payload.booking.id,
        customer_id: Some(payload.booking.customer_id),
        generated_by: payload.event.actor_id.clone(),
        payload: match body {
            serde_json::Value::Object(map) => map,
            _ => Metadata::new(),
        },
    }
}

async fn on_payment_confirmed(generator: &dyn DocumentGenerator, payload: &BookingLifecycleChanged) {
    let booking = &payload.booking;
    let body = json!({
        "bookingCode": booking.booking_code,
        "amount": booking.gross_amount,
        "currency": booking.currency_code,
    });

    match generator
        .generate(DocumentKind::Invoice, request(payload, body))
        .await
    {
        Ok(invoice) => info!(
            booking_id = %booking.id,
            document_id = %invoice.id,
            version = invoice.version,
            "invoice generated after payment confirmation"
        ),
        Err(err) => error!(
            booking_id = %booking.id,
            error = %err,
            "failed to generate invoice after payment confirmation"
        ),
    }
}

/// Voucher first, then itinerary. The itinerary is attempted even if the voucher failed;
/// either document can be regenerated on its own.
async fn on_supplier_confirmed(
    generator: &dyn DocumentGenerator,
    payload: &BookingLifecycleChanged,
) {
    let booking = &payload.booking;
    let voucher = generator
        .generate(
            DocumentKind::Voucher,
            request(
                payload,
                json!({
                    "bookingCode": booking.booking_code,
                    "supplierReference": booking.supplier_confirmation_reference,
                }),
            ),
        )
        .await;
    let itinerary = generator
        .generate(
            DocumentKind::Itinerary,
            request(
                payload,
                json!({
                    "bookingCode": booking.booking_code,
                    "travelStartDate": booking.travel_start_date,
                    "travelEndDate": booking.travel_end_date,
                }),
            ),
        )
        .await;

    match (voucher, itinerary) {
        (Ok(voucher), Ok(itinerary)) => info!(
            booking_id = %booking.id,
            voucher_id = %voucher.id,
            itinerary_id = %itinerary.id,
            "voucher and itinerary generated after supplier confirmation"
        ),
        (voucher, itinerary) => {
            for (kind, result) in [
                (DocumentKind::Voucher, voucher),
                (DocumentKind::Itinerary, itinerary),
            ] {
                if let Err(err) = result {
                    error!(
                        booking_id = %booking.id,
                        kind = %kind,
                        error = %err,
                        "failed to generate supplier confirmation document"
                    );
                }
            }
        }
    }
}

async fn on_completed(notifier: &dyn Notifier, payload: &BookingLifecycleChanged) {
    let booking = &payload.booking;
    let notification = Notification {
        kind: NotificationKind::SendCompletionEmail,
        booking_id: booking.id,
        booking_code: booking.booking_code.clone(),
        customer_id: booking.customer_id,
        status: payload.next_status,
    };

    match notifier.notify(notification).await {
        Ok(()) => info!(
            booking_id = %booking.id,
            customer_id = %booking.customer_id,
            event = NotificationKind::SendCompletionEmail.as_str(),
            "booking completed, customer communication event emitted"
        ),
        Err(err) => error!(
            booking_id = %booking.id,
            error = %err,
            "failed to emit completion notification"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::InMemoryDocumentGenerator;
    use crate::notifications::RecordingNotifier;

    #[test]
    fn registration_is_idempotent() {
        let bus = BookingEventBus::new();
        let documents = Arc::new(InMemoryDocumentGenerator::new());
        let notifier = Arc::new(RecordingNotifier::new());

        assert!(register_automation_handlers(
            &bus,
            documents.clone(),
            notifier.clone()
        ));
        assert!(!register_automation_handlers(&bus, documents, notifier));

        for name in [
            BookingEventName::PaymentConfirmed,
            BookingEventName::SupplierConfirmed,
            BookingEventName::Completed,
        ] {
            assert_eq!(bus.handler_count(name), 1, "{name:?}");
        }
        assert_eq!(bus.handler_count(BookingEventName::LifecycleChanged), 0);
    }
}
