//! Service wiring: repository, webhook ledger, payments store, document generator,
//! event bus, automation handlers and the lifecycle engine on top of them.
//!
//! `DATABASE_URL` selects Postgres adapters; without it everything runs in memory.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use travelos_booking::{Booking, BookingEventBus, LifecycleEvent, Payment};
use travelos_core::BookingId;
use travelos_infra::{
    automation::register_automation_handlers,
    config::AppConfig,
    documents::{DocumentGenerator, InMemoryDocumentGenerator, PostgresDocumentGenerator},
    lifecycle_engine::LifecycleEngine,
    notifications::TracingNotifier,
    payment_webhook::PaymentWebhookProcessor,
    payments::{InMemoryPaymentsRepository, PaymentsRepository, PostgresPaymentsRepository},
    pg,
    repository::{
        BookingRepository, InMemoryBookingRepository, PostgresBookingRepository,
    },
    webhook_ledger::{InMemoryWebhookLedger, PostgresWebhookLedger, WebhookLedger},
};

pub type SharedRepository = Arc<dyn BookingRepository>;
pub type SharedLedger = Arc<dyn WebhookLedger>;
pub type SharedPayments = Arc<dyn PaymentsRepository>;

/// Direct handles on the in-memory adapters (seeding and inspection in tests/dev).
#[derive(Clone)]
pub struct InMemoryStores {
    pub bookings: Arc<InMemoryBookingRepository>,
    pub webhook_ledger: Arc<InMemoryWebhookLedger>,
    pub payments: Arc<InMemoryPaymentsRepository>,
    pub documents: Arc<InMemoryDocumentGenerator>,
}

pub type WebhookProcessor = PaymentWebhookProcessor<SharedRepository, SharedLedger, SharedPayments>;

pub struct AppServices {
    engine: Arc<LifecycleEngine<SharedRepository>>,
    webhooks: WebhookProcessor,
    in_memory: Option<InMemoryStores>,
}

/// A booking together with its lifecycle history and payments (oldest first).
#[derive(Debug, Clone, serde::Serialize)]
pub struct BookingView {
    pub booking: Booking,
    pub events: Vec<LifecycleEvent>,
    pub payments: Vec<Payment>,
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match config.database_url.as_deref() {
        Some(url) => build_persistent_services(url, config.apply_schema).await,
        None => Ok(AppServices::in_memory()),
    }
}

async fn build_persistent_services(database_url: &str, apply_schema: bool) -> anyhow::Result<AppServices> {
    let pool = pg::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    if apply_schema {
        pg::apply_schema(&pool)
            .await
            .context("failed to apply booking core schema")?;
    }

    info!("using Postgres booking stores");
    Ok(AppServices::assemble(
        Arc::new(PostgresBookingRepository::new(pool.clone())),
        Arc::new(PostgresWebhookLedger::new(pool.clone())),
        Arc::new(PostgresPaymentsRepository::new(pool.clone())),
        Arc::new(PostgresDocumentGenerator::new(pool)),
        None,
    ))
}

impl AppServices {
    /// Fresh in-memory wiring.
    pub fn in_memory() -> Self {
        let stores = InMemoryStores {
            bookings: Arc::new(InMemoryBookingRepository::new()),
            webhook_ledger: Arc::new(InMemoryWebhookLedger::new()),
            payments: Arc::new(InMemoryPaymentsRepository::new()),
            documents: Arc::new(InMemoryDocumentGenerator::new()),
        };

        Self::assemble(
            stores.bookings.clone(),
            stores.webhook_ledger.clone(),
            stores.payments.clone(),
            stores.documents.clone(),
            Some(stores),
        )
    }

    fn assemble(
        repository: SharedRepository,
        ledger: SharedLedger,
        payments: SharedPayments,
        documents: Arc<dyn DocumentGenerator>,
        in_memory: Option<InMemoryStores>,
    ) -> Self {
        let bus = Arc::new(BookingEventBus::new());
        register_automation_handlers(&bus, documents, Arc::new(TracingNotifier));

        let engine = Arc::new(LifecycleEngine::new(repository, bus));
        let webhooks = PaymentWebhookProcessor::new(engine.clone(), ledger, payments);

        Self {
            engine,
            webhooks,
            in_memory,
        }
    }

    pub fn engine(&self) -> &LifecycleEngine<SharedRepository> {
        &self.engine
    }

    pub fn webhooks(&self) -> &WebhookProcessor {
        &self.webhooks
    }

    /// `None` when running on Postgres.
    pub fn in_memory_stores(&self) -> Option<&InMemoryStores> {
        self.in_memory.as_ref()
    }

    pub async fn booking_view(&self, booking_id: BookingId) -> anyhow::Result<Option<BookingView>> {
        let repository = self.engine.repository();
        let Some(booking) = repository.get_booking_by_id(booking_id).await? else {
            return Ok(None);
        };
        let events = repository.list_lifecycle_events(booking_id).await?;
        let payments = self.webhooks.payments().list_payments(booking_id).await?;
        Ok(Some(BookingView {
            booking,
            events,
            payments,
        }))
    }
}
