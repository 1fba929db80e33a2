//! Document generation boundary.
//!
//! The automation handlers ask a [`DocumentGenerator`] for invoices, vouchers and
//! itineraries. Rendering is out of scope here: adapters create the document record
//! (kind, status, per-booking version) and leave the artifact itself to a renderer.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use travelos_booking::{Document, DocumentKind, GenerateDocument};

pub use in_memory::InMemoryDocumentGenerator;
pub use postgres::PostgresDocumentGenerator;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to generate {kind}: {reason}")]
    Generation { kind: DocumentKind, reason: String },

    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(
        &self,
        kind: DocumentKind,
        request: GenerateDocument,
    ) -> Result<Document, DocumentError>;
}

#[async_trait]
impl<G> DocumentGenerator for Arc<G>
where
    G: DocumentGenerator + ?Sized,
{
    async fn generate(
        &self,
        kind: DocumentKind,
        request: GenerateDocument,
    ) -> Result<Document, DocumentError> {
        (**self).generate(kind, request).await
    }
}
