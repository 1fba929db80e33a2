use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use travelos_booking::{Document, DocumentKind, DocumentStatus, GenerateDocument};
use travelos_core::{BookingId, DocumentId};

use super::{DocumentError, DocumentGenerator};

#[derive(Debug, Default)]
struct State {
    documents: Vec<Document>,
    /// Every `generate` call, including failed ones, in call order.
    attempts: Vec<(BookingId, DocumentKind)>,
    failing: HashSet<DocumentKind>,
}

/// In-memory document generator.
///
/// Intended for tests/dev: records every attempt and can be told to fail for
/// selected kinds.
#[derive(Debug, Default)]
pub struct InMemoryDocumentGenerator {
    state: RwLock<State>,
}

impl InMemoryDocumentGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `generate` for `kind` fail.
    pub fn fail_on(&self, kind: DocumentKind) {
        if let Ok(mut state) = self.state.write() {
            state.failing.insert(kind);
        }
    }

    pub fn attempts(&self) -> Vec<(BookingId, DocumentKind)> {
        self.state
            .read()
            .map(|s| s.attempts.clone())
            .unwrap_or_default()
    }

    pub fn attempt_count(&self, kind: DocumentKind) -> usize {
        self.attempts().iter().filter(|(_, k)| *k == kind).count()
    }

    pub fn documents_for(&self, booking_id: BookingId) -> Vec<Document> {
        self.state
            .read()
            .map(|s| {
                s.documents
                    .iter()
                    .filter(|d| d.booking_id == booking_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentGenerator for InMemoryDocumentGenerator {
    async fn generate(
        &self,
        kind: DocumentKind,
        request: GenerateDocument,
    ) -> Result<Document, DocumentError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DocumentError::Unavailable("lock poisoned".to_string()))?;

        state.attempts.push((request.booking_id, kind));
        if state.failing.contains(&kind) {
            return Err(DocumentError::Generation {
                kind,
                reason: "generator configured to fail".to_string(),
            });
        }

        let previous = state
            .documents
            .iter()
            .filter(|d| d.booking_id == request.booking_id && d.kind == kind)
            .map(|d| d.version)
            .max()
            .unwrap_or(0);

        let document = Document {
            id: DocumentId::new(),
            booking_id: request.booking_id,
            customer_id: request.customer_id,
            kind,
            status: DocumentStatus::Generated,
            version: previous + 1,
            generated_by: request.generated_by,
            generated_at: Utc::now(),
            metadata: request.payload,
        };
        state.documents.push(document.clone());
        Ok(document)
    }
}
