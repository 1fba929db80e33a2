use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use travelos_core::{BookingId, CustomerId, DocumentId};

use crate::booking::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Voucher,
    Itinerary,
    Ticket,
    Visa,
    Insurance,
    Other,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Voucher => "voucher",
            DocumentKind::Itinerary => "itinerary",
            DocumentKind::Ticket => "ticket",
            DocumentKind::Visa => "visa",
            DocumentKind::Insurance => "insurance",
            DocumentKind::Other => "other",
        }
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Generated,
    Uploaded,
    Failed,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Generated => "generated",
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Archived => "archived",
        }
    }
}

/// Generated artifact tied to a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub booking_id: BookingId,
    pub customer_id: Option<CustomerId>,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    /// Starts at 1 per (booking, kind); regeneration bumps it.
    pub version: u32,
    pub generated_by: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub metadata: Metadata,
}

/// Input to a document generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateDocument {
    pub booking_id: BookingId,
    pub customer_id: Option<CustomerId>,
    pub generated_by: Option<String>,
    pub payload: Metadata,
}
