use core::str::FromStr;

use serde::{Deserialize, Serialize};

use travelos_core::DomainError;

/// Booking lifecycle status.
///
/// The allowed moves between states form a fixed graph (see
/// [`BookingLifecycleStatus::allowed_transitions`]). `completed` and `cancelled`
/// are terminal except for a move to `refunded`; `refunded` has no way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingLifecycleStatus {
    LeadCreated,
    QuotationSent,
    QuotationApproved,
    BookingCreated,
    PaymentPending,
    PaymentConfirmed,
    SupplierConfirmed,
    DocumentsGenerated,
    Completed,
    Cancelled,
    Refunded,
}

use BookingLifecycleStatus::*;

impl BookingLifecycleStatus {
    pub const ALL: [BookingLifecycleStatus; 11] = [
        LeadCreated,
        QuotationSent,
        QuotationApproved,
        BookingCreated,
        PaymentPending,
        PaymentConfirmed,
        SupplierConfirmed,
        DocumentsGenerated,
        Completed,
        Cancelled,
        Refunded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LeadCreated => "lead_created",
            QuotationSent => "quotation_sent",
            QuotationApproved => "quotation_approved",
            BookingCreated => "booking_created",
            PaymentPending => "payment_pending",
            PaymentConfirmed => "payment_confirmed",
            SupplierConfirmed => "supplier_confirmed",
            DocumentsGenerated => "documents_generated",
            Completed => "completed",
            Cancelled => "cancelled",
            Refunded => "refunded",
        }
    }

    /// Outgoing edges of the transition graph.
    pub fn allowed_transitions(self) -> &'static [BookingLifecycleStatus] {
        match self {
            LeadCreated => &[QuotationSent, Cancelled],
            QuotationSent => &[QuotationApproved, Cancelled],
            QuotationApproved => &[BookingCreated, Cancelled],
            BookingCreated => &[PaymentPending, Cancelled],
            PaymentPending => &[PaymentConfirmed, Cancelled, Refunded],
            PaymentConfirmed => &[SupplierConfirmed, Cancelled, Refunded],
            SupplierConfirmed => &[DocumentsGenerated, Cancelled, Refunded],
            DocumentsGenerated => &[Completed, Cancelled, Refunded],
            Completed => &[Refunded],
            Cancelled => &[Refunded],
            Refunded => &[],
        }
    }

    /// Whether `next` is an edge out of `self`. A self-transition is not an edge.
    pub fn can_transition_to(self, next: BookingLifecycleStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Completed | Cancelled | Refunded)
    }

    /// Name recorded on the lifecycle event entering this status (`booking.<status>`).
    pub fn event_name(self) -> String {
        format!("booking.{}", self.as_str())
    }
}

impl core::fmt::Display for BookingLifecycleStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingLifecycleStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::unknown_variant("lifecycle status", s))
    }
}

/// Who initiated a transition. Recorded for audit only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    System,
    Customer,
    Admin,
    Supplier,
    Webhook,
}

impl ActorType {
    pub const ALL: [ActorType; 5] = [
        ActorType::System,
        ActorType::Customer,
        ActorType::Admin,
        ActorType::Supplier,
        ActorType::Webhook,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActorType::System => "system",
            ActorType::Customer => "customer",
            ActorType::Admin => "admin",
            ActorType::Supplier => "supplier",
            ActorType::Webhook => "webhook",
        }
    }
}

impl core::fmt::Display for ActorType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|actor| actor.as_str() == s)
            .ok_or_else(|| DomainError::unknown_variant("actor type", s))
    }
}
