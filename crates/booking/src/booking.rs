use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use travelos_core::{BookingId, CustomerId, DomainError, DomainResult};

use crate::status::BookingLifecycleStatus;

/// Free-form key/value metadata attached to bookings and lifecycle events.
pub type Metadata = Map<String, JsonValue>;

/// Shallow-merge `patch` over `existing`. Keys in `patch` win.
pub fn merge_metadata(existing: &Metadata, patch: &Metadata) -> Metadata {
    let mut merged = existing.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Booking aggregate state.
///
/// Amounts are in the smallest currency unit (e.g. paise, cents).
///
/// `lifecycle_status`, `completed_at` and `cancelled_at` only change through
/// [`Booking::apply_transition`], which keeps the timestamp invariants:
/// `completed_at` is set iff the status is `completed`, `cancelled_at` iff `cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub booking_code: String,
    pub customer_id: CustomerId,
    pub currency_code: String,
    pub gross_amount: i64,
    pub net_amount: i64,
    pub paid_amount: i64,
    pub due_amount: i64,
    pub refund_amount: i64,
    pub travel_start_date: Option<NaiveDate>,
    pub travel_end_date: Option<NaiveDate>,
    pub supplier_confirmation_reference: Option<String>,
    pub lifecycle_status: BookingLifecycleStatus,
    pub metadata: Metadata,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// A fresh booking at `lead_created` with zero amounts.
    pub fn new(
        id: BookingId,
        booking_code: impl Into<String>,
        customer_id: CustomerId,
        currency_code: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            booking_code: booking_code.into(),
            customer_id,
            currency_code: currency_code.into(),
            gross_amount: 0,
            net_amount: 0,
            paid_amount: 0,
            due_amount: 0,
            refund_amount: 0,
            travel_start_date: None,
            travel_end_date: None,
            supplier_confirmation_reference: None,
            lifecycle_status: BookingLifecycleStatus::LeadCreated,
            metadata: Metadata::new(),
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Place the booking directly at `status` (imports, fixtures), stamping
    /// timestamps so the invariants hold. Does not consult the transition graph.
    pub fn at_status(mut self, status: BookingLifecycleStatus, at: DateTime<Utc>) -> Self {
        self.set_status(status, at);
        self
    }

    /// Move to `next` with an already-merged metadata map.
    ///
    /// `cancellation_reason` is only recorded when `next` is cancelled; a `None`
    /// keeps whatever reason is already stored. Graph validation is the lifecycle
    /// engine's job; this only applies state.
    pub fn apply_transition(
        &mut self,
        next: BookingLifecycleStatus,
        metadata: Metadata,
        cancellation_reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        if next == BookingLifecycleStatus::Cancelled && cancellation_reason.is_some() {
            self.cancellation_reason = cancellation_reason;
        }
        self.set_status(next, at);
        self.metadata = metadata;
    }

    fn set_status(&mut self, status: BookingLifecycleStatus, at: DateTime<Utc>) {
        self.completed_at = match status {
            BookingLifecycleStatus::Completed => self.completed_at.or(Some(at)),
            _ => None,
        };
        self.cancelled_at = match status {
            BookingLifecycleStatus::Cancelled => self.cancelled_at.or(Some(at)),
            _ => None,
        };
        self.lifecycle_status = status;
        self.updated_at = at;
    }

    /// Verify the timestamp invariants.
    pub fn check_invariants(&self) -> DomainResult<()> {
        let completed = self.lifecycle_status == BookingLifecycleStatus::Completed;
        if completed != self.completed_at.is_some() {
            return Err(DomainError::validation(format!(
                "booking {}: completed_at must be set iff status is completed (status: {})",
                self.id, self.lifecycle_status
            )));
        }
        let cancelled = self.lifecycle_status == BookingLifecycleStatus::Cancelled;
        if cancelled != self.cancelled_at.is_some() {
            return Err(DomainError::validation(format!(
                "booking {}: cancelled_at must be set iff status is cancelled (status: {})",
                self.id, self.lifecycle_status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn booking() -> Booking {
        Booking::new(
            BookingId::new(),
            "TOS-1001",
            CustomerId::new(),
            "INR",
            Utc::now(),
        )
    }

    fn meta(value: JsonValue) -> Metadata {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn new_booking_starts_as_lead_and_satisfies_invariants() {
        let b = booking();
        assert_eq!(b.lifecycle_status, BookingLifecycleStatus::LeadCreated);
        b.check_invariants().unwrap();
    }

    #[test]
    fn merge_prefers_patch_values() {
        let merged = merge_metadata(
            &meta(json!({"a": 1, "b": 2})),
            &meta(json!({"b": 3, "c": 4})),
        );
        assert_eq!(JsonValue::Object(merged), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn merge_is_shallow() {
        let merged = merge_metadata(
            &meta(json!({"nested": {"x": 1, "y": 2}})),
            &meta(json!({"nested": {"x": 9}})),
        );
        assert_eq!(JsonValue::Object(merged), json!({"nested": {"x": 9}}));
    }

    #[test]
    fn completing_stamps_completed_at() {
        let mut b = booking().at_status(BookingLifecycleStatus::DocumentsGenerated, Utc::now());
        let at = Utc::now();
        b.apply_transition(BookingLifecycleStatus::Completed, Metadata::new(), None, at);
        assert_eq!(b.completed_at, Some(at));
        assert_eq!(b.updated_at, at);
        b.check_invariants().unwrap();
    }

    #[test]
    fn refunding_a_completed_booking_clears_completed_at() {
        let mut b = booking().at_status(BookingLifecycleStatus::Completed, Utc::now());
        b.apply_transition(BookingLifecycleStatus::Refunded, Metadata::new(), None, Utc::now());
        assert!(b.completed_at.is_none());
        b.check_invariants().unwrap();
    }

    #[test]
    fn cancelling_records_the_reason() {
        let mut b = booking().at_status(BookingLifecycleStatus::PaymentPending, Utc::now());
        b.apply_transition(
            BookingLifecycleStatus::Cancelled,
            Metadata::new(),
            Some("Customer changed plans".to_string()),
            Utc::now(),
        );
        assert_eq!(b.cancellation_reason.as_deref(), Some("Customer changed plans"));
        assert!(b.cancelled_at.is_some());

        // Only a cancellation writes the reason.
        let mut other = booking();
        other.apply_transition(
            BookingLifecycleStatus::QuotationSent,
            Metadata::new(),
            Some("ignored".to_string()),
            Utc::now(),
        );
        assert!(other.cancellation_reason.is_none());
    }

    #[test]
    fn invariant_violation_is_reported() {
        let mut b = booking();
        b.cancelled_at = Some(Utc::now());
        assert!(b.check_invariants().is_err());
    }

    proptest! {
        #[test]
        fn invariants_hold_after_any_sequence_of_statuses(
            steps in proptest::collection::vec(
                proptest::sample::select(BookingLifecycleStatus::ALL.to_vec()),
                0..20,
            )
        ) {
            let mut b = booking();
            for status in steps {
                b.apply_transition(status, Metadata::new(), None, Utc::now());
                prop_assert!(b.check_invariants().is_ok());
            }
        }

        #[test]
        fn merged_metadata_contains_every_patch_key(
            existing in proptest::collection::btree_map("[a-d]", 0i64..10, 0..4),
            patch in proptest::collection::btree_map("[a-d]", 0i64..10, 0..4),
        ) {
            let to_meta = |m: &std::collections::BTreeMap<String, i64>| -> Metadata {
                m.iter().map(|(k, v)| (k.clone(), json!(v))).collect()
            };
            let merged = merge_metadata(&to_meta(&existing), &to_meta(&patch));
            for (k, v) in &patch {
                prop_assert_eq!(merged.get(k), Some(&json!(v)));
            }
            for (k, v) in &existing {
                if !patch.contains_key(k) {
                    prop_assert_eq!(merged.get(k), Some(&json!(v)));
                }
            }
        }
    }
}
