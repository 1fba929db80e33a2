/// A closed set of event names a bus dispatches on.
///
/// Names are:
/// - **stable** (persisted in logs and event rows, e.g. "booking.completed")
/// - **finite** (an enum, so handlers cannot subscribe to a misspelled name)
pub trait EventName: Copy + Eq + core::hash::Hash + core::fmt::Debug + Send + Sync + 'static {
    /// Stable wire/log name.
    fn as_str(&self) -> &'static str;
}
