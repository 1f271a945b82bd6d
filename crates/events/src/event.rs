use chrono::{DateTime, Utc};

/// A domain event emitted by a recommendation or experiment aggregate.
///
/// Events are immutable facts, versioned for schema evolution and only ever
/// appended to the journal.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "pricing.recommendation.applied").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
