use crate::{Event, EventEnvelope};

/// A projection builds a read model from the append-only journal.
///
/// Projections must be idempotent: the same envelope may be delivered more than
/// once (e.g. when a read model is rebuilt by replaying the journal), so
/// implementations track the last sequence number they saw per stream.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);

    /// Replay a batch of envelopes in order.
    fn replay<'a, I>(&mut self, envelopes: I)
    where
        I: IntoIterator<Item = &'a EventEnvelope<Self::Ev>>,
        Self::Ev: 'a,
    {
        for envelope in envelopes {
            self.apply(envelope);
        }
    }
}
