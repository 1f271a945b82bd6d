//! Domain events and the envelope they are journaled in.

pub mod envelope;
pub mod event;
pub mod projection;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use projection::Projection;
