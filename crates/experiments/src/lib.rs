//! Experiment lifecycle domain module (event-sourced).
//!
//! An experiment instruments a change that has already been applied on the
//! marketplace (a price, a content field, or an ad campaign setting), keeps the
//! baseline it is judged against, and records the human decision at the end.
//!
//! Lifecycle: `active → reviewing → {completed | rolled_back}`; `active` may be
//! completed or rolled back directly. Only one open experiment may exist per
//! [`SlotKey`].

pub mod experiment;
pub mod subject;

pub use experiment::{
    CompleteExperiment, Experiment, ExperimentCommand, ExperimentCompleted, ExperimentEvent,
    ExperimentReviewed, ExperimentRolledBack, ExperimentStarted, ExperimentStatus, RecordReview,
    RollBackExperiment, StartExperiment,
};
pub use subject::{AdAction, ContentField, ExperimentSubject, SlotKey};
