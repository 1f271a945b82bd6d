//! Infrastructure layer: config, clock, stores, marketplace port, journal,
//! application services and the daily scheduler.

pub mod alerts;
pub mod clock;
pub mod config;
pub mod journal;
pub mod marketplace;
pub mod scheduler;
pub mod services;
pub mod store;

pub use services::{Engine, EngineDeps, EngineError, EngineResult, EngineSettings};
