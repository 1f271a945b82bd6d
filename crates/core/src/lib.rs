//! `pricepilot-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the pricing and
//! experiment crates (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CampaignId, ChangeId, ExperimentId, ProductId, RecommendationId};
pub use money::{Money, Percent};
pub use value_object::ValueObject;
