//! Price recommendation domain module (event-sourced).
//!
//! A recommendation is proposed by the scorer, decided by a human (or an
//! assistant acting for one) and then either applied on the marketplace or
//! marked failed. Pure domain logic: no IO, no HTTP, no storage.

pub mod recommendation;

pub use recommendation::{
    ApproveRecommendation, MarkApplied, MarkFailed, PriceRecommendation, ProposeRecommendation,
    RecommendationApplied, RecommendationApproved, RecommendationCommand, RecommendationEvent,
    RecommendationFailed, RecommendationProposed, RecommendationRejected, RecommendationStatus,
    RejectRecommendation,
};
