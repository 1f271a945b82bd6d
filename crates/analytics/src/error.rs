use thiserror::Error;

/// Rejected analytics configuration.
///
/// Analyses themselves never fail: missing data yields an explicit
/// "insufficient data" value instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

impl AnalyticsError {
    pub fn invalid_policy(msg: impl Into<String>) -> Self {
        Self::InvalidPolicy(msg.into())
    }
}
