//! Operator-facing alerts.
//!
//! Alerts are notifications, not domain events: they are never replayed and a
//! failing sink must not affect the job that raised them.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pricepilot_core::{ExperimentId, ProductId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    RecommendationsReady,
    ApplyFailed,
    ExperimentDue,
    ExperimentStuck,
    LowStock,
    Overstock,
    SalesAnomaly,
    JobFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub product_id: Option<ProductId>,
    pub experiment_id: Option<ExperimentId>,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(kind: AlertKind, severity: Severity, message: impl Into<String>, raised_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            product_id: None,
            experiment_id: None,
            raised_at,
        }
    }

    pub fn for_product(mut self, id: ProductId) -> Self {
        self.product_id = Some(id);
        self
    }

    pub fn for_experiment(mut self, id: ExperimentId) -> Self {
        self.experiment_id = Some(id);
        self
    }
}

pub trait AlertSink: Send + Sync + 'static {
    fn emit(&self, alert: Alert);
}

/// Writes alerts to the log.
#[derive(Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: Alert) {
        let product_id = alert.product_id.map(|p| p.get());
        let experiment_id = alert.experiment_id.map(|e| e.to_string());
        match alert.severity {
            Severity::Critical | Severity::Warning => tracing::warn!(
                kind = ?alert.kind,
                severity = ?alert.severity,
                product_id,
                experiment_id,
                "{}",
                alert.message
            ),
            Severity::Info => tracing::info!(
                kind = ?alert.kind,
                product_id,
                experiment_id,
                "{}",
                alert.message
            ),
        }
    }
}

/// Keeps alerts in memory, newest last.
#[derive(Debug, Default)]
pub struct InMemoryAlertSink {
    inner: Mutex<Vec<Alert>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Alert> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn of_kind(&self, kind: AlertKind) -> Vec<Alert> {
        self.all().into_iter().filter(|a| a.kind == kind).collect()
    }
}

impl AlertSink for InMemoryAlertSink {
    fn emit(&self, alert: Alert) {
        if let Ok(mut v) = self.inner.lock() {
            v.push(alert);
        }
    }
}

/// Forwards every alert to each inner sink.
pub struct FanoutAlertSink {
    sinks: Vec<std::sync::Arc<dyn AlertSink>>,
}

impl FanoutAlertSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }
}

impl AlertSink for FanoutAlertSink {
    fn emit(&self, alert: Alert) {
        for sink in &self.sinks {
            sink.emit(alert.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(InMemoryAlertSink::new());
        let b = Arc::new(InMemoryAlertSink::new());
        let fan = FanoutAlertSink::new(vec![a.clone(), b.clone(), Arc::new(TracingAlertSink)]);
        fan.emit(Alert::new(AlertKind::LowStock, Severity::Critical, "2 days left", Utc::now()).for_product(ProductId::new(3)));
        assert_eq!(a.of_kind(AlertKind::LowStock).len(), 1);
        assert_eq!(b.all()[0].product_id, Some(ProductId::new(3)));
    }
}
