use std::sync::Arc;

use pricepilot_infra::alerts::{AlertSink, FanoutAlertSink, InMemoryAlertSink, TracingAlertSink};
use pricepilot_infra::clock::Clock;
use pricepilot_infra::config::AppConfig;
use pricepilot_infra::journal::InMemoryJournal;
use pricepilot_infra::marketplace::Marketplace;
use pricepilot_infra::scheduler::JobTrigger;
use pricepilot_infra::store::{InMemoryCatalogStore, InMemoryExperimentStore, InMemoryRecommendationStore};
use pricepilot_infra::{Engine, EngineDeps, EngineSettings};

/// Everything a handler can reach.
#[derive(Clone)]
pub struct AppServices {
    pub engine: Arc<Engine>,
    /// Alerts raised since start, newest last. Every alert is also logged.
    pub alerts: Arc<InMemoryAlertSink>,
    /// Manual job triggers; empty until a scheduler is attached.
    pub jobs: JobTrigger,
}

impl AppServices {
    /// Wire an engine over in-memory stores and journal.
    pub fn in_memory(cfg: &AppConfig, clock: Arc<dyn Clock>, marketplace: Arc<dyn Marketplace>) -> Self {
        let alerts = Arc::new(InMemoryAlertSink::new());
        let sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(TracingAlertSink), alerts.clone()];

        let deps = EngineDeps {
            catalog: Arc::new(InMemoryCatalogStore::new()),
            recommendations: Arc::new(InMemoryRecommendationStore::new()),
            experiments: Arc::new(InMemoryExperimentStore::new()),
            marketplace,
            journal: Arc::new(InMemoryJournal::new()),
            alerts: Arc::new(FanoutAlertSink::new(sinks)),
            clock,
        };

        Self {
            engine: Arc::new(Engine::new(deps, EngineSettings::from_config(cfg))),
            alerts,
            jobs: JobTrigger::default(),
        }
    }

    pub fn with_jobs(mut self, jobs: JobTrigger) -> Self {
        self.jobs = jobs;
        self
    }
}
