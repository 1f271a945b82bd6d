//! Daily job scheduler.
//!
//! One tokio task per job. Each task sleeps until the job's next wall-clock
//! time in the configured timezone, runs it, and retries a failed run with
//! exponential backoff. A manual trigger runs the job immediately; triggers
//! are coalesced (at most one pending per job).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::alerts::{Alert, AlertKind, Severity};
use crate::config::{AppConfig, ConfigError, ScheduleConfig};
use crate::services::Engine;

pub mod jobs;

pub use jobs::{JobName, JobReport};

const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// Delay before retry number `failures` (1-based): `base * 2^(failures-1)`, capped at one hour.
pub fn backoff(base: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(failures - 1);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// A wall-clock time of day in a timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAt {
    pub time: NaiveTime,
    pub tz: Tz,
}

impl DailyAt {
    pub fn new(time: NaiveTime, tz: Tz) -> Self {
        Self { time, tz }
    }

    /// Next occurrence strictly after `now`.
    ///
    /// On a DST gap the first valid instant after the local time is used; on an
    /// overlap the earlier one.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = now.with_timezone(&self.tz).date_naive();
        loop {
            let local = date.and_time(self.time);
            let candidate = self
                .tz
                .from_local_datetime(&local)
                .earliest()
                .or_else(|| {
                    self.tz
                        .from_local_datetime(&(local + chrono::Duration::hours(1)))
                        .earliest()
                })
                .map(|t| t.with_timezone(&Utc));
            if let Some(at) = candidate {
                if at > now {
                    return at;
                }
            }
            date = match date.checked_add_days(Days::new(1)) {
                Some(d) => d,
                None => return now,
            };
        }
    }

    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        (self.next_after(now) - now).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub jobs: Vec<(JobName, DailyAt)>,
    pub retry_base: Duration,
    pub max_retries: u32,
}

impl SchedulerConfig {
    pub fn from_app(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let tz = cfg.tz()?;
        let mut jobs = Vec::with_capacity(JobName::ALL.len());
        for (key, raw) in cfg.schedule_entries() {
            let job: JobName = key
                .parse()
                .map_err(|e: String| ConfigError::InvalidValue {
                    key: format!("schedule.{key}"),
                    message: e,
                })?;
            jobs.push((job, DailyAt::new(ScheduleConfig::time_of(key, raw)?, tz)));
        }
        Ok(Self {
            enabled: cfg.schedule.enabled,
            jobs,
            retry_base: Duration::from_millis(cfg.schedule.retry_base_ms),
            max_retries: cfg.schedule.max_retries,
        })
    }
}

/// Cloneable access to the manual triggers of a running scheduler.
#[derive(Debug, Clone, Default)]
pub struct JobTrigger {
    senders: Arc<HashMap<JobName, mpsc::Sender<()>>>,
}

impl JobTrigger {
    /// Run `job` now. Returns false when a run is already pending or the job is unknown.
    pub fn trigger(&self, job: JobName) -> bool {
        self.senders
            .get(&job)
            .is_some_and(|tx| tx.try_send(()).is_ok())
    }

    pub fn scheduled(&self, job: JobName) -> bool {
        self.senders.contains_key(&job)
    }
}

/// Handle for the running scheduler (shutdown + trigger hook).
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    triggers: JobTrigger,
    joins: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn trigger(&self, job: JobName) -> bool {
        self.triggers.trigger(job)
    }

    pub fn triggers(&self) -> JobTrigger {
        self.triggers.clone()
    }

    /// Stop every task and wait for it; a run in progress finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for join in self.joins {
            let _ = join.await;
        }
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Spawn one task per configured job on the current tokio runtime.
    pub fn spawn(engine: Arc<Engine>, cfg: SchedulerConfig) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut triggers = HashMap::new();
        let mut joins = Vec::new();

        for (job, at) in cfg.jobs.iter().copied() {
            let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);
            triggers.insert(job, trigger_tx);
            joins.push(tokio::spawn(job_loop(
                job,
                at,
                engine.clone(),
                cfg.clone(),
                shutdown_rx.clone(),
                trigger_rx,
            )));
        }

        tracing::info!(enabled = cfg.enabled, jobs = cfg.jobs.len(), "scheduler started");
        SchedulerHandle {
            shutdown: shutdown_tx,
            triggers: JobTrigger {
                senders: Arc::new(triggers),
            },
            joins,
        }
    }
}

async fn job_loop(
    job: JobName,
    at: DailyAt,
    engine: Arc<Engine>,
    cfg: SchedulerConfig,
    mut shutdown: watch::Receiver<bool>,
    mut trigger: mpsc::Receiver<()>,
) {
    loop {
        let delay = at.delay_from(engine.clock().now());
        if cfg.enabled {
            tracing::debug!(job = %job, next_in_secs = delay.as_secs(), "job scheduled");
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay), if cfg.enabled => {}
            received = trigger.recv() => {
                if received.is_none() {
                    break;
                }
                tracing::info!(job = %job, "manual trigger");
            }
        }

        if !run_with_retry(job, &engine, &cfg, &mut shutdown).await {
            break;
        }
    }
    tracing::info!(job = %job, "job task stopped");
}

/// Returns false when shutdown was requested while waiting to retry.
async fn run_with_retry(
    job: JobName,
    engine: &Engine,
    cfg: &SchedulerConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let mut failures: u32 = 0;
    loop {
        match jobs::run(job, engine).await {
            Ok(report) => {
                tracing::info!(job = %job, processed = report.processed, failed = report.failed, "job finished");
                return true;
            }
            Err(e) => {
                failures += 1;
                if failures > cfg.max_retries {
                    tracing::error!(job = %job, attempts = failures, error = %e, "job failed; giving up until next run");
                    engine.alert(Alert::new(
                        AlertKind::JobFailed,
                        Severity::Critical,
                        format!("{job} failed after {failures} attempts: {e}"),
                        engine.clock().now(),
                    ));
                    return true;
                }
                let delay = backoff(cfg.retry_base, failures);
                tracing::warn!(job = %job, attempt = failures, retry_in_ms = delay.as_millis() as u64, error = %e, "job failed; retrying");
                tokio::select! {
                    _ = shutdown.changed() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testkit::{day, kit, product};
    use chrono::NaiveDate;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn next_run_is_later_today_or_tomorrow_in_local_time() {
        let at = DailyAt::new(NaiveTime::from_hms_opt(9, 30, 0).unwrap(), chrono_tz::Europe::Moscow);
        // 05:00 UTC = 08:00 MSK → 09:30 MSK the same day.
        assert_eq!(at.next_after(utc(2024, 6, 15, 5, 0)), utc(2024, 6, 15, 6, 30));
        // 07:00 UTC = 10:00 MSK → tomorrow.
        assert_eq!(at.next_after(utc(2024, 6, 15, 7, 0)), utc(2024, 6, 16, 6, 30));
        // Exactly at the run time → tomorrow.
        assert_eq!(at.next_after(utc(2024, 6, 15, 6, 30)), utc(2024, 6, 16, 6, 30));
        assert_eq!(at.delay_from(utc(2024, 6, 15, 6, 0)), Duration::from_secs(1800));
    }

    #[test]
    fn dst_gap_moves_forward() {
        // 02:30 does not exist in Berlin on 2024-03-31.
        let at = DailyAt::new(NaiveTime::from_hms_opt(2, 30, 0).unwrap(), chrono_tz::Europe::Berlin);
        let next = at.next_after(utc(2024, 3, 30, 12, 0));
        assert_eq!(next.with_timezone(&chrono_tz::Europe::Berlin).date_naive(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(next, utc(2024, 3, 31, 1, 30));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(30);
        assert_eq!(backoff(base, 0), Duration::ZERO);
        assert_eq!(backoff(base, 1), Duration::from_secs(30));
        assert_eq!(backoff(base, 3), Duration::from_secs(120));
        assert_eq!(backoff(base, 20), MAX_BACKOFF);
    }

    #[test]
    fn config_maps_every_job() {
        let cfg = SchedulerConfig::from_app(&AppConfig::default()).unwrap();
        assert_eq!(cfg.jobs.len(), 4);
        assert_eq!(cfg.jobs[0].0, JobName::PriceAnalysis);
        assert_eq!(cfg.jobs[0].1.time, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(cfg.retry_base, Duration::from_secs(30));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 1000, .. ProptestConfig::default() })]

            #[test]
            fn next_run_is_within_a_day_and_at_local_time(
                secs in 1_600_000_000i64..1_900_000_000i64,
                hour in 0u32..24,
                minute in 0u32..60,
            ) {
                let tz = chrono_tz::Europe::Moscow;
                let at = DailyAt::new(NaiveTime::from_hms_opt(hour, minute, 0).unwrap(), tz);
                let now = Utc.timestamp_opt(secs, 0).unwrap();
                let next = at.next_after(now);
                prop_assert!(next > now);
                prop_assert!(next - now <= chrono::Duration::hours(24));
                prop_assert_eq!(next.with_timezone(&tz).time(), at.time);
            }
        }
    }

    #[tokio::test]
    async fn manual_trigger_runs_job_and_shutdown_stops_tasks() {
        let k = kit();
        k.add_product(product(1, 100, 50));
        k.set_stock(1, 2);
        k.sell(1, day(14), 30, 1);

        let mut cfg = SchedulerConfig::from_app(&AppConfig::default()).unwrap();
        cfg.enabled = false;
        let handle = Scheduler::spawn(Arc::new(k.engine.clone()), cfg);

        assert!(handle.trigger(JobName::StockAlerts));
        for _ in 0..100 {
            if !k.alerts.of_kind(AlertKind::LowStock).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(k.alerts.of_kind(AlertKind::LowStock).len(), 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn unscheduled_job_cannot_be_triggered() {
        let k = kit();
        let mut cfg = SchedulerConfig::from_app(&AppConfig::default()).unwrap();
        cfg.enabled = false;
        cfg.jobs.retain(|(job, _)| *job == JobName::PriceAnalysis);
        let handle = Scheduler::spawn(Arc::new(k.engine.clone()), cfg);

        assert!(!handle.trigger(JobName::StockAlerts));
        assert!(handle.triggers().scheduled(JobName::PriceAnalysis));
        assert!(!JobTrigger::default().trigger(JobName::PriceAnalysis));
        handle.shutdown().await;
    }
}
