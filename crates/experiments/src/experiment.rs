use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pricepilot_analytics::{ExperimentKind, MetricDeltas, MetricSet, Verdict, VerdictProposal};
use pricepilot_catalog::DateRange;
use pricepilot_core::{Aggregate, AggregateRoot, DomainError, ExperimentId};
use pricepilot_events::Event;

use crate::subject::{ExperimentSubject, SlotKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Active,
    Reviewing,
    Completed,
    RolledBack,
}

impl ExperimentStatus {
    /// Open experiments hold their exclusivity slot.
    pub fn is_open(self) -> bool {
        matches!(self, ExperimentStatus::Active | ExperimentStatus::Reviewing)
    }
}

impl core::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ExperimentStatus::Active => "active",
            ExperimentStatus::Reviewing => "reviewing",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::RolledBack => "rolled_back",
        })
    }
}

/// Aggregate root: Experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    id: ExperimentId,
    subject: Option<ExperimentSubject>,
    start_date: NaiveDate,
    duration_days: u32,
    review_date: NaiveDate,
    baseline: MetricSet,
    result: Option<MetricSet>,
    suggestion: Option<VerdictProposal>,
    status: ExperimentStatus,
    verdict: Option<Verdict>,
    note: Option<String>,
    started_at: Option<DateTime<Utc>>,
    reviewed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Experiment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ExperimentId) -> Self {
        Self {
            id,
            subject: None,
            start_date: NaiveDate::MIN,
            duration_days: 0,
            review_date: NaiveDate::MIN,
            baseline: MetricSet::default(),
            result: None,
            suggestion: None,
            status: ExperimentStatus::Active,
            verdict: None,
            note: None,
            started_at: None,
            reviewed_at: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ExperimentId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn subject(&self) -> Option<&ExperimentSubject> {
        self.subject.as_ref()
    }

    pub fn kind(&self) -> Option<ExperimentKind> {
        self.subject.as_ref().map(ExperimentSubject::kind)
    }

    pub fn slot(&self) -> Option<SlotKey> {
        self.subject.as_ref().map(ExperimentSubject::slot)
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn duration_days(&self) -> u32 {
        self.duration_days
    }

    pub fn review_date(&self) -> NaiveDate {
        self.review_date
    }

    pub fn baseline(&self) -> &MetricSet {
        &self.baseline
    }

    pub fn result(&self) -> Option<&MetricSet> {
        self.result.as_ref()
    }

    pub fn deltas(&self) -> Option<&MetricDeltas> {
        self.suggestion.as_ref().map(|s| &s.deltas)
    }

    pub fn suggestion(&self) -> Option<&VerdictProposal> {
        self.suggestion.as_ref()
    }

    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.verdict
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Days until the review date; negative once overdue.
    pub fn days_left(&self, today: NaiveDate) -> i64 {
        (self.review_date - today).num_days()
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status.is_open() && today >= self.review_date
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open() && today > self.review_date
    }

    /// Open and past the review date by more than `grace_days`.
    pub fn is_stuck(&self, today: NaiveDate, grace_days: u32) -> bool {
        self.status.is_open() && -self.days_left(today) > i64::from(grace_days)
    }

    /// Days with result data: `[start_date, today - 1]`, or `None` before the first full day.
    pub fn review_window(&self, today: NaiveDate) -> Option<DateRange> {
        let yesterday = today.pred_opt()?;
        DateRange::new(self.start_date, yesterday).ok()
    }

    /// Baseline window for an experiment starting `today`: the `duration_days`
    /// full days before it.
    pub fn baseline_window(today: NaiveDate, duration_days: u32) -> DateRange {
        DateRange::trailing(today.pred_opt().unwrap_or(NaiveDate::MIN), duration_days)
    }
}

impl AggregateRoot for Experiment {
    type Id = ExperimentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: StartExperiment.
///
/// The change is already live on the marketplace; this only instruments it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartExperiment {
    pub experiment_id: ExperimentId,
    pub subject: ExperimentSubject,
    pub start_date: NaiveDate,
    pub duration_days: u32,
    pub baseline: MetricSet,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordReview (result metrics plus a suggested verdict).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordReview {
    pub experiment_id: ExperimentId,
    pub result: MetricSet,
    pub suggestion: VerdictProposal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteExperiment (the human decision; the change stays live).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteExperiment {
    pub experiment_id: ExperimentId,
    pub verdict: Verdict,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RollBackExperiment (issued after the revert succeeded externally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollBackExperiment {
    pub experiment_id: ExperimentId,
    pub verdict: Verdict,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExperimentCommand {
    Start(StartExperiment),
    RecordReview(RecordReview),
    Complete(CompleteExperiment),
    RollBack(RollBackExperiment),
}

impl ExperimentCommand {
    fn name(&self) -> &'static str {
        match self {
            ExperimentCommand::Start(_) => "start",
            ExperimentCommand::RecordReview(_) => "review",
            ExperimentCommand::Complete(_) => "complete",
            ExperimentCommand::RollBack(_) => "roll back",
        }
    }

    fn experiment_id(&self) -> ExperimentId {
        match self {
            ExperimentCommand::Start(c) => c.experiment_id,
            ExperimentCommand::RecordReview(c) => c.experiment_id,
            ExperimentCommand::Complete(c) => c.experiment_id,
            ExperimentCommand::RollBack(c) => c.experiment_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStarted {
    pub experiment_id: ExperimentId,
    pub subject: ExperimentSubject,
    pub start_date: NaiveDate,
    pub duration_days: u32,
    pub review_date: NaiveDate,
    pub baseline: MetricSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReviewed {
    pub experiment_id: ExperimentId,
    pub result: MetricSet,
    pub suggestion: VerdictProposal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentCompleted {
    pub experiment_id: ExperimentId,
    pub verdict: Verdict,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRolledBack {
    pub experiment_id: ExperimentId,
    /// The change that was applied to restore the old value.
    pub reverted: ExperimentSubject,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExperimentEvent {
    Started(ExperimentStarted),
    Reviewed(ExperimentReviewed),
    Completed(ExperimentCompleted),
    RolledBack(ExperimentRolledBack),
}

impl Event for ExperimentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExperimentEvent::Started(_) => "experiments.experiment.started",
            ExperimentEvent::Reviewed(_) => "experiments.experiment.reviewed",
            ExperimentEvent::Completed(_) => "experiments.experiment.completed",
            ExperimentEvent::RolledBack(_) => "experiments.experiment.rolled_back",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExperimentEvent::Started(e) => e.occurred_at,
            ExperimentEvent::Reviewed(e) => e.occurred_at,
            ExperimentEvent::Completed(e) => e.occurred_at,
            ExperimentEvent::RolledBack(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Experiment {
    type Command = ExperimentCommand;
    type Event = ExperimentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ExperimentEvent::Started(e) => {
                self.id = e.experiment_id;
                self.subject = Some(e.subject.clone());
                self.start_date = e.start_date;
                self.duration_days = e.duration_days;
                self.review_date = e.review_date;
                self.baseline = e.baseline;
                self.status = ExperimentStatus::Active;
                self.started_at = Some(e.occurred_at);
                self.created = true;
            }
            ExperimentEvent::Reviewed(e) => {
                self.result = Some(e.result);
                self.suggestion = Some(e.suggestion.clone());
                self.status = ExperimentStatus::Reviewing;
                self.reviewed_at = Some(e.occurred_at);
            }
            ExperimentEvent::Completed(e) => {
                self.status = ExperimentStatus::Completed;
                self.verdict = Some(e.verdict);
                self.note = e.note.clone();
                self.completed_at = Some(e.occurred_at);
            }
            ExperimentEvent::RolledBack(e) => {
                self.status = ExperimentStatus::RolledBack;
                self.verdict = Some(Verdict::Failed);
                self.note = e.note.clone();
                self.completed_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.experiment_id() != self.id {
            return Err(DomainError::invariant("experiment_id mismatch"));
        }

        match command {
            ExperimentCommand::Start(cmd) => self.handle_start(cmd),
            _ if !self.created => Err(DomainError::not_found()),
            ExperimentCommand::RecordReview(cmd) => {
                self.ensure_open(command)?;
                Ok(vec![ExperimentEvent::Reviewed(ExperimentReviewed {
                    experiment_id: self.id,
                    result: cmd.result,
                    suggestion: cmd.suggestion.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ExperimentCommand::Complete(cmd) => {
                self.ensure_open(command)?;
                Ok(vec![ExperimentEvent::Completed(ExperimentCompleted {
                    experiment_id: self.id,
                    verdict: cmd.verdict,
                    note: cmd.note.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ExperimentCommand::RollBack(cmd) => {
                self.ensure_open(command)?;
                if cmd.verdict != Verdict::Failed {
                    return Err(DomainError::validation(format!(
                        "rollback requires verdict FAILED, got {}",
                        cmd.verdict
                    )));
                }
                let reverted = self
                    .subject
                    .as_ref()
                    .and_then(ExperimentSubject::reverted)
                    .ok_or_else(|| DomainError::validation("change has no recorded previous value to restore"))?;
                Ok(vec![ExperimentEvent::RolledBack(ExperimentRolledBack {
                    experiment_id: self.id,
                    reverted,
                    note: cmd.note.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Experiment {
    fn ensure_open(&self, command: &ExperimentCommand) -> Result<(), DomainError> {
        if self.status.is_open() {
            Ok(())
        } else {
            Err(DomainError::invalid_transition("experiment", self.status, command.name()))
        }
    }

    fn handle_start(&self, cmd: &StartExperiment) -> Result<Vec<ExperimentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("experiment already exists"));
        }
        if cmd.duration_days == 0 {
            return Err(DomainError::validation("duration_days must be at least 1"));
        }
        cmd.subject.validate()?;
        let review_date = cmd
            .start_date
            .checked_add_days(Days::new(u64::from(cmd.duration_days)))
            .ok_or_else(|| DomainError::validation("review date out of range"))?;

        Ok(vec![ExperimentEvent::Started(ExperimentStarted {
            experiment_id: cmd.experiment_id,
            subject: cmd.subject.clone(),
            start_date: cmd.start_date,
            duration_days: cmd.duration_days,
            review_date,
            baseline: cmd.baseline,
            occurred_at: cmd.occurred_at,
        })])
    }
}
