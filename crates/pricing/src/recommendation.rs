use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pricepilot_analytics::{Direction, PriceAnalysis, PriceProposal};
use pricepilot_catalog::SalesTotals;
use pricepilot_core::{
    Aggregate, AggregateRoot, ChangeId, DomainError, Money, Percent, ProductId, RecommendationId,
};
use pricepilot_events::Event;

/// Recommendation lifecycle.
///
/// `pending → approved → {applied | failed}`, `pending → {rejected | failed}`.
/// `approved` only lasts while the marketplace call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Applied,
    Rejected,
    Failed,
}

impl RecommendationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RecommendationStatus::Applied | RecommendationStatus::Rejected | RecommendationStatus::Failed
        )
    }
}

impl core::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Approved => "approved",
            RecommendationStatus::Applied => "applied",
            RecommendationStatus::Rejected => "rejected",
            RecommendationStatus::Failed => "failed",
        })
    }
}

impl core::str::FromStr for RecommendationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(RecommendationStatus::Pending),
            "approved" => Ok(RecommendationStatus::Approved),
            "applied" => Ok(RecommendationStatus::Applied),
            "rejected" => Ok(RecommendationStatus::Rejected),
            "failed" => Ok(RecommendationStatus::Failed),
            other => Err(format!("unknown recommendation status '{other}'")),
        }
    }
}

/// Aggregate root: PriceRecommendation.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecommendation {
    id: RecommendationId,
    change_id: Option<ChangeId>,
    product_id: ProductId,
    offer_id: String,
    product_name: String,
    direction: Direction,
    current_price: Money,
    recommended_price: Money,
    change_pct: Percent,
    score_up: f64,
    score_down: f64,
    factors: Vec<String>,
    /// Sales over the 7 full days before the recommendation.
    baseline: SalesTotals,
    status: RecommendationStatus,
    failure_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    reviewed_at: Option<DateTime<Utc>>,
    applied_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl PriceRecommendation {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RecommendationId) -> Self {
        Self {
            id,
            change_id: None,
            product_id: ProductId::new(0),
            offer_id: String::new(),
            product_name: String::new(),
            direction: Direction::Up,
            current_price: Money::ZERO,
            recommended_price: Money::ZERO,
            change_pct: Percent::ZERO,
            score_up: 0.0,
            score_down: 0.0,
            factors: Vec::new(),
            baseline: SalesTotals::default(),
            status: RecommendationStatus::Pending,
            failure_reason: None,
            created_at: None,
            reviewed_at: None,
            applied_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RecommendationId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn change_id(&self) -> Option<&ChangeId> {
        self.change_id.as_ref()
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn offer_id(&self) -> &str {
        &self.offer_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn current_price(&self) -> Money {
        self.current_price
    }

    pub fn recommended_price(&self) -> Money {
        self.recommended_price
    }

    pub fn change_pct(&self) -> Percent {
        self.change_pct
    }

    pub fn score_up(&self) -> f64 {
        self.score_up
    }

    pub fn score_down(&self) -> f64 {
        self.score_down
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    pub fn baseline(&self) -> SalesTotals {
        self.baseline
    }

    pub fn status(&self) -> RecommendationStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        self.applied_at
    }
}

impl AggregateRoot for PriceRecommendation {
    type Id = RecommendationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ProposeRecommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposeRecommendation {
    pub recommendation_id: RecommendationId,
    pub change_id: ChangeId,
    pub product_id: ProductId,
    pub offer_id: String,
    pub product_name: String,
    pub direction: Direction,
    pub current_price: Money,
    pub recommended_price: Money,
    pub change_pct: Percent,
    pub score_up: f64,
    pub score_down: f64,
    pub factors: Vec<String>,
    pub baseline: SalesTotals,
    pub occurred_at: DateTime<Utc>,
}

impl ProposeRecommendation {
    pub fn from_proposal(
        recommendation_id: RecommendationId,
        change_id: ChangeId,
        analysis: &PriceAnalysis,
        proposal: &PriceProposal,
        baseline: SalesTotals,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            recommendation_id,
            change_id,
            product_id: analysis.product_id,
            offer_id: analysis.offer_id.clone(),
            product_name: analysis.name.clone(),
            direction: proposal.direction,
            current_price: proposal.current_price,
            recommended_price: proposal.recommended_price,
            change_pct: proposal.change_pct,
            score_up: proposal.score_up,
            score_down: proposal.score_down,
            factors: proposal.factors.clone(),
            baseline,
            occurred_at,
        }
    }
}

/// Command: ApproveRecommendation (claims it for applying).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRecommendation {
    pub recommendation_id: RecommendationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkApplied (the marketplace accepted the new price).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkApplied {
    pub recommendation_id: RecommendationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkFailed (the marketplace call failed or timed out).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkFailed {
    pub recommendation_id: RecommendationId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectRecommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRecommendation {
    pub recommendation_id: RecommendationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecommendationCommand {
    Propose(ProposeRecommendation),
    Approve(ApproveRecommendation),
    MarkApplied(MarkApplied),
    MarkFailed(MarkFailed),
    Reject(RejectRecommendation),
}

impl RecommendationCommand {
    fn name(&self) -> &'static str {
        match self {
            RecommendationCommand::Propose(_) => "propose",
            RecommendationCommand::Approve(_) => "approve",
            RecommendationCommand::MarkApplied(_) => "apply",
            RecommendationCommand::MarkFailed(_) => "fail",
            RecommendationCommand::Reject(_) => "reject",
        }
    }

    fn recommendation_id(&self) -> RecommendationId {
        match self {
            RecommendationCommand::Propose(c) => c.recommendation_id,
            RecommendationCommand::Approve(c) => c.recommendation_id,
            RecommendationCommand::MarkApplied(c) => c.recommendation_id,
            RecommendationCommand::MarkFailed(c) => c.recommendation_id,
            RecommendationCommand::Reject(c) => c.recommendation_id,
        }
    }
}

/// Event: RecommendationProposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationProposed {
    pub recommendation_id: RecommendationId,
    pub change_id: ChangeId,
    pub product_id: ProductId,
    pub offer_id: String,
    pub product_name: String,
    pub direction: Direction,
    pub current_price: Money,
    pub recommended_price: Money,
    pub change_pct: Percent,
    pub score_up: f64,
    pub score_down: f64,
    pub factors: Vec<String>,
    pub baseline: SalesTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecommendationApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationApproved {
    pub recommendation_id: RecommendationId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecommendationApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationApplied {
    pub recommendation_id: RecommendationId,
    pub product_id: ProductId,
    pub old_price: Money,
    pub new_price: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecommendationFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationFailed {
    pub recommendation_id: RecommendationId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecommendationRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRejected {
    pub recommendation_id: RecommendationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecommendationEvent {
    Proposed(RecommendationProposed),
    Approved(RecommendationApproved),
    Applied(RecommendationApplied),
    Failed(RecommendationFailed),
    Rejected(RecommendationRejected),
}

impl Event for RecommendationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RecommendationEvent::Proposed(_) => "pricing.recommendation.proposed",
            RecommendationEvent::Approved(_) => "pricing.recommendation.approved",
            RecommendationEvent::Applied(_) => "pricing.recommendation.applied",
            RecommendationEvent::Failed(_) => "pricing.recommendation.failed",
            RecommendationEvent::Rejected(_) => "pricing.recommendation.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RecommendationEvent::Proposed(e) => e.occurred_at,
            RecommendationEvent::Approved(e) => e.occurred_at,
            RecommendationEvent::Applied(e) => e.occurred_at,
            RecommendationEvent::Failed(e) => e.occurred_at,
            RecommendationEvent::Rejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PriceRecommendation {
    type Command = RecommendationCommand;
    type Event = RecommendationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RecommendationEvent::Proposed(e) => {
                self.id = e.recommendation_id;
                self.change_id = Some(e.change_id.clone());
                self.product_id = e.product_id;
                self.offer_id = e.offer_id.clone();
                self.product_name = e.product_name.clone();
                self.direction = e.direction;
                self.current_price = e.current_price;
                self.recommended_price = e.recommended_price;
                self.change_pct = e.change_pct;
                self.score_up = e.score_up;
                self.score_down = e.score_down;
                self.factors = e.factors.clone();
                self.baseline = e.baseline;
                self.status = RecommendationStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            RecommendationEvent::Approved(e) => {
                self.status = RecommendationStatus::Approved;
                self.reviewed_at = Some(e.occurred_at);
            }
            RecommendationEvent::Applied(e) => {
                self.status = RecommendationStatus::Applied;
                self.applied_at = Some(e.occurred_at);
            }
            RecommendationEvent::Failed(e) => {
                self.status = RecommendationStatus::Failed;
                self.failure_reason = Some(e.reason.clone());
                self.reviewed_at.get_or_insert(e.occurred_at);
            }
            RecommendationEvent::Rejected(e) => {
                self.status = RecommendationStatus::Rejected;
                self.reviewed_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.recommendation_id() != self.id {
            return Err(DomainError::invariant("recommendation_id mismatch"));
        }
        if let RecommendationCommand::Propose(cmd) = command {
            return self.handle_propose(cmd);
        }
        if !self.created {
            return Err(DomainError::not_found());
        }

        match command {
            RecommendationCommand::Propose(_) => Err(DomainError::conflict("recommendation already exists")),
            RecommendationCommand::Approve(cmd) => {
                self.ensure_status(&[RecommendationStatus::Pending], command)?;
                Ok(vec![RecommendationEvent::Approved(RecommendationApproved {
                    recommendation_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RecommendationCommand::MarkApplied(cmd) => {
                self.ensure_status(&[RecommendationStatus::Approved], command)?;
                Ok(vec![RecommendationEvent::Applied(RecommendationApplied {
                    recommendation_id: self.id,
                    product_id: self.product_id,
                    old_price: self.current_price,
                    new_price: self.recommended_price,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RecommendationCommand::MarkFailed(cmd) => {
                self.ensure_status(&[RecommendationStatus::Pending, RecommendationStatus::Approved], command)?;
                Ok(vec![RecommendationEvent::Failed(RecommendationFailed {
                    recommendation_id: self.id,
                    reason: cmd.reason.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            RecommendationCommand::Reject(cmd) => {
                self.ensure_status(&[RecommendationStatus::Pending], command)?;
                Ok(vec![RecommendationEvent::Rejected(RecommendationRejected {
                    recommendation_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl PriceRecommendation {
    fn ensure_status(&self, allowed: &[RecommendationStatus], command: &RecommendationCommand) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition("recommendation", self.status, command.name()))
        }
    }

    fn handle_propose(&self, cmd: &ProposeRecommendation) -> Result<Vec<RecommendationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "recommendation {} already exists",
                cmd.change_id
            )));
        }
        if !cmd.current_price.is_positive() || !cmd.recommended_price.is_positive() {
            return Err(DomainError::validation("prices must be positive"));
        }
        let consistent = match cmd.direction {
            Direction::Up => cmd.recommended_price > cmd.current_price,
            Direction::Down => cmd.recommended_price < cmd.current_price,
        };
        if !consistent {
            return Err(DomainError::invariant(format!(
                "direction {} contradicts {} → {}",
                cmd.direction, cmd.current_price, cmd.recommended_price
            )));
        }

        Ok(vec![RecommendationEvent::Proposed(RecommendationProposed {
            recommendation_id: cmd.recommendation_id,
            change_id: cmd.change_id.clone(),
            product_id: cmd.product_id,
            offer_id: cmd.offer_id.clone(),
            product_name: cmd.product_name.clone(),
            direction: cmd.direction,
            current_price: cmd.current_price,
            recommended_price: cmd.recommended_price,
            change_pct: cmd.change_pct,
            score_up: cmd.score_up,
            score_down: cmd.score_down,
            factors: cmd.factors.clone(),
            baseline: cmd.baseline,
            occurred_at: cmd.occurred_at,
        })])
    }
}
