//! Experiment verdicts.
//!
//! One rule for every experiment kind, parameterized by the cost metric:
//! - SUCCESS: orders grew and the cost metric grew less than `cost_tolerance`;
//! - FAILED: orders fell by `outcome_drop` or more, or the cost metric grew by
//!   `cost_blowout` or more while orders did not grow;
//! - NEUTRAL: anything else, including an unavailable outcome.
//!
//! An axis whose data is unavailable on either side is skipped, not read as zero.

use serde::{Deserialize, Serialize};

use pricepilot_core::Percent;

use crate::error::AnalyticsError;
use crate::metrics::{MetricDeltas, MetricSet};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentKind {
    Price,
    Content,
    Ad,
}

impl ExperimentKind {
    /// Lower-is-better cost metric for this kind, if it has one.
    pub fn cost_metric(self, m: &MetricSet) -> Option<f64> {
        match self {
            ExperimentKind::Price => None,
            ExperimentKind::Content => m.views_per_cart(),
            ExperimentKind::Ad => m.cost_per_click(),
        }
    }

    pub fn cost_label(self) -> Option<&'static str> {
        match self {
            ExperimentKind::Price => None,
            ExperimentKind::Content => Some("views per add-to-cart"),
            ExperimentKind::Ad => Some("cost per click"),
        }
    }
}

impl core::fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ExperimentKind::Price => "price",
            ExperimentKind::Content => "content",
            ExperimentKind::Ad => "ad",
        })
    }
}

impl core::str::FromStr for ExperimentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "price" => Ok(ExperimentKind::Price),
            "content" => Ok(ExperimentKind::Content),
            "ad" | "ads" => Ok(ExperimentKind::Ad),
            other => Err(format!("unknown experiment kind '{other}'")),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Success,
    Failed,
    Neutral,
}

impl core::fmt::Display for Verdict {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Verdict::Success => "SUCCESS",
            Verdict::Failed => "FAILED",
            Verdict::Neutral => "NEUTRAL",
        })
    }
}

impl core::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(Verdict::Success),
            "FAILED" => Ok(Verdict::Failed),
            "NEUTRAL" => Ok(Verdict::Neutral),
            other => Err(format!("unknown verdict '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictPolicy {
    pub cost_tolerance: Percent,
    pub cost_blowout: Percent,
    pub outcome_drop: Percent,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self {
            cost_tolerance: Percent::from_whole(20),
            cost_blowout: Percent::from_whole(50),
            outcome_drop: Percent::from_whole(20),
        }
    }
}

impl VerdictPolicy {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.cost_tolerance.bp() <= 0 || self.cost_blowout < self.cost_tolerance {
            return Err(AnalyticsError::invalid_policy(
                "verdict thresholds must satisfy 0 < cost_tolerance <= cost_blowout",
            ));
        }
        if self.outcome_drop.bp() <= 0 || self.outcome_drop.bp() > 10_000 {
            return Err(AnalyticsError::invalid_policy("outcome_drop must be in (0, 100]%"));
        }
        Ok(())
    }
}

/// Suggested disposition of an experiment, with a note a human can act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictProposal {
    pub verdict: Verdict,
    pub rollback_recommended: bool,
    pub outcome_change: Option<Percent>,
    pub cost_change: Option<Percent>,
    pub deltas: MetricDeltas,
    pub summary: String,
}

pub fn verdict(baseline: &MetricSet, result: &MetricSet, kind: ExperimentKind, policy: &VerdictPolicy) -> VerdictProposal {
    let outcome = baseline.orders.zip(result.orders);
    let cost = match (kind.cost_metric(baseline), kind.cost_metric(result)) {
        (Some(b), Some(r)) if b > 0.0 => Some((r - b) / b * 100.0),
        _ => None,
    };

    let improved = outcome.is_some_and(|(b, r)| r > b);
    let dropped = outcome.is_some_and(|(b, r)| {
        b > 0 && (r as i128) * 10_000 <= (b as i128) * (10_000 - policy.outcome_drop.bp() as i128)
    });
    let cost_ok = cost.is_none_or(|c| c < policy.cost_tolerance.as_f64());
    let blowout = cost.is_some_and(|c| c >= policy.cost_blowout.as_f64());

    let verdict = if dropped || (outcome.is_some() && blowout && !improved) {
        Verdict::Failed
    } else if improved && cost_ok {
        Verdict::Success
    } else {
        Verdict::Neutral
    };

    let outcome_change = outcome.and_then(|(b, r)| Percent::between(b, r));
    let cost_change = cost.map(Percent::from_f64);

    VerdictProposal {
        verdict,
        rollback_recommended: verdict == Verdict::Failed,
        outcome_change,
        cost_change,
        deltas: MetricDeltas::between(baseline, result),
        summary: summarize(kind, verdict, outcome, outcome_change, cost_change, dropped),
    }
}

fn summarize(
    kind: ExperimentKind,
    verdict: Verdict,
    outcome: Option<(i64, i64)>,
    outcome_change: Option<Percent>,
    cost_change: Option<Percent>,
    dropped: bool,
) -> String {
    let mut parts = Vec::new();
    match (outcome, outcome_change) {
        (Some((b, r)), Some(pct)) => parts.push(format!("orders {b} → {r} ({pct})")),
        (Some((b, r)), None) => parts.push(format!("orders {b} → {r}")),
        (None, _) => parts.push("orders unavailable".to_string()),
    }
    if let Some(label) = kind.cost_label() {
        match cost_change {
            Some(pct) => parts.push(format!("{label} {pct}")),
            None => parts.push(format!("{label} unavailable")),
        }
    }

    let advice = match verdict {
        Verdict::Success => "keep the change".to_string(),
        Verdict::Failed if dropped => "roll back: orders dropped".to_string(),
        Verdict::Failed => format!(
            "roll back: {} worsened without more orders",
            kind.cost_label().unwrap_or("cost")
        ),
        Verdict::Neutral => "no clear effect; keep observing or close as neutral".to_string(),
    };
    format!("{verdict}: {}; {advice}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricepilot_core::Money;
    use proptest::prelude::*;

    fn orders(n: i64) -> MetricSet {
        MetricSet {
            orders: Some(n),
            ..MetricSet::default()
        }
    }

    fn ads(orders: i64, clicks: i64, spend: i64) -> MetricSet {
        MetricSet {
            orders: Some(orders),
            clicks: Some(clicks),
            spend: Some(Money::from_major(spend)),
            views: Some(clicks * 20),
            ..MetricSet::default()
        }
    }

    fn v(b: &MetricSet, r: &MetricSet, kind: ExperimentKind) -> VerdictProposal {
        verdict(b, r, kind, &VerdictPolicy::default())
    }

    #[test]
    fn more_orders_at_flat_cost_is_success() {
        let p = v(&orders(10), &orders(11), ExperimentKind::Price);
        assert_eq!(p.verdict, Verdict::Success);
        assert!(!p.rollback_recommended);
        assert_eq!(p.outcome_change, Some(Percent::from_whole(10)));
    }

    #[test]
    fn thirty_percent_fewer_orders_fails_and_recommends_rollback() {
        let p = v(&orders(10), &orders(7), ExperimentKind::Price);
        assert_eq!(p.verdict, Verdict::Failed);
        assert!(p.rollback_recommended);
        assert!(p.summary.starts_with("FAILED"));
    }

    #[test]
    fn exactly_twenty_percent_drop_fails() {
        assert_eq!(v(&orders(10), &orders(8), ExperimentKind::Price).verdict, Verdict::Failed);
        assert_eq!(v(&orders(10), &orders(9), ExperimentKind::Price).verdict, Verdict::Neutral);
    }

    #[test]
    fn ad_cost_blowout_without_more_orders_fails() {
        // cpc 1.00 → 1.60
        let p = v(&ads(10, 100, 100), &ads(10, 100, 160), ExperimentKind::Ad);
        assert_eq!(p.verdict, Verdict::Failed);
        assert_eq!(p.cost_change, Some(Percent::from_whole(60)));
    }

    #[test]
    fn ad_growth_with_moderate_cost_rise_is_neutral() {
        // orders up, cpc +25%
        let p = v(&ads(10, 100, 100), &ads(12, 100, 125), ExperimentKind::Ad);
        assert_eq!(p.verdict, Verdict::Neutral);
    }

    #[test]
    fn ad_growth_with_cost_in_tolerance_is_success() {
        let p = v(&ads(10, 100, 100), &ads(12, 100, 110), ExperimentKind::Ad);
        assert_eq!(p.verdict, Verdict::Success);
    }

    #[test]
    fn unavailable_views_skip_the_cost_axis() {
        let baseline = MetricSet {
            orders: Some(10),
            add_to_cart: Some(30),
            views: None,
            ..MetricSet::default()
        };
        let result = MetricSet {
            orders: Some(12),
            add_to_cart: Some(35),
            views: None,
            ..MetricSet::default()
        };
        let p = v(&baseline, &result, ExperimentKind::Content);
        assert_eq!(p.verdict, Verdict::Success);
        assert_eq!(p.cost_change, None);
        assert!(p.summary.contains("views per add-to-cart unavailable"));
    }

    #[test]
    fn unavailable_orders_is_neutral() {
        let p = v(&MetricSet::default(), &MetricSet::default(), ExperimentKind::Ad);
        assert_eq!(p.verdict, Verdict::Neutral);
        assert!(p.summary.contains("orders unavailable"));
    }

    #[test]
    fn first_orders_from_zero_baseline_count_as_growth() {
        assert_eq!(v(&orders(0), &orders(3), ExperimentKind::Price).verdict, Verdict::Success);
        assert_eq!(v(&orders(0), &orders(0), ExperimentKind::Price).verdict, Verdict::Neutral);
    }

    #[test]
    fn parses_kinds_and_verdicts() {
        assert_eq!("ads".parse::<ExperimentKind>().unwrap(), ExperimentKind::Ad);
        assert_eq!("failed".parse::<Verdict>().unwrap(), Verdict::Failed);
        assert!("maybe".parse::<Verdict>().is_err());
    }

    mod proptests {
        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 1000, .. ProptestConfig::default() })]

            #[test]
            fn rollback_flag_tracks_failed(
                b in 0i64..1_000, r in 0i64..1_000,
                bc in 1i64..1_000, rc in 1i64..1_000,
                bs in 0i64..10_000, rs in 0i64..10_000,
            ) {
                let p = v(&ads(b, bc, bs), &ads(r, rc, rs), ExperimentKind::Ad);
                prop_assert_eq!(p.rollback_recommended, p.verdict == Verdict::Failed);
                if r > b {
                    prop_assert_ne!(p.verdict, Verdict::Failed);
                }
            }
        }
    }
}
