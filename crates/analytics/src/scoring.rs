//! Price pressure scoring.
//!
//! Two independent accumulators (`score_up`, `score_down`) collect weighted
//! signals from stock runway, sales trend and margin. The winning side must
//! lead strictly and reach `min_winning_score`; its score is turned into a
//! percentage change, floored at the margin minimum and rounded to a
//! psychological ending.

use serde::{Deserialize, Serialize};

use pricepilot_catalog::{Product, SalesTotals};
use pricepilot_core::{Money, Percent, ProductId};

use crate::error::AnalyticsError;
use crate::forecast::StockForecast;
use crate::rounding::{psychological_ceil, psychological_round};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Length of each trend window (recent vs preceding).
    pub trend_window_days: u32,
    /// Window for the "no sales" signal.
    pub sales_window_days: u32,
    /// Price change per score point, in percent.
    pub pct_per_point: f64,
    pub max_change: Percent,
    /// Realized changes below this are dropped as not worth acting on.
    pub min_change: Percent,
    pub min_winning_score: f64,
    pub deficit_days: f64,
    pub low_days: f64,
    pub high_days: f64,
    pub excess_days: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            trend_window_days: 7,
            sales_window_days: 30,
            pct_per_point: 5.0,
            max_change: Percent::from_whole(15),
            min_change: Percent::from_whole(3),
            min_winning_score: 2.0,
            deficit_days: 7.0,
            low_days: 14.0,
            high_days: 60.0,
            excess_days: 90.0,
        }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.trend_window_days == 0 || self.sales_window_days == 0 {
            return Err(AnalyticsError::invalid_policy("scoring windows must be >= 1 day"));
        }
        if !(self.pct_per_point.is_finite() && self.pct_per_point > 0.0) {
            return Err(AnalyticsError::invalid_policy("pct_per_point must be positive"));
        }
        if self.max_change.bp() <= 0 || self.max_change.bp() >= 10_000 {
            return Err(AnalyticsError::invalid_policy("max_change must be in (0, 100)%"));
        }
        if self.min_change.bp() < 0 || self.min_change > self.max_change {
            return Err(AnalyticsError::invalid_policy("min_change must be in [0, max_change]"));
        }
        if !(self.deficit_days < self.low_days && self.low_days <= self.high_days && self.high_days < self.excess_days) {
            return Err(AnalyticsError::invalid_policy(
                "stock thresholds must satisfy deficit < low <= high < excess",
            ));
        }
        Ok(())
    }
}

/// Inputs the scorer looks at for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub product_id: ProductId,
    pub offer_id: String,
    pub name: String,
    pub current_price: Money,
    pub cost_price: Money,
    pub min_margin: Percent,
    pub margin: Percent,
    pub margin_floor: Money,
    pub current_stock: i64,
    #[serde(with = "crate::forecast::days_serde")]
    pub days_of_stock: f64,
    pub sales_30d: i64,
    pub revenue_30d: Money,
    pub trend_pct: f64,
}

impl PriceAnalysis {
    pub fn new(product: &Product, forecast: &StockForecast, sales_window: SalesTotals, trend_pct: f64) -> Self {
        Self {
            product_id: product.id,
            offer_id: product.offer_id.clone(),
            name: product.name.clone(),
            current_price: product.price,
            cost_price: product.cost_price,
            min_margin: product.min_margin,
            margin: product.margin(),
            margin_floor: product.margin_floor(),
            current_stock: forecast.current_stock,
            days_of_stock: forecast.days_remaining,
            sales_30d: sales_window.quantity,
            revenue_30d: sales_window.revenue,
            trend_pct,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StockDeficit,
    StockLow,
    StockExcess,
    StockHigh,
    TrendCollapse,
    TrendStrongDrop,
    TrendMildDrop,
    TrendExplosiveGrowth,
    TrendStrongGrowth,
    MarginBelowFloor,
    NoSales,
}

impl Signal {
    pub fn direction(self) -> Direction {
        match self {
            Signal::StockDeficit
            | Signal::StockLow
            | Signal::TrendExplosiveGrowth
            | Signal::TrendStrongGrowth
            | Signal::MarginBelowFloor => Direction::Up,
            Signal::StockExcess
            | Signal::StockHigh
            | Signal::TrendCollapse
            | Signal::TrendStrongDrop
            | Signal::TrendMildDrop
            | Signal::NoSales => Direction::Down,
        }
    }

    pub fn weight(self) -> f64 {
        match self {
            Signal::StockLow | Signal::StockHigh | Signal::TrendMildDrop => 1.0,
            Signal::TrendStrongGrowth => 1.5,
            Signal::StockDeficit | Signal::StockExcess | Signal::TrendStrongDrop => 2.0,
            Signal::TrendExplosiveGrowth | Signal::NoSales => 2.0,
            Signal::TrendCollapse | Signal::MarginBelowFloor => 3.0,
        }
    }
}

/// One triggered signal with its human-readable justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub signal: Signal,
    pub direction: Direction,
    pub weight: f64,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub score_up: f64,
    pub score_down: f64,
    pub factors: Vec<Factor>,
}

impl ScoreCard {
    fn push(&mut self, signal: Signal, description: String) {
        match signal.direction() {
            Direction::Up => self.score_up += signal.weight(),
            Direction::Down => self.score_down += signal.weight(),
        }
        self.factors.push(Factor {
            signal,
            direction: signal.direction(),
            weight: signal.weight(),
            description,
        });
    }

    /// Winning direction and its score, if one side leads strictly and reaches `min_score`.
    pub fn direction(&self, min_score: f64) -> Option<(Direction, f64)> {
        if self.score_up > self.score_down && self.score_up >= min_score {
            Some((Direction::Up, self.score_up))
        } else if self.score_down > self.score_up && self.score_down >= min_score {
            Some((Direction::Down, self.score_down))
        } else {
            None
        }
    }

    pub fn has(&self, signal: Signal) -> bool {
        self.factors.iter().any(|f| f.signal == signal)
    }
}

/// Run the score table against one analysis.
pub fn score(a: &PriceAnalysis, policy: &ScoringPolicy) -> ScoreCard {
    let mut card = ScoreCard::default();
    let days = a.days_of_stock;
    // An empty shelf never counts as excess, matching `forecast::overstock`.
    let stocked = a.current_stock > 0;

    if days < policy.deficit_days {
        card.push(Signal::StockDeficit, format!("Stock deficit: {days:.1} days of stock left"));
    } else if days < policy.low_days {
        card.push(Signal::StockLow, format!("Low stock: {days:.1} days of stock left"));
    } else if stocked && days > policy.excess_days {
        let text = if days.is_finite() {
            format!("Excess stock: {days:.0} days of stock")
        } else {
            "Excess stock: nothing sold to draw it down".to_string()
        };
        card.push(Signal::StockExcess, text);
    } else if stocked && days > policy.high_days {
        card.push(Signal::StockHigh, format!("High stock: {days:.0} days of stock"));
    }

    let trend = a.trend_pct;
    let window = policy.trend_window_days;
    if trend < -50.0 {
        card.push(Signal::TrendCollapse, format!("Sales collapsed {trend:.1}% ({window}d vs previous {window}d)"));
    } else if trend < -30.0 {
        card.push(Signal::TrendStrongDrop, format!("Sales fell {trend:.1}% ({window}d vs previous {window}d)"));
    } else if trend < -15.0 {
        card.push(Signal::TrendMildDrop, format!("Sales dipped {trend:.1}% ({window}d vs previous {window}d)"));
    } else if trend > 50.0 {
        card.push(
            Signal::TrendExplosiveGrowth,
            format!("Sales surged +{trend:.1}% ({window}d vs previous {window}d)"),
        );
    } else if trend > 30.0 {
        card.push(Signal::TrendStrongGrowth, format!("Sales grew +{trend:.1}% ({window}d vs previous {window}d)"));
    }

    if a.margin < a.min_margin {
        card.push(
            Signal::MarginBelowFloor,
            format!("Margin {} is below the {} minimum", a.margin, a.min_margin),
        );
    }

    if a.sales_30d == 0 {
        card.push(
            Signal::NoSales,
            format!("No sales in the last {} days", policy.sales_window_days),
        );
    }

    card
}

/// A price change worth putting in front of a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceProposal {
    pub product_id: ProductId,
    pub direction: Direction,
    pub score_up: f64,
    pub score_down: f64,
    pub factors: Vec<String>,
    pub current_price: Money,
    pub recommended_price: Money,
    /// Realized change after floor and rounding.
    pub change_pct: Percent,
    /// Magnitude the score asked for, before floor and rounding.
    pub scored_change: Percent,
    pub floor_applied: bool,
}

/// Score a product and derive the recommended price.
///
/// Returns `None` when no side wins, or when the rounded price ends up too close
/// to (or on the wrong side of) the current one. The margin floor always wins
/// over the scored magnitude.
pub fn propose(a: &PriceAnalysis, policy: &ScoringPolicy) -> Option<PriceProposal> {
    let current = a.current_price;
    if !current.is_positive() {
        return None;
    }

    let card = score(a, policy);
    let (direction, winning) = card.direction(policy.min_winning_score)?;

    let magnitude = Percent::from_f64(winning * policy.pct_per_point).min(policy.max_change);
    let signed = match direction {
        Direction::Up => magnitude,
        Direction::Down => magnitude.neg(),
    };

    let raw = current.adjust_by(signed);
    let floor = a.margin_floor;
    let floor_applied = raw < floor;
    let mut recommended = psychological_round(raw.max(floor));
    if recommended < floor {
        recommended = psychological_ceil(floor);
    }

    let moved = match direction {
        Direction::Up => recommended > current,
        Direction::Down => recommended < current,
    };
    if !moved || below_min_change(current, recommended, policy.min_change) {
        return None;
    }

    Some(PriceProposal {
        product_id: a.product_id,
        direction,
        score_up: card.score_up,
        score_down: card.score_down,
        factors: card.factors.into_iter().map(|f| f.description).collect(),
        current_price: current,
        recommended_price: recommended,
        change_pct: Percent::change(current, recommended),
        scored_change: signed,
        floor_applied,
    })
}

fn below_min_change(current: Money, recommended: Money, min_change: Percent) -> bool {
    let diff = (recommended.minor() as i128 - current.minor() as i128).abs();
    diff * 10_000 < min_change.bp() as i128 * current.minor() as i128
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn analysis(price: i64, cost: i64, days: f64, trend: f64, sales_30d: i64) -> PriceAnalysis {
        let current_price = Money::from_major(price);
        let cost_price = Money::from_major(cost);
        let min_margin = Percent::from_whole(20);
        PriceAnalysis {
            product_id: ProductId::new(1),
            offer_id: "SKU-1".to_string(),
            name: "Kettle".to_string(),
            current_price,
            cost_price,
            min_margin,
            margin: Percent::margin(current_price, cost_price),
            margin_floor: cost_price.with_markup_ceil(min_margin),
            current_stock: 10,
            days_of_stock: days,
            sales_30d,
            revenue_30d: Money::ZERO,
            trend_pct: trend,
        }
    }

    #[test]
    fn deficit_alone_scores_two_up() {
        let card = score(&analysis(1000, 500, 2.0, 0.0, 30), &ScoringPolicy::default());
        assert_eq!(card.score_up, 2.0);
        assert_eq!(card.score_down, 0.0);
        assert!(card.has(Signal::StockDeficit));
        assert_eq!(card.direction(2.0), Some((Direction::Up, 2.0)));
    }

    #[test]
    fn stock_band_edges_follow_the_table() {
        let p = ScoringPolicy::default();
        assert!(score(&analysis(1000, 500, 7.0, 0.0, 30), &p).has(Signal::StockLow));
        assert!(score(&analysis(1000, 500, 14.0, 0.0, 30), &p).factors.is_empty());
        assert!(score(&analysis(1000, 500, 60.0, 0.0, 30), &p).factors.is_empty());
        assert!(score(&analysis(1000, 500, 90.0, 0.0, 30), &p).has(Signal::StockHigh));
        assert!(score(&analysis(1000, 500, 90.5, 0.0, 30), &p).has(Signal::StockExcess));
    }

    #[test]
    fn trend_band_edges_follow_the_table() {
        let p = ScoringPolicy::default();
        let sig = |t: f64| score(&analysis(1000, 500, 30.0, t, 30), &p).factors.first().map(|f| f.signal);
        assert_eq!(sig(-50.1), Some(Signal::TrendCollapse));
        assert_eq!(sig(-50.0), Some(Signal::TrendStrongDrop));
        assert_eq!(sig(-30.0), Some(Signal::TrendMildDrop));
        assert_eq!(sig(-15.0), None);
        assert_eq!(sig(30.0), None);
        assert_eq!(sig(30.1), Some(Signal::TrendStrongGrowth));
        assert_eq!(sig(50.0), Some(Signal::TrendStrongGrowth));
        assert_eq!(sig(50.1), Some(Signal::TrendExplosiveGrowth));
    }

    #[test]
    fn strong_growth_alone_is_not_actionable() {
        let card = score(&analysis(1000, 500, 30.0, 40.0, 30), &ScoringPolicy::default());
        assert_eq!(card.score_up, 1.5);
        assert_eq!(card.direction(2.0), None);
    }

    #[test]
    fn tied_scores_give_no_direction() {
        // deficit (+2 up) vs strong drop (+2 down)
        let card = score(&analysis(1000, 500, 2.0, -40.0, 30), &ScoringPolicy::default());
        assert_eq!(card.score_up, card.score_down);
        assert_eq!(card.direction(2.0), None);
        assert!(propose(&analysis(1000, 500, 2.0, -40.0, 30), &ScoringPolicy::default()).is_none());
    }

    #[test]
    fn deficit_on_a_price_rounding_within_reach_goes_up() {
        // 1350 × 1.10 = 1485 → 1490
        let p = propose(&analysis(1350, 500, 2.0, 0.0, 30), &ScoringPolicy::default()).unwrap();
        assert_eq!(p.direction, Direction::Up);
        assert_eq!(p.scored_change, Percent::from_whole(10));
        assert_eq!(p.recommended_price, Money::from_major(1490));
        assert!(!p.floor_applied);
    }

    #[test]
    fn rounding_against_the_direction_is_dropped() {
        // 1000 × 1.10 = 1100 rounds to 990 on the 500 grid: below current, so nothing.
        assert!(propose(&analysis(1000, 500, 2.0, 0.0, 30), &ScoringPolicy::default()).is_none());
    }

    #[test]
    fn excess_plus_collapse_goes_down_fifteen_percent() {
        let p = propose(&analysis(1000, 500, 120.0, -60.0, 30), &ScoringPolicy::default()).unwrap();
        assert_eq!(p.score_down, 5.0);
        assert_eq!(p.direction, Direction::Down);
        assert_eq!(p.scored_change, Percent::from_whole(-15));
        // 850 → 890, floor 600 not hit
        assert_eq!(p.recommended_price, Money::from_major(890));
        assert_eq!(p.change_pct, Percent::from_whole(-11));
        assert!(!p.floor_applied);
    }

    #[test]
    fn margin_floor_beats_scored_magnitude() {
        // floor = 800 × 1.2 = 960; 1000 × 0.85 = 850 → floored at 960 → 990 → below 3%
        assert!(propose(&analysis(1000, 800, 120.0, -60.0, 30), &ScoringPolicy::default()).is_none());

        // floor = 700 × 1.2 = 840; 990 × 0.85 = 841.5 → 890 (> floor)
        let p = propose(&analysis(990, 700, 120.0, -60.0, 30), &ScoringPolicy::default()).unwrap();
        assert!(p.recommended_price >= Money::from_major(840));
    }

    #[test]
    fn no_sales_at_margin_floor_is_held_by_the_floor() {
        // margin exactly 20%; floor = 480 × 1.2 = 576
        let a = analysis(600, 480, 30.0, 0.0, 0);
        assert_eq!(a.margin, Percent::from_whole(20));
        let card = score(&a, &ScoringPolicy::default());
        assert_eq!((card.score_up, card.score_down), (0.0, 2.0));
        // 540 is floored to 576, rounds to 590: under 3%, dropped
        assert!(propose(&a, &ScoringPolicy::default()).is_none());
    }

    #[test]
    fn empty_shelf_is_not_excess_stock() {
        let mut a = analysis(1000, 500, f64::INFINITY, 0.0, 30);
        a.current_stock = 0;
        let card = score(&a, &ScoringPolicy::default());
        assert!(!card.has(Signal::StockExcess));
        assert!(!card.has(Signal::StockHigh));

        a.current_stock = 5;
        assert!(score(&a, &ScoringPolicy::default()).has(Signal::StockExcess));
    }

    #[test]
    fn zero_cost_is_a_full_margin() {
        let a = analysis(1350, 0, 30.0, 0.0, 30);
        assert_eq!(a.margin, Percent::from_whole(100));
        let card = score(&a, &ScoringPolicy::default());
        assert!(!card.has(Signal::MarginBelowFloor));
        assert!(card.factors.is_empty());
        assert!(propose(&a, &ScoringPolicy::default()).is_none());
    }

    #[test]
    fn no_sales_with_healthy_margin_goes_down_ten_percent() {
        let p = propose(&analysis(890, 300, 30.0, 0.0, 0), &ScoringPolicy::default()).unwrap();
        assert_eq!(p.score_down, 2.0);
        assert_eq!(p.scored_change, Percent::from_whole(-10));
        // 801 → 790
        assert_eq!(p.recommended_price, Money::from_major(790));
    }

    #[test]
    fn zero_price_never_recommends() {
        assert!(propose(&analysis(0, 0, 2.0, 80.0, 30), &ScoringPolicy::default()).is_none());
    }

    #[test]
    fn policy_validation_catches_inverted_bands() {
        let bad = ScoringPolicy {
            low_days: 5.0,
            ..ScoringPolicy::default()
        };
        assert!(bad.validate().is_err());
        assert!(ScoringPolicy::default().validate().is_ok());
    }

    fn arb_analysis() -> impl Strategy<Value = PriceAnalysis> {
        (
            1i64..5_000_000,
            0i64..6_000_000,
            0i64..5_000,
            prop_oneof![Just(f64::INFINITY), 0.0f64..400.0],
            -100.0f64..300.0,
            0i64..3,
        )
            .prop_map(|(price, cost, margin_bp, days, trend, sales)| {
                let current_price = Money::from_minor(price);
                let cost_price = Money::from_minor(cost);
                let min_margin = Percent::from_bp(margin_bp);
                PriceAnalysis {
                    product_id: ProductId::new(1),
                    offer_id: "SKU".to_string(),
                    name: "P".to_string(),
                    current_price,
                    cost_price,
                    min_margin,
                    margin: Percent::margin(current_price, cost_price),
                    margin_floor: cost_price.with_markup_ceil(min_margin),
                    current_stock: 1,
                    days_of_stock: days,
                    sales_30d: sales,
                    revenue_30d: Money::ZERO,
                    trend_pct: trend,
                }
            })
    }

    mod proptests {
        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 1000, .. ProptestConfig::default() })]

            #[test]
            fn direction_never_contradicts_scores(a in arb_analysis()) {
                if let Some(p) = propose(&a, &ScoringPolicy::default()) {
                    match p.direction {
                        Direction::Up => {
                            prop_assert!(p.score_up > p.score_down);
                            prop_assert!(p.recommended_price > p.current_price);
                        }
                        Direction::Down => {
                            prop_assert!(p.score_down > p.score_up);
                            prop_assert!(p.recommended_price < p.current_price);
                        }
                    }
                }
            }

            #[test]
            fn recommendations_respect_margin_floor(a in arb_analysis()) {
                if let Some(p) = propose(&a, &ScoringPolicy::default()) {
                    // price × 10_000 ≥ cost × (10_000 + min_margin_bp)
                    let lhs = p.recommended_price.minor() as i128 * 10_000;
                    let rhs = a.cost_price.minor() as i128 * (10_000 + a.min_margin.bp() as i128);
                    prop_assert!(lhs >= rhs);
                }
            }

            #[test]
            fn small_changes_are_suppressed(a in arb_analysis()) {
                if let Some(p) = propose(&a, &ScoringPolicy::default()) {
                    let diff = (p.recommended_price.minor() - p.current_price.minor()).abs() as i128;
                    prop_assert!(diff * 100 >= 3 * p.current_price.minor() as i128);
                }
            }

            #[test]
            fn scored_magnitude_is_capped(a in arb_analysis()) {
                if let Some(p) = propose(&a, &ScoringPolicy::default()) {
                    prop_assert!(p.scored_change.abs() <= Percent::from_whole(15));
                }
            }
        }
    }
}
