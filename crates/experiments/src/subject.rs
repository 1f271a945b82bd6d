use serde::{Deserialize, Serialize};

use pricepilot_analytics::ExperimentKind;
use pricepilot_core::{CampaignId, DomainError, DomainResult, Money, ProductId, RecommendationId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentField {
    Name,
    Description,
}

impl ContentField {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentField::Name => "name",
            ContentField::Description => "description",
        }
    }
}

impl core::fmt::Display for ContentField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ContentField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" | "title" => Ok(ContentField::Name),
            "description" => Ok(ContentField::Description),
            other => Err(DomainError::validation(format!("unknown content field '{other}'"))),
        }
    }
}

/// Campaign-level change under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdAction {
    Activate,
    Deactivate,
    ChangeBid {
        /// Bid before the change; without it the change cannot be reverted.
        old_bid: Option<Money>,
        new_bid: Money,
    },
}

impl AdAction {
    pub fn name(&self) -> &'static str {
        match self {
            AdAction::Activate => "activate",
            AdAction::Deactivate => "deactivate",
            AdAction::ChangeBid { .. } => "change_bid",
        }
    }

    /// The action that undoes this one, if it can be undone.
    pub fn inverse(&self) -> Option<AdAction> {
        match self {
            AdAction::Activate => Some(AdAction::Deactivate),
            AdAction::Deactivate => Some(AdAction::Activate),
            AdAction::ChangeBid { old_bid, new_bid } => old_bid.map(|old| AdAction::ChangeBid {
                old_bid: Some(*new_bid),
                new_bid: old,
            }),
        }
    }
}

/// What an experiment changed, with the values on both sides of the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExperimentSubject {
    Price {
        product_id: ProductId,
        old_price: Money,
        new_price: Money,
        /// Set when the experiment was spawned by an applied recommendation.
        recommendation_id: Option<RecommendationId>,
    },
    Content {
        product_id: ProductId,
        field: ContentField,
        old_value: String,
        new_value: String,
    },
    Ad {
        campaign_id: CampaignId,
        product_id: Option<ProductId>,
        action: AdAction,
    },
}

/// Exclusivity slot: at most one open experiment per `(target, field)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub target: String,
    pub field: String,
}

impl core::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.target, self.field)
    }
}

impl ExperimentSubject {
    pub fn kind(&self) -> ExperimentKind {
        match self {
            ExperimentSubject::Price { .. } => ExperimentKind::Price,
            ExperimentSubject::Content { .. } => ExperimentKind::Content,
            ExperimentSubject::Ad { .. } => ExperimentKind::Ad,
        }
    }

    /// Product the experiment touches, when it touches one.
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            ExperimentSubject::Price { product_id, .. } | ExperimentSubject::Content { product_id, .. } => {
                Some(*product_id)
            }
            ExperimentSubject::Ad { product_id, .. } => *product_id,
        }
    }

    pub fn recommendation_id(&self) -> Option<RecommendationId> {
        match self {
            ExperimentSubject::Price { recommendation_id, .. } => *recommendation_id,
            _ => None,
        }
    }

    /// Ad experiments are keyed on the campaign: activation state is one slot,
    /// each product bid is another.
    pub fn slot(&self) -> SlotKey {
        match self {
            ExperimentSubject::Price { product_id, .. } => SlotKey {
                target: format!("product:{product_id}"),
                field: "price".to_string(),
            },
            ExperimentSubject::Content { product_id, field, .. } => SlotKey {
                target: format!("product:{product_id}"),
                field: field.as_str().to_string(),
            },
            ExperimentSubject::Ad {
                campaign_id,
                product_id,
                action,
            } => SlotKey {
                target: format!("campaign:{campaign_id}"),
                field: match action {
                    AdAction::ChangeBid { .. } => match product_id {
                        Some(p) => format!("bid:{p}"),
                        None => "bid".to_string(),
                    },
                    _ => "state".to_string(),
                },
            },
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self {
            ExperimentSubject::Price {
                old_price, new_price, ..
            } => {
                if !old_price.is_positive() || !new_price.is_positive() {
                    return Err(DomainError::validation("prices must be positive"));
                }
                if old_price == new_price {
                    return Err(DomainError::validation("new price equals old price"));
                }
            }
            ExperimentSubject::Content {
                old_value, new_value, ..
            } => {
                if new_value.trim().is_empty() {
                    return Err(DomainError::validation("new content value must not be empty"));
                }
                if old_value == new_value {
                    return Err(DomainError::validation("new content value equals old value"));
                }
            }
            ExperimentSubject::Ad { action, .. } => {
                if let AdAction::ChangeBid { old_bid, new_bid } = action {
                    if !new_bid.is_positive() || old_bid.is_some_and(|b| !b.is_positive()) {
                        return Err(DomainError::validation("bids must be positive"));
                    }
                    if *old_bid == Some(*new_bid) {
                        return Err(DomainError::validation("new bid equals old bid"));
                    }
                }
            }
        }
        Ok(())
    }

    /// The change that restores the pre-experiment value.
    pub fn reverted(&self) -> Option<ExperimentSubject> {
        match self {
            ExperimentSubject::Price {
                product_id,
                old_price,
                new_price,
                recommendation_id,
            } => Some(ExperimentSubject::Price {
                product_id: *product_id,
                old_price: *new_price,
                new_price: *old_price,
                recommendation_id: *recommendation_id,
            }),
            ExperimentSubject::Content {
                product_id,
                field,
                old_value,
                new_value,
            } => Some(ExperimentSubject::Content {
                product_id: *product_id,
                field: *field,
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            }),
            ExperimentSubject::Ad {
                campaign_id,
                product_id,
                action,
            } => action.inverse().map(|action| ExperimentSubject::Ad {
                campaign_id: campaign_id.clone(),
                product_id: *product_id,
                action,
            }),
        }
    }

    /// Short human description, e.g. `price 1000.00 → 890.00`.
    pub fn describe(&self) -> String {
        match self {
            ExperimentSubject::Price {
                old_price, new_price, ..
            } => format!("price {old_price} → {new_price}"),
            ExperimentSubject::Content { field, .. } => format!("content {field} rewrite"),
            ExperimentSubject::Ad {
                campaign_id, action, ..
            } => match action {
                AdAction::ChangeBid { old_bid, new_bid } => match old_bid {
                    Some(old) => format!("campaign {campaign_id} bid {old} → {new_bid}"),
                    None => format!("campaign {campaign_id} bid → {new_bid}"),
                },
                other => format!("campaign {campaign_id} {}", other.name()),
            },
        }
    }
}
