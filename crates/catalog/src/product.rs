use serde::{Deserialize, Serialize};

use pricepilot_core::{DomainError, DomainResult, Entity, Money, Percent, ProductId};

/// Minimum acceptable margin applied when the catalog does not specify one.
pub const DEFAULT_MIN_MARGIN: Percent = Percent::from_whole(20);

/// Catalog product as synced from the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Seller SKU.
    pub offer_id: String,
    pub name: String,
    pub price: Money,
    /// Previous / crossed-out price shown next to the current one.
    #[serde(default)]
    pub old_price: Option<Money>,
    #[serde(default)]
    pub cost_price: Money,
    #[serde(default = "default_min_margin")]
    pub min_margin: Percent,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_min_margin() -> Percent {
    DEFAULT_MIN_MARGIN
}

fn default_active() -> bool {
    true
}

impl Product {
    pub fn new(
        id: ProductId,
        offer_id: impl Into<String>,
        name: impl Into<String>,
        price: Money,
        cost_price: Money,
    ) -> DomainResult<Self> {
        let product = Self {
            id,
            offer_id: offer_id.into(),
            name: name.into(),
            price,
            old_price: None,
            cost_price,
            min_margin: DEFAULT_MIN_MARGIN,
            category: None,
            active: true,
        };
        product.validate()?;
        Ok(product)
    }

    pub fn with_min_margin(mut self, min_margin: Percent) -> Self {
        self.min_margin = min_margin;
        self
    }

    pub fn with_old_price(mut self, old_price: Money) -> Self {
        self.old_price = Some(old_price);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Checks the invariants the sync collaborator must uphold.
    pub fn validate(&self) -> DomainResult<()> {
        if self.offer_id.trim().is_empty() {
            return Err(DomainError::validation("offer_id cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.price.is_negative() {
            return Err(DomainError::validation("price cannot be negative"));
        }
        if self.cost_price.is_negative() {
            return Err(DomainError::validation("cost_price cannot be negative"));
        }
        if self.old_price.is_some_and(Money::is_negative) {
            return Err(DomainError::validation("old_price cannot be negative"));
        }
        if self.min_margin.bp() < 0 {
            return Err(DomainError::validation("min_margin cannot be negative"));
        }
        Ok(())
    }

    /// Current gross margin; zero without a positive price, 100% at zero cost.
    pub fn margin(&self) -> Percent {
        Percent::margin(self.price, self.cost_price)
    }

    /// Lowest price that still honours `min_margin` over cost.
    pub fn margin_floor(&self) -> Money {
        self.cost_price.with_markup_ceil(self.min_margin)
    }

    pub fn is_below_margin_floor(&self) -> bool {
        self.margin() < self.min_margin
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
