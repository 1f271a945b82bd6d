//! Psychological price endings.
//!
//! | price (major units) | grid            | examples        |
//! |---------------------|-----------------|-----------------|
//! | < 100               | nearest 10 − 1  | 49, 59, 99      |
//! | < 1000              | nearest 100 − 10| 290, 890, 990   |
//! | otherwise           | nearest 500 − 10| 1490, 1990      |
//!
//! Halves round up.

use pricepilot_core::Money;

const SMALL_LIMIT: i64 = Money::from_major(100).minor();
const MEDIUM_LIMIT: i64 = Money::from_major(1000).minor();

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Grid {
    step: i64,
    offset: i64,
}

impl Grid {
    fn for_price(minor: i64) -> Self {
        if minor < SMALL_LIMIT {
            Grid { step: Money::from_major(10).minor(), offset: Money::from_major(1).minor() }
        } else if minor < MEDIUM_LIMIT {
            Grid { step: Money::from_major(100).minor(), offset: Money::from_major(10).minor() }
        } else {
            Grid { step: Money::from_major(500).minor(), offset: Money::from_major(10).minor() }
        }
    }

    fn nearest(self, minor: i64) -> i64 {
        let k = (minor + self.step / 2).div_euclid(self.step);
        k * self.step - self.offset
    }

    fn ceil(self, minor: i64) -> i64 {
        let k = (minor + self.offset + self.step - 1).div_euclid(self.step);
        k.max(1) * self.step - self.offset
    }

    /// Smallest grid price that still belongs to this grid's bucket.
    fn first(self) -> i64 {
        match self.step {
            s if s == Money::from_major(10).minor() => self.ceil(0),
            s if s == Money::from_major(100).minor() => self.ceil(SMALL_LIMIT),
            _ => self.ceil(MEDIUM_LIMIT),
        }
    }
}

/// Round to the nearest psychological price.
///
/// Prices so small that the nearest grid point is not positive go up instead.
pub fn psychological_round(price: Money) -> Money {
    let minor = price.minor();
    let rounded = Grid::for_price(minor).nearest(minor);
    if rounded <= 0 {
        return psychological_ceil(price);
    }
    Money::from_minor(rounded)
}

/// Smallest psychological price at or above `price`.
pub fn psychological_ceil(price: Money) -> Money {
    let minor = price.minor().max(0);
    let grid = Grid::for_price(minor);
    let candidate = grid.ceil(minor);
    let next = Grid::for_price(candidate);
    if next != grid {
        // Crossed into the next bucket: use its first ending instead.
        return Money::from_minor(next.first());
    }
    Money::from_minor(candidate)
}
