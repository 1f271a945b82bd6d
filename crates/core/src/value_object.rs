//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. `Money`
/// and `Percent` are the two used throughout the pricing core:
///
/// ```
/// use pricepilot_core::Money;
///
/// assert_eq!(Money::from_major(990), Money::from_minor(99_000));
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
