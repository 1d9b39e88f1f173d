//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; two
/// `Money` amounts of 100 are the same amount regardless of where they came from.
/// To "modify" one, build a new value.
///
/// ```ignore
/// let a = Money::from_cents(100);
/// let b = Money::from_cents(60) + Money::from_cents(40);
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
