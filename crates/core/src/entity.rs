//! Entity trait: identity + continuity across state changes.

/// Records with a stable identity (sales, layaways, orders, payments, log entries).
///
/// Stores key their collections by `Entity::id`, so upserting a changed record
/// replaces the previous version instead of duplicating it.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
