//! Shared primitive types used across the analytics core.

/// A stable, unique identifier for an entity.
///
/// Source data encodes these as either integers or numeric strings
/// depending on the export path, so the canonical form is a string.
/// Use [`crate::record::same_entity`] for comparisons — never `==`.
pub type EntityId = String;
