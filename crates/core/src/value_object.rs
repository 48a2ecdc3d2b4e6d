//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and defined entirely by their attribute
/// values: two instances with the same values are the same value. To
/// "modify" one, construct a new one. Contrast with [`crate::Entity`],
/// where identity persists across state changes.
///
/// The supertraits encode the contract: cheap to copy around (`Clone`),
/// compared by value (`PartialEq`), debuggable (`Debug`).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
