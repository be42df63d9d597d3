//! Domain layer - entities, value objects, and invariants.
//!
//! Nothing in here performs I/O.

pub mod budget;
pub mod extraction;
pub mod foundation;
pub mod group;
