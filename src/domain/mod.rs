//! Domain layer types and invariants.

pub mod orders;
pub mod validation;
