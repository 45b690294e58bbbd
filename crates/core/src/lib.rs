//! Pure domain logic for the praxis workflow backend.
//!
//! This crate has zero internal dependencies so it can be used by the
//! persistence layer, the API layer, and any future tooling. It contains
//! the workflow graph model, the template validator, condition evaluation,
//! eligibility resolution, and the shared error/capability types.

pub mod capabilities;
pub mod error;
pub mod types;
pub mod workflow;
