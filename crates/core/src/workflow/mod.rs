//! The workflow graph engine's pure parts.
//!
//! `graph` holds the template's in-memory model, `validator` the static
//! structural checks that gate activation, `condition` the clause
//! evaluation used for conditional routing, `routing` the outgoing-edge
//! selection shared by validator previews and the runtime engine,
//! `eligibility` the role/department assignment rules, and `branch` the
//! dotted branch-id scheme that fork/join lineage is tracked with.

pub mod branch;
pub mod condition;
pub mod eligibility;
pub mod graph;
pub mod routing;
pub mod validator;
