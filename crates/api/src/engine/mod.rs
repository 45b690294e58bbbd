//! Workflow execution engine.
//!
//! The executor advances instances through their template graph: it
//! resolves step completion into fired connections, derives branches at
//! forks, merges them at sync nodes, and records every handoff in the
//! append-only history.

pub mod executor;
