//! HTTP request handlers, grouped by resource.

pub mod auth;
pub mod workflow_instance;
pub mod workflow_template;
