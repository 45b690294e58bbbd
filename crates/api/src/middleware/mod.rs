//! Request middleware: authentication and capability extractors.

pub mod auth;
pub mod rbac;
