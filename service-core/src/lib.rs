//! Shared foundation for the workspace services: error taxonomy,
//! environment configuration helpers, and tracing setup.

pub mod config;
pub mod error;
pub mod observability;
