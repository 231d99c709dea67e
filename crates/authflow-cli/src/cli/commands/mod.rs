//! CLI command handlers.

pub mod auth;
pub mod config;
