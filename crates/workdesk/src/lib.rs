//! Workdesk core
//!
//! Access control and consistency layer for the Workdesk productivity
//! backend, together with the resource services and HTTP routes built on it.
//!
//! # Features
//! - Ownership, sharing and participation checks for every resource type
//! - Document sharing grants with permission levels and expiry
//! - Folder hierarchy with materialized paths and in-memory tree building
//! - Per-user storage quota kept in step with file mutations
//! - Conversations with per-participant unread counters
//! - Teams, roles, permissions, calendar events and notifications

pub mod config;
pub mod db;
pub mod error;
pub mod id;
pub mod migrations;
pub mod models;
pub mod response;
pub mod routes;
pub mod security;
pub mod services;

#[cfg(test)]
mod test_support;

pub use config::CoreConfig;
pub use error::{AppError, AppResult};

/// Authenticated user ID from auth middleware
#[derive(Clone, Debug)]
pub struct AuthenticatedUserId(pub String);

impl AuthenticatedUserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
