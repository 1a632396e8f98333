//! # Taskboard Shared Library
//!
//! Access control and sibling ordering for the Taskboard Kanban backend.
//! Users belong to projects through memberships; projects own boards, boards
//! own ordered columns and columns own ordered tasks.
//!
//! ## Module Organization
//!
//! - `config`: Environment-driven configuration
//! - `error`: The error taxonomy shared by every operation
//! - `db`: Connection pool, migrations and transaction helpers
//! - `models`: Database models and their queries
//! - `auth`: Session store and membership authorizer
//! - `ordering`: Pure position arithmetic for sibling sets
//! - `hierarchy`: Project → Board → Column → Task repository
//! - `lifecycle`: Authorized task, board and project operations

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod lifecycle;
pub mod models;
pub mod ordering;

pub use error::{CoreError, CoreResult, ErrorKind};

/// Current version of the Taskboard shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
