//! # Taskboard Worker Library
//!
//! Background maintenance for a Taskboard deployment.
//!
//! ## Modules
//!
//! - `sweeper`: periodic purge of expired sessions

pub mod sweeper;
