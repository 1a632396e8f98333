//! Authentication and authorization
//!
//! # Modules
//!
//! - [`session`]: Opaque session tokens and the [`SessionStore`] trait
//! - [`authorization`]: Membership roles, the action policy and member management
//!
//! A request is handled as token → [`SessionStore::validate`] → user id →
//! [`Authorizer::require`] against the project that owns the addressed
//! entity.

pub mod authorization;
pub mod session;

pub use authorization::{Action, Authorizer, Decision};
pub use session::{PgSessionStore, SessionIdentity, SessionStore};
