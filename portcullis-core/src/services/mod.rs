//! Service layer for business logic
//!
//! This module contains the services behind login, token lifecycle and authorization.

pub mod abuse_guard;
pub mod auth;
pub mod revocation;

pub use abuse_guard::{AbuseGuard, FailureOutcome, OriginBlock};
pub use auth::{AuthService, LoginResponse};
pub use revocation::RevocationStore;
