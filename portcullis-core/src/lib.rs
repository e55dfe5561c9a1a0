//! Core functionality for the portcullis project
//!
//! This crate contains the domain types, the storage interfaces and the services that implement
//! login, abuse protection and the access/refresh token lifecycle.
//!
//! - [`services::AuthService`] orchestrates login, refresh, logout and authorization checks.
//! - [`services::AbuseGuard`] tracks failed attempts, locks usernames and blocks origins.
//! - [`token::TokenIssuer`] signs and verifies access and refresh tokens.
//! - [`services::RevocationStore`] keeps the JTI blacklist.
//!
//! Storage is abstracted behind [`repositories::UserRepository`] for the user directory and
//! [`repositories::CounterStore`] for ephemeral counters and flags. Storage backends implement
//! [`repositories::RepositoryProvider`].
//!
//! This crate is meant to be used through the `portcullis` facade; storage backends depend on it
//! directly.
pub mod config;
pub mod crypto;
pub mod error;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod tasks;
pub mod token;
pub mod user;
pub mod validation;

pub use config::{AbuseGuardConfig, AuthConfig, BackgroundConfig};
pub use error::{Error, ErrorKind};
pub use repositories::{CounterStore, RepositoryProvider, UserRepository};
pub use services::{AbuseGuard, AuthService, LoginResponse, RevocationStore};
pub use storage::MemoryCounterStore;
pub use token::{TokenClaims, TokenConfig, TokenIssuer, TokenKind, TokenPair};
pub use user::{Role, RoleId, User, UserAccess, UserId};
pub use validation::LoginRequest;
