//! Users, roles and permissions
//!
//! This module contains the core user struct and the access model used by authorization checks.
//!
//! The core user struct is defined as follows:
//!
//! | Field           | Type       | Description                                            |
//! | --------------- | ---------- | ------------------------------------------------------ |
//! | `id`            | `UserId`   | Numeric identifier; zero is never a valid user.        |
//! | `username`      | `String`   | The login name of the user.                            |
//! | `fullname`      | `String`   | The display name of the user.                          |
//! | `email`         | `String`   | The email of the user.                                 |
//! | `password_hash` | `String`   | Argon2 PHC string. Never serialized.                   |
//! | `created_at`    | `DateTime` | The timestamp when the user was created.               |
//! | `updated_at`    | `DateTime` | The timestamp when the user was last updated.          |
//!
//! Roles and permissions are not attached to the user object. They are resolved separately into a
//! [`UserAccess`], which holds plain role identifiers and an index from role id to permission
//! codes.
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, error::ValidationError, error::utilities::RequiredFieldExt};

/// A unique, stable identifier for a specific user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    pub fn new(id: u64) -> Self {
        UserId(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Zero is reserved for "no user" and is rejected by authorization checks
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(UserId)
            .map_err(|_| ValidationError::InvalidUserId(s.to_string()))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Representation of a user as returned by the user directory.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub fullname: String,
    pub email: String,

    /// Snapshot of the stored password hash at lookup time.
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn builder() -> UserBuilder {
        UserBuilder::default()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("fullname", &self.fullname)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

#[derive(Default)]
pub struct UserBuilder {
    id: Option<UserId>,
    username: Option<String>,
    fullname: Option<String>,
    email: Option<String>,
    password_hash: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl UserBuilder {
    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn fullname(mut self, fullname: impl Into<String>) -> Self {
        self.fullname = Some(fullname.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn password_hash(mut self, password_hash: impl Into<String>) -> Self {
        self.password_hash = Some(password_hash.into());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn build(self) -> Result<User, Error> {
        let now = Utc::now();
        let id = self.id.require_field("User ID")?;
        if !id.is_valid() {
            return Err(ValidationError::InvalidUserId("0".to_string()).into());
        }

        Ok(User {
            id,
            username: self.username.require_field("Username")?,
            fullname: self.fullname.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            password_hash: self.password_hash.require_field("Password hash")?,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        })
    }
}

/// Identifier of a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub code: String,
    /// Grants every permission without consulting the permission index.
    pub full_access: bool,
}

/// The roles of a user plus the permission codes attached to each role.
///
/// Built from an explicit join at query time; roles do not point back at users and permissions do
/// not point back at roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccess {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: HashMap<RoleId, BTreeSet<String>>,
}

impl UserAccess {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            roles: Vec::new(),
            permissions: HashMap::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.permissions.entry(role.id).or_default();
        self.roles.push(role);
        self
    }

    pub fn with_permission(mut self, role_id: RoleId, code: impl Into<String>) -> Self {
        self.permissions
            .entry(role_id)
            .or_default()
            .insert(code.into());
        self
    }

    pub fn has_full_access(&self) -> bool {
        self.roles.iter().any(|role| role.full_access)
    }

    /// Exact-match permission check across all of the user's roles.
    pub fn grants(&self, permission_code: &str) -> bool {
        if self.has_full_access() {
            return true;
        }

        self.roles.iter().any(|role| {
            self.permissions
                .get(&role.id)
                .is_some_and(|codes| codes.contains(permission_code))
        })
    }
}

impl Default for UserId {
    fn default() -> Self {
        UserId(0)
    }
}
