use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a marketplace account, as vouched for by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" | "administrator" => Some(Self::Admin),
            "user" | "member" => Some(Self::User),
            _ => None,
        }
    }
}

/// Caller identity handed to the verification core by the authentication layer.
///
/// Nothing here authenticates anybody; the values are trusted as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::Admin,
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::User,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_owner_of(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    /// Owners may read their own data; administrators may read anyone's.
    pub fn can_view(&self, user_id: &UserId) -> bool {
        self.is_admin() || self.is_owner_of(user_id)
    }
}
