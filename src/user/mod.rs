mod builder;
mod email;
mod manager;
mod postgres;
mod repository;

pub use builder::*;
pub use email::*;
pub use manager::*;
pub use postgres::*;
pub use repository::*;

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::crypto::PasswordHash;

/// User as saved on database.
///
/// Only [`UserBuilder`] creates new values, which requires a
/// [`PasswordHash`] up front.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct User {
    /// Assigned by the store on first save.
    pub id: Option<i64>,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip)]
    pub(crate) password_hash: PasswordHash,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_admin: bool,
    pub is_superuser: bool,
    pub groups: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl User {
    /// Start building a new [`User`].
    pub fn builder() -> UserBuilder<Missing, Missing> {
        UserBuilder::new()
    }

    /// Staff capability is granted by the admin flag.
    pub fn is_staff(&self) -> bool {
        self.is_admin
    }

    pub fn password_hash(&self) -> &PasswordHash {
        &self.password_hash
    }

    pub fn has_usable_password(&self) -> bool {
        self.password_hash.is_usable()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.email)
    }
}
