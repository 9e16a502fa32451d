//! Typed builder for User.

use std::collections::BTreeSet;

use crate::crypto::PasswordHash;
use crate::user::{EmailAddress, User};

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

/// [`User`] builder tracking presence of `Email` and `Credential`.
#[derive(Debug, Clone)]
pub struct UserBuilder<Email, Credential> {
    email: Email,
    credential: Credential,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl UserBuilder<Missing, Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            email: Missing,
            credential: Missing,
            username: None,
            first_name: None,
            last_name: None,
        }
    }
}

impl Default for UserBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Credential> UserBuilder<Missing, Credential> {
    /// Sets user email using [`EmailAddress`] value object.
    pub fn email(
        self,
        email: EmailAddress,
    ) -> UserBuilder<Present<EmailAddress>, Credential> {
        UserBuilder {
            email: Present(email),
            credential: self.credential,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }
}

impl<Email> UserBuilder<Email, Missing> {
    /// Sets the hashed password.
    pub fn password(
        self,
        password: PasswordHash,
    ) -> UserBuilder<Email, Present<PasswordHash>> {
        UserBuilder {
            email: self.email,
            credential: Present(password),
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }
}

impl<Email, Credential> UserBuilder<Email, Credential> {
    /// Update `username` field on [`UserBuilder`].
    pub fn username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    /// Update `first_name` field on [`UserBuilder`].
    pub fn first_name(mut self, first_name: Option<String>) -> Self {
        self.first_name = first_name;
        self
    }

    /// Update `last_name` field on [`UserBuilder`].
    pub fn last_name(mut self, last_name: Option<String>) -> Self {
        self.last_name = last_name;
        self
    }
}

impl UserBuilder<Present<EmailAddress>, Present<PasswordHash>> {
    /// Build an unsaved, active [`User`] without any privilege.
    pub fn build(self) -> User {
        let UserBuilder {
            email: Present(email),
            credential: Present(password_hash),
            username,
            first_name,
            last_name,
        } = self;

        let now = chrono::Utc::now();
        User {
            id: None,
            email: email.into_inner(),
            username,
            first_name,
            last_name,
            password_hash,
            created_at: now,
            updated_at: now,
            last_login: None,
            is_active: true,
            is_admin: false,
            is_superuser: false,
            groups: BTreeSet::new(),
            permissions: BTreeSet::new(),
        }
    }
}
