//! Sanctioned construction and mutation of users.

use std::sync::Arc;

use crate::crypto::{CredentialHasher, PasswordHash};
use crate::error::{Result, ServerError, field_error};
use crate::user::{EmailAddress, User, UserStore, parse_username};

const MAX_NAME_LENGTH: usize = 50;

/// Check an optional first or last name, mapping blank values to `None`.
fn parse_name(
    field: &'static str,
    name: Option<String>,
) -> Result<Option<String>> {
    let name = name.filter(|n| !n.is_empty());
    if name.as_ref().is_some_and(|n| n.chars().count() > MAX_NAME_LENGTH) {
        return Err(field_error(
            field,
            "max_length",
            "Ensure this value has at most 50 characters.",
        )
        .into());
    }
    Ok(name)
}

/// Input of [`UserManager::create_user`].
#[derive(Debug, Default, Clone)]
pub struct NewUser {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

/// Profile fields editable after creation.
///
/// `None` leaves a field untouched. An empty `username` clears it.
#[derive(Debug, Default, Clone)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_superuser: Option<bool>,
}

/// User manager.
#[derive(Clone)]
pub struct UserManager {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
}

impl UserManager {
    /// Create a new [`UserManager`].
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self { store, hasher }
    }

    /// Hash `password`, or produce an unusable credential when it is absent.
    fn credential(&self, password: Option<&str>) -> Result<PasswordHash> {
        match password.filter(|p| !p.is_empty()) {
            Some(password) => Ok(self.hasher.hash(password)?),
            None => Ok(PasswordHash::unusable()),
        }
    }

    /// Create and persist a regular user.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Validation`] when `email` is missing or invalid.
    /// - [`ServerError::ConstraintViolation`] when email or username is taken.
    ///
    /// [`ServerError::Validation`]: crate::error::ServerError::Validation
    /// [`ServerError::ConstraintViolation`]: crate::error::ServerError::ConstraintViolation
    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        let email = EmailAddress::parse(new.email.as_deref().unwrap_or_default())?;
        let username = parse_username(new.username)?;
        let first_name = parse_name("first_name", new.first_name)?;
        let last_name = parse_name("last_name", new.last_name)?;
        let password = self.credential(new.password.as_deref())?;

        let user = User::builder()
            .email(email)
            .password(password)
            .username(username)
            .first_name(first_name)
            .last_name(last_name)
            .build();

        let user = self.store.save(user).await?;
        tracing::info!(user_id = ?user.id, "user created");

        Ok(user)
    }

    /// Create and persist a user holding every privilege.
    ///
    /// Unlike [`UserManager::create_user`], `password` is mandatory.
    pub async fn create_superuser(&self, new: NewUser) -> Result<User> {
        if new.password.as_deref().is_none_or(str::is_empty) {
            return Err(field_error(
                "password",
                "required",
                "Superusers must have a password.",
            )
            .into());
        }

        let mut user = self.create_user(new).await?;
        user.is_admin = true;
        user.is_superuser = true;

        let user = self.store.save(user).await?;
        tracing::info!(user_id = ?user.id, "superuser created");

        Ok(user)
    }

    /// Replace the credential of `user`.
    ///
    /// An absent or empty password makes the account unusable for login.
    pub async fn set_password(
        &self,
        user: User,
        password: Option<&str>,
    ) -> Result<User> {
        let id = user.id.ok_or(ServerError::NotFound)?;
        let hash = self.credential(password)?;

        let user = self.store.update_password(id, &hash).await?;
        tracing::info!(user_id = ?user.id, "password changed");

        Ok(user)
    }

    /// Apply profile and permission changes to `user`.
    ///
    /// The credential and `last_login` are never touched here.
    pub async fn update(&self, mut user: User, changes: UserChanges) -> Result<User> {
        if let Some(email) = changes.email {
            user.email = EmailAddress::parse(&email)?.into_inner();
        }
        if let Some(username) = changes.username {
            user.username = parse_username(Some(username))?;
        }
        if let Some(first_name) = changes.first_name {
            user.first_name = parse_name("first_name", Some(first_name))?;
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = parse_name("last_name", Some(last_name))?;
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        if let Some(is_admin) = changes.is_admin {
            user.is_admin = is_admin;
        }
        if let Some(is_superuser) = changes.is_superuser {
            user.is_superuser = is_superuser;
        }

        self.store.save(user).await
    }
}
