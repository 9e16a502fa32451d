//! User persistence port and its in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::crypto::PasswordHash;
use crate::error::{Result, ServerError};
use crate::user::User;

/// Rows per page on [`UserStore::list`].
pub const PAGE_SIZE: usize = 100;

/// Filters of the administration list view.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UserQuery {
    pub is_admin: Option<bool>,
    pub last_name: Option<String>,
    /// Case-insensitive substring matched on email or last name.
    pub search: Option<String>,
    /// Zero-based page index.
    pub page: u32,
}

impl UserQuery {
    fn offset(&self) -> usize {
        self.page as usize * PAGE_SIZE
    }
}

/// Port for user persistence.
///
/// Email and username are unique regardless of letter casing. Implementors
/// enforce it atomically in [`UserStore::save`].
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find the user whose email or username matches `identifier`.
    ///
    /// An email match wins over a username match on another record.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Insert a user without `id`, update it otherwise.
    ///
    /// An update never writes the password hash, `created_at` or
    /// `last_login`; the stored values are returned.
    ///
    /// # Errors
    ///
    /// [`ServerError::ConstraintViolation`] when email or username belongs
    /// to a different record.
    async fn save(&self, user: User) -> Result<User>;

    /// Only writes the password hash (and `updated_at`).
    async fn update_password(&self, id: i64, hash: &PasswordHash) -> Result<User>;

    /// Filtered page of users ordered by email.
    async fn list(&self, query: &UserQuery) -> Result<Vec<User>>;

    /// Only writes `last_login`.
    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Default)]
struct Records {
    users: BTreeMap<i64, User>,
    last_id: i64,
}

impl Records {
    fn conflict(&self, user: &User) -> Option<&'static str> {
        let email = user.email.to_lowercase();
        let username = user.username.as_ref().map(|u| u.to_lowercase());

        self.users
            .values()
            .filter(|other| other.id != user.id)
            .find_map(|other| {
                if other.email.to_lowercase() == email {
                    Some("email")
                } else if username.is_some()
                    && other.username.as_ref().map(|u| u.to_lowercase())
                        == username
                {
                    Some("username")
                } else {
                    None
                }
            })
    }
}

/// Process-local [`UserStore`].
///
/// Check and write happen under one lock, which makes it the uniqueness
/// boundary.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    records: RwLock<Records>,
}

impl MemoryUserStore {
    /// Create a new, empty [`MemoryUserStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let needle = identifier.trim().to_lowercase();
        let records = self.records.read().await;

        let by_email = records
            .users
            .values()
            .find(|user| user.email.to_lowercase() == needle);
        let found = by_email.or_else(|| {
            records.users.values().find(|user| {
                user.username.as_ref().map(|u| u.to_lowercase()).as_ref()
                    == Some(&needle)
            })
        });

        Ok(found.cloned())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.records.read().await.users.get(&id).cloned())
    }

    async fn save(&self, mut user: User) -> Result<User> {
        let mut records = self.records.write().await;

        if let Some(field) = records.conflict(&user) {
            return Err(ServerError::ConstraintViolation { field });
        }

        let id = match user.id {
            Some(id) => {
                let stored =
                    records.users.get(&id).ok_or(ServerError::NotFound)?;
                user.created_at = stored.created_at;
                user.last_login = stored.last_login;
                user.password_hash = stored.password_hash.clone();
                user.updated_at = Utc::now();
                id
            },
            None => {
                records.last_id += 1;
                user.id = Some(records.last_id);
                records.last_id
            },
        };

        records.users.insert(id, user.clone());

        Ok(user)
    }

    async fn list(&self, query: &UserQuery) -> Result<Vec<User>> {
        let search = query.search.as_ref().map(|s| s.to_lowercase());
        let records = self.records.read().await;

        let mut users = records
            .users
            .values()
            .filter(|user| {
                query.is_admin.is_none_or(|is_admin| user.is_admin == is_admin)
            })
            .filter(|user| {
                query.last_name.is_none()
                    || user.last_name.as_ref() == query.last_name.as_ref()
            })
            .filter(|user| {
                search.as_ref().is_none_or(|search| {
                    user.email.to_lowercase().contains(search)
                        || user
                            .last_name
                            .as_ref()
                            .is_some_and(|n| n.to_lowercase().contains(search))
                })
            })
            .cloned()
            .collect::<Vec<_>>();

        users.sort_by_cached_key(|user| {
            (user.email.to_lowercase(), user.email.clone())
        });

        Ok(users
            .into_iter()
            .skip(query.offset())
            .take(PAGE_SIZE)
            .collect())
    }

    async fn update_password(&self, id: i64, hash: &PasswordHash) -> Result<User> {
        let mut records = self.records.write().await;
        let user = records.users.get_mut(&id).ok_or(ServerError::NotFound)?;
        user.password_hash = hash.clone();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.write().await;
        let user = records.users.get_mut(&id).ok_or(ServerError::NotFound)?;
        user.last_login = Some(at);
        Ok(())
    }
}
