//! PostgreSQL implementation for user store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::crypto::PasswordHash;
use crate::error::{Result, ServerError};
use crate::user::{PAGE_SIZE, User, UserQuery, UserStore};

const USERNAME_CONSTRAINT: &str = "users_username_key";

const COLUMNS: &str = r#"id, email, username, first_name, last_name, password,
    created_at, updated_at, last_login, is_active, is_admin, is_superuser,
    groups, permissions"#;

/// User record as stored in the database.
#[derive(Debug, Clone, FromRow)]
struct UserRecord {
    id: i64,
    email: String,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    password: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
    is_active: bool,
    is_admin: bool,
    is_superuser: bool,
    groups: Vec<String>,
    permissions: Vec<String>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: Some(record.id),
            email: record.email,
            username: record.username,
            first_name: record.first_name,
            last_name: record.last_name,
            password_hash: PasswordHash::from_stored(record.password),
            created_at: record.created_at,
            updated_at: record.updated_at,
            last_login: record.last_login,
            is_active: record.is_active,
            is_admin: record.is_admin,
            is_superuser: record.is_superuser,
            groups: record.groups.into_iter().collect(),
            permissions: record.permissions.into_iter().collect(),
        }
    }
}

/// Unique index violations become [`ServerError::ConstraintViolation`].
fn constraint_error(err: sqlx::Error) -> ServerError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(USERNAME_CONSTRAINT) => "username",
                _ => "email",
            };
            return ServerError::ConstraintViolation { field };
        }
    }

    ServerError::Sql(err)
}

/// Escape `LIKE` wildcards of user input.
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// PostgreSQL user store.
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Create a new [`PostgresUserStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let query = format!(
            r#"SELECT {COLUMNS} FROM users
            WHERE LOWER(email) = LOWER($1) OR LOWER(username) = LOWER($1)
            ORDER BY (LOWER(email) = LOWER($1)) DESC
            LIMIT 1"#
        );

        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(identifier.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(User::from))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");

        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(User::from))
    }

    async fn save(&self, user: User) -> Result<User> {
        let groups = user.groups.iter().cloned().collect::<Vec<_>>();
        let permissions = user.permissions.iter().cloned().collect::<Vec<_>>();

        let record = match user.id {
            None => {
                let query = format!(
                    r#"INSERT INTO users (email, username, first_name, last_name,
                        password, created_at, updated_at, last_login, is_active,
                        is_admin, is_superuser, groups, permissions)
                    VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $9, $10, $11, $12)
                    RETURNING {COLUMNS}"#
                );

                sqlx::query_as::<_, UserRecord>(&query)
                    .bind(&user.email)
                    .bind(&user.username)
                    .bind(&user.first_name)
                    .bind(&user.last_name)
                    .bind(user.password_hash.as_str())
                    .bind(user.created_at)
                    .bind(user.last_login)
                    .bind(user.is_active)
                    .bind(user.is_admin)
                    .bind(user.is_superuser)
                    .bind(&groups)
                    .bind(&permissions)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(constraint_error)?
            },
            Some(id) => {
                let query = format!(
                    r#"UPDATE users
                    SET email = $2, username = $3, first_name = $4, last_name = $5,
                        updated_at = NOW(), is_active = $6, is_admin = $7,
                        is_superuser = $8, groups = $9, permissions = $10
                    WHERE id = $1
                    RETURNING {COLUMNS}"#
                );

                sqlx::query_as::<_, UserRecord>(&query)
                    .bind(id)
                    .bind(&user.email)
                    .bind(&user.username)
                    .bind(&user.first_name)
                    .bind(&user.last_name)
                    .bind(user.is_active)
                    .bind(user.is_admin)
                    .bind(user.is_superuser)
                    .bind(&groups)
                    .bind(&permissions)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(constraint_error)?
                    .ok_or(ServerError::NotFound)?
            },
        };

        Ok(record.into())
    }

    async fn list(&self, query: &UserQuery) -> Result<Vec<User>> {
        let sql = format!(
            r#"SELECT {COLUMNS} FROM users
            WHERE ($1::BOOLEAN IS NULL OR is_admin = $1)
                AND ($2::TEXT IS NULL OR last_name = $2)
                AND ($3::TEXT IS NULL
                    OR email ILIKE '%' || $3 || '%'
                    OR last_name ILIKE '%' || $3 || '%')
            ORDER BY LOWER(email) ASC, email ASC
            LIMIT $4 OFFSET $5"#
        );

        let records = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(query.is_admin)
            .bind(&query.last_name)
            .bind(query.search.as_deref().map(escape_like))
            .bind(PAGE_SIZE as i64)
            .bind(query.page as i64 * PAGE_SIZE as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(records.into_iter().map(User::from).collect())
    }

    async fn update_password(&self, id: i64, hash: &PasswordHash) -> Result<User> {
        let query = format!(
            r#"UPDATE users SET password = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}"#
        );

        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound)?;

        Ok(record.into())
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(r#"UPDATE users SET last_login = $1 WHERE id = $2"#)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound);
        }

        Ok(())
    }
}
