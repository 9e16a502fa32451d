//! Administrative management of users.
//!
//! Every route requires HTTP Basic credentials of an active staff user.
mod change;
mod create;
mod list;
mod password;

use axum::extract::{Request, State};
use axum::http::header;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Router, middleware};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::PasswordSummary;
use crate::error::Result;
use crate::user::User;
use crate::{AppState, ServerError};

const BASIC: &str = "Basic";
/// Application checked with `has_module_permission`.
const APP_LABEL: &str = "accounts";

/// Split a `Basic` authorization value into identifier and password.
fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BASIC) {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (identifier, password) = decoded.split_once(':')?;

    Some((identifier.to_owned(), password.to_owned()))
}

/// Custom middleware for staff authentication.
async fn require_staff(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response> {
    let (identifier, password) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(parse_basic)
        .ok_or(ServerError::Unauthorized)?;

    let user = match state.auth.authenticate(&identifier, &password).await {
        Ok(user) => user,
        Err(ServerError::AuthenticationFailed) => {
            return Err(ServerError::Unauthorized);
        },
        Err(err) => return Err(err),
    };

    if !user.is_staff() || !state.auth.has_module_permission(&user, APP_LABEL)
    {
        tracing::warn!(user_id = ?user.id, "non-staff user denied admin access");
        return Err(ServerError::Forbidden);
    }

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

/// Load the user targeted by a route.
async fn load(state: &AppState, id: i64) -> Result<User> {
    state.store.get_by_id(id).await?.ok_or(ServerError::NotFound)
}

/// Every field of a user but the raw password.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeForm {
    pub id: Option<i64>,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub is_superuser: bool,
    pub groups: Vec<String>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub password: PasswordForm,
}

/// Read-only password widget.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct PasswordForm {
    pub usable: bool,
    pub algorithm: Option<String>,
    pub salt: Option<String>,
    pub hash: Option<String>,
    pub message: Option<String>,
}

impl From<PasswordSummary> for PasswordForm {
    fn from(summary: PasswordSummary) -> Self {
        Self {
            usable: summary.usable,
            algorithm: summary.algorithm,
            salt: summary.salt,
            hash: summary.hash,
            message: summary.message,
        }
    }
}

impl From<User> for ChangeForm {
    fn from(user: User) -> Self {
        Self {
            password: user.password_hash().summary().into(),
            created_at: user.created_at(),
            updated_at: user.updated_at(),
            last_login: user.last_login(),
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_active: user.is_active,
            is_admin: user.is_admin,
            is_superuser: user.is_superuser,
            groups: user.groups.into_iter().collect(),
            permissions: user.permissions.into_iter().collect(),
        }
    }
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /admin/users` goes to `list`, `POST /admin/users` to `create`.
        .route("/users", get(list::handler).post(create::handler))
        // `GET` and `PATCH /admin/users/{id}` go to the change form.
        .route("/users/{id}", get(change::get).patch(change::patch))
        // `POST /admin/users/{id}/password` goes to `password`.
        .route("/users/{id}/password", post(password::handler))
        .route_layer(middleware::from_fn_with_state(state, require_staff))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::router::tests::{ADMIN_EMAIL, ADMIN_PASSWORD, state_with_admin};
    use crate::user::NewUser;
    use crate::*;

    #[test]
    fn test_parse_basic() {
        let encoded = STANDARD.encode("jane@example.com:pa:ss");
        assert_eq!(
            parse_basic(&format!("Basic {encoded}")),
            Some(("jane@example.com".into(), "pa:ss".into()))
        );
        assert_eq!(
            parse_basic(&format!("basic {encoded}")).map(|(id, _)| id),
            Some("jane@example.com".into())
        );
        assert_eq!(parse_basic(&format!("Bearer {encoded}")), None);
        assert_eq!(parse_basic("Basic not-base64!"), None);
        assert_eq!(parse_basic(&format!("Basic {}", STANDARD.encode("x"))), None);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let (state, _) = state_with_admin().await;

        let response =
            make_request(app(state), Method::GET, "/admin/users", None, String::default())
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_wrong_credentials() {
        let (state, _) = state_with_admin().await;

        let response = make_request(
            app(state),
            Method::GET,
            "/admin/users",
            Some((ADMIN_EMAIL, "wrong")),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_non_staff_is_forbidden() {
        let (state, _) = state_with_admin().await;
        state
            .users
            .create_user(NewUser {
                email: Some("jane@example.com".into()),
                password: Some(ADMIN_PASSWORD.into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let response = make_request(
            app(state),
            Method::GET,
            "/admin/users",
            Some(("jane@example.com", ADMIN_PASSWORD)),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (state, _) = state_with_admin().await;

        let response = make_request(
            app(state),
            Method::GET,
            "/admin/users/404",
            Some((ADMIN_EMAIL, ADMIN_PASSWORD)),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
