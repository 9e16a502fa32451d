//! User change form.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ChangeForm, load};
use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::{User, UserChanges};

/// Submitted change form. Unknown fields, such as a password, are ignored.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct Body {
    email: Option<String>,
    username: Option<String>,
    #[validate(length(max = 50))]
    first_name: Option<String>,
    #[validate(length(max = 50))]
    last_name: Option<String>,
    is_active: Option<bool>,
    is_admin: Option<bool>,
    is_superuser: Option<bool>,
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChangeForm>> {
    Ok(Json(load(&state, id).await?.into()))
}

pub async fn patch(
    State(state): State<AppState>,
    Extension(staff): Extension<User>,
    Path(id): Path<i64>,
    Valid(body): Valid<Body>,
) -> Result<Json<ChangeForm>> {
    let user = load(&state, id).await?;
    let user = state
        .users
        .update(user, UserChanges {
            email: body.email,
            username: body.username,
            first_name: body.first_name,
            last_name: body.last_name,
            is_active: body.is_active,
            is_admin: body.is_admin,
            is_superuser: body.is_superuser,
        })
        .await?;

    tracing::info!(staff_id = ?staff.id, user_id = ?user.id, "user changed from admin");

    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::router::tests::{ADMIN_EMAIL, ADMIN_PASSWORD, state_with_admin};
    use crate::user::NewUser;
    use crate::*;

    async fn jane(state: &AppState) -> User {
        state
            .users
            .create_user(NewUser {
                email: Some("jane@example.com".into()),
                password: Some("correct-horse-battery".into()),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_change_form_hides_password() {
        let (state, _) = state_with_admin().await;
        let user = jane(&state).await;

        let path = format!("/admin/users/{}", user.id.unwrap());
        let response = make_request(
            app(state),
            Method::GET,
            &path,
            Some((ADMIN_EMAIL, ADMIN_PASSWORD)),
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let raw = String::from_utf8(body.to_vec()).unwrap();
        assert!(!raw.contains(user.password_hash().as_str()));

        let body: ChangeForm = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.email, "jane@example.com");
        assert!(body.password.usable);
        assert_eq!(body.password.algorithm.as_deref(), Some("argon2id"));
        assert!(body.password.hash.unwrap().ends_with('*'));
    }

    #[tokio::test]
    async fn test_change_form_without_password() {
        let (state, _) = state_with_admin().await;
        let user = state
            .users
            .create_user(NewUser {
                email: Some("nopass@example.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let path = format!("/admin/users/{}", user.id.unwrap());
        let response = make_request(
            app(state),
            Method::GET,
            &path,
            Some((ADMIN_EMAIL, ADMIN_PASSWORD)),
            String::default(),
        )
        .await;

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: ChangeForm = serde_json::from_slice(&body).unwrap();
        assert!(!body.password.usable);
        assert_eq!(body.password.message.as_deref(), Some("No password set."));
    }

    #[tokio::test]
    async fn test_patch_ignores_password() {
        let (state, _) = state_with_admin().await;
        let user = jane(&state).await;

        let path = format!("/admin/users/{}", user.id.unwrap());
        let response = make_request(
            app(state.clone()),
            Method::PATCH,
            &path,
            Some((ADMIN_EMAIL, ADMIN_PASSWORD)),
            json!({
                "last_name": "Doe",
                "is_admin": true,
                "password": "overwritten",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: ChangeForm = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.last_name.as_deref(), Some("Doe"));
        assert!(body.is_admin);

        let stored = state.store.get_by_id(user.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.password_hash(), user.password_hash());
        assert!(state.auth.authenticate("jane@example.com", "overwritten").await.is_err());
    }

    #[tokio::test]
    async fn test_patch_with_taken_email() {
        let (state, _) = state_with_admin().await;
        let user = jane(&state).await;

        let path = format!("/admin/users/{}", user.id.unwrap());
        let response = make_request(
            app(state),
            Method::PATCH,
            &path,
            Some((ADMIN_EMAIL, ADMIN_PASSWORD)),
            json!({ "email": ADMIN_EMAIL.to_uppercase() }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_patch_with_long_name() {
        let (state, _) = state_with_admin().await;
        let user = jane(&state).await;

        let path = format!("/admin/users/{}", user.id.unwrap());
        let response = make_request(
            app(state),
            Method::PATCH,
            &path,
            Some((ADMIN_EMAIL, ADMIN_PASSWORD)),
            json!({ "first_name": "x".repeat(51) }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
