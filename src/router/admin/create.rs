use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ChangeForm;
use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::{NewUser, User};

/// User creation form.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    email: String,
    username: Option<String>,
    #[validate(length(max = 50))]
    first_name: Option<String>,
    #[validate(length(max = 50))]
    last_name: Option<String>,
    #[validate(length(min = 1, message = "This field is required."))]
    password1: String,
    #[validate(must_match(
        other = "password1",
        message = "Passwords don't match"
    ))]
    password2: String,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Extension(staff): Extension<User>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<ChangeForm>)> {
    let user = state
        .users
        .create_user(NewUser {
            email: Some(body.email),
            username: body.username,
            first_name: body.first_name,
            last_name: body.last_name,
            password: Some(body.password1),
        })
        .await?;

    tracing::info!(staff_id = ?staff.id, user_id = ?user.id, "user added from admin");

    Ok((StatusCode::CREATED, Json(user.into())))
}
