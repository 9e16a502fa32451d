use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ChangeForm, load};
use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::User;

/// Password change form.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, message = "This field is required."))]
    password1: String,
    #[validate(must_match(
        other = "password1",
        message = "Passwords don't match"
    ))]
    password2: String,
}

/// Handler to replace a password.
pub async fn handler(
    State(state): State<AppState>,
    Extension(staff): Extension<User>,
    Path(id): Path<i64>,
    Valid(body): Valid<Body>,
) -> Result<Json<ChangeForm>> {
    let user = load(&state, id).await?;
    let user = state.users.set_password(user, Some(&body.password1)).await?;

    tracing::info!(staff_id = ?staff.id, user_id = ?user.id, "password changed from admin");

    Ok(Json(user.into()))
}
