use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::user::User;

#[derive(Debug, Serialize, Deserialize)]
pub struct Body {
    /// Email or username.
    identifier: String,
    password: String,
}

/// Handler for login route.
pub async fn handler(
    State(state): State<AppState>,
    Json(body): Json<Body>,
) -> Result<Json<User>> {
    let mut user = state
        .auth
        .authenticate(&body.identifier, &body.password)
        .await?;

    if let Some(id) = user.id {
        let now = Utc::now();
        state.store.touch_last_login(id, now).await?;
        user.last_login = Some(now);
    }

    Ok(Json(user))
}
