//! User list with filters and search.

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::user::{PAGE_SIZE, User, UserQuery};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Params {
    is_admin: Option<bool>,
    last_name: Option<String>,
    /// Searched in email and last name.
    q: Option<String>,
    page: Option<u32>,
}

/// A list row.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: Option<i64>,
    pub email: String,
    pub username: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_staff: bool,
    pub is_admin: bool,
    pub is_superuser: bool,
}

impl From<User> for Row {
    fn from(user: User) -> Self {
        Self {
            is_staff: user.is_staff(),
            created_at: user.created_at(),
            last_login: user.last_login(),
            id: user.id,
            email: user.email,
            username: user.username,
            last_name: user.last_name,
            first_name: user.first_name,
            is_admin: user.is_admin,
            is_superuser: user.is_superuser,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub page: u32,
    pub page_size: usize,
    pub users: Vec<Row>,
}

pub async fn handler(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Response>> {
    let query = UserQuery {
        is_admin: params.is_admin,
        last_name: params.last_name.filter(|name| !name.is_empty()),
        search: params.q.filter(|q| !q.trim().is_empty()),
        page: params.page.unwrap_or_default(),
    };

    let users = state.store.list(&query).await?;

    Ok(Json(Response {
        page: query.page,
        page_size: PAGE_SIZE,
        users: users.into_iter().map(Row::from).collect(),
    }))
}
