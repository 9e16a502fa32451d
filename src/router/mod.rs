pub mod admin;
pub mod login;
pub mod status;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::ServerError;

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate + Send,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use crate::AppState;
    use crate::auth::Authenticator;
    use crate::config::Configuration;
    use crate::crypto::tests::test_hasher;
    use crate::user::{MemoryUserStore, NewUser, User, UserManager};

    pub const ADMIN_EMAIL: &str = "admin@example.com";
    pub const ADMIN_PASSWORD: &str = "P$soW%920$n&";

    /// In-memory state with cheap hashing.
    pub fn state() -> AppState {
        let store = Arc::new(MemoryUserStore::new());
        let hasher = Arc::new(test_hasher());

        AppState {
            config: Arc::new(Configuration::default()),
            users: UserManager::new(store.clone(), hasher.clone()),
            auth: Authenticator::new(store.clone(), hasher)
                .expect("placeholder hash"),
            store,
            metrics: None,
        }
    }

    /// State holding one superuser, [`ADMIN_EMAIL`].
    pub async fn state_with_admin() -> (AppState, User) {
        let state = state();
        let admin = state
            .users
            .create_superuser(NewUser {
                email: Some(ADMIN_EMAIL.into()),
                username: Some("admin".into()),
                password: Some(ADMIN_PASSWORD.into()),
                ..Default::default()
            })
            .await
            .expect("superuser");
        (state, admin)
    }
}
