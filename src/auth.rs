//! Email-or-username authentication.

use std::sync::Arc;

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;

use crate::crypto::{CredentialHasher, PasswordHash};
use crate::error::{Result, ServerError};
use crate::user::{User, UserStore};

const PLACEHOLDER_LENGTH: usize = 32;

/// Decides whether a user whose password matched may log in.
pub trait AuthenticationPolicy: Send + Sync {
    fn user_can_authenticate(&self, user: &User) -> bool {
        user.is_active
    }
}

/// Rejects inactive users only.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveOnly;

impl AuthenticationPolicy for ActiveOnly {}

/// Resolves a login attempt to zero or one [`User`].
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
    policy: Arc<dyn AuthenticationPolicy>,
    /// Verified against when nothing else is, so every failure pays one hash.
    placeholder: PasswordHash,
}

impl Authenticator {
    /// Create a new [`Authenticator`] with the [`ActiveOnly`] policy.
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Result<Self> {
        let secret = Alphanumeric.sample_string(&mut OsRng, PLACEHOLDER_LENGTH);
        let placeholder = hasher.hash(&secret)?;

        Ok(Self {
            store,
            hasher,
            policy: Arc::new(ActiveOnly),
            placeholder,
        })
    }

    /// Replace the eligibility policy.
    pub fn with_policy(
        mut self,
        policy: impl AuthenticationPolicy + 'static,
    ) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Burn the cost of one verification, result ignored.
    fn absorb(&self, password: &str) {
        let _ = self.hasher.verify(password, &self.placeholder);
    }

    /// Authenticate with an email or a username.
    ///
    /// Does not update `last_login`.
    ///
    /// # Errors
    ///
    /// [`ServerError::AuthenticationFailed`] for an unknown identifier, a
    /// wrong password or an ineligible account alike.
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<User> {
        let Some(user) = self.store.find_by_identifier(identifier).await? else {
            self.absorb(password);
            return Err(self.failure());
        };

        let verified = if user.has_usable_password() {
            self.hasher.verify(password, user.password_hash())
        } else {
            self.absorb(password);
            false
        };

        if !verified || !self.policy.user_can_authenticate(&user) {
            return Err(self.failure());
        }

        metrics::counter!("authentication_attempts_total", "outcome" => "success")
            .increment(1);
        tracing::debug!(user_id = ?user.id, "user authenticated");

        Ok(user)
    }

    fn failure(&self) -> ServerError {
        metrics::counter!("authentication_attempts_total", "outcome" => "failure")
            .increment(1);
        ServerError::AuthenticationFailed
    }

    /// Load a user by id if it may still authenticate.
    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self
            .store
            .get_by_id(id)
            .await?
            .filter(|user| self.policy.user_can_authenticate(user)))
    }

    /// Any active user holds every permission.
    pub fn has_permission(&self, user: &User, _permission: &str) -> bool {
        user.is_active
    }

    /// Any active user may access every application.
    pub fn has_module_permission(&self, user: &User, _app_label: &str) -> bool {
        user.is_active
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::crypto::PasswordManager;
    use crate::crypto::tests::test_hasher;
    use crate::user::{MemoryUserStore, NewUser, UserChanges, UserManager};

    const PASSWORD: &str = "correct-horse-battery";

    /// Counts verifications.
    struct CountingHasher {
        inner: PasswordManager,
        verifications: AtomicUsize,
    }

    impl CredentialHasher for CountingHasher {
        fn hash(&self, password: &str) -> crate::crypto::Result<PasswordHash> {
            self.inner.hash(password)
        }

        fn verify(&self, password: &str, hash: &PasswordHash) -> bool {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(password, hash)
        }
    }

    struct Setup {
        auth: Authenticator,
        manager: UserManager,
        hasher: Arc<CountingHasher>,
    }

    fn setup() -> Setup {
        let store = Arc::new(MemoryUserStore::new());
        let hasher = Arc::new(CountingHasher {
            inner: test_hasher(),
            verifications: AtomicUsize::new(0),
        });
        let auth = Authenticator::new(store.clone(), hasher.clone()).unwrap();
        let manager = UserManager::new(store, hasher.clone());

        Setup {
            auth,
            manager,
            hasher,
        }
    }

    async fn create(manager: &UserManager, password: Option<&str>) -> User {
        manager
            .create_user(NewUser {
                email: Some("jane@example.com".into()),
                username: Some("jane".into()),
                password: password.map(str::to_owned),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_with_email_or_username() {
        let Setup { auth, manager, .. } = setup();
        let user = create(&manager, Some(PASSWORD)).await;

        for identifier in ["jane@example.com", "JANE@example.com", "jane", "Jane"] {
            let found = auth.authenticate(identifier, PASSWORD).await.unwrap();
            assert_eq!(found.id, user.id);
        }
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let Setup { auth, manager, .. } = setup();
        create(&manager, Some(PASSWORD)).await;

        for password in ["", "correct-horse-batter", "CORRECT-HORSE-BATTERY"] {
            assert!(matches!(
                auth.authenticate("jane", password).await,
                Err(ServerError::AuthenticationFailed)
            ));
        }
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_authenticate() {
        let Setup { auth, manager, .. } = setup();
        let user = create(&manager, Some(PASSWORD)).await;
        let id = user.id.unwrap();
        manager
            .update(user, UserChanges {
                is_active: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(matches!(
            auth.authenticate("jane", PASSWORD).await,
            Err(ServerError::AuthenticationFailed)
        ));
        assert_eq!(auth.get_user(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unusable_password_never_authenticates() {
        let Setup { auth, manager, .. } = setup();
        let user = create(&manager, None).await;

        for password in ["", user.password_hash().as_str()] {
            assert!(matches!(
                auth.authenticate("jane", password).await,
                Err(ServerError::AuthenticationFailed)
            ));
        }
    }

    #[tokio::test]
    async fn test_unknown_identifier_looks_like_wrong_password() {
        let Setup {
            auth,
            manager,
            hasher,
        } = setup();
        create(&manager, Some(PASSWORD)).await;

        hasher.verifications.store(0, Ordering::SeqCst);
        let unknown = auth.authenticate("nobody", PASSWORD).await.unwrap_err();
        assert_eq!(hasher.verifications.load(Ordering::SeqCst), 1);

        hasher.verifications.store(0, Ordering::SeqCst);
        let wrong = auth.authenticate("jane", "wrong").await.unwrap_err();
        assert_eq!(hasher.verifications.load(Ordering::SeqCst), 1);

        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(unknown, ServerError::AuthenticationFailed));
        assert!(matches!(wrong, ServerError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_custom_policy() {
        struct StaffOnly;
        impl AuthenticationPolicy for StaffOnly {
            fn user_can_authenticate(&self, user: &User) -> bool {
                user.is_active && user.is_staff()
            }
        }

        let Setup { auth, manager, .. } = setup();
        let auth = auth.with_policy(StaffOnly);
        let user = create(&manager, Some(PASSWORD)).await;

        assert!(auth.authenticate("jane", PASSWORD).await.is_err());

        manager
            .update(user, UserChanges {
                is_admin: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(auth.authenticate("jane", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_user_and_permission_stubs() {
        let Setup { auth, manager, .. } = setup();
        let user = create(&manager, Some(PASSWORD)).await;

        let loaded = auth.get_user(user.id.unwrap()).await.unwrap().unwrap();
        assert!(auth.has_permission(&loaded, "accounts.delete_user"));
        assert!(auth.has_module_permission(&loaded, "accounts"));
        assert_eq!(auth.get_user(404).await.unwrap(), None);
    }
}
