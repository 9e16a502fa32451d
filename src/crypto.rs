//! Cryptogragic logics.

use argon2::password_hash::{
    PasswordHash as PhcString, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;

use crate::config::Argon2 as ArgonConfig;

const UNUSABLE_PASSWORD_PREFIX: &str = "!";
const UNUSABLE_PASSWORD_SUFFIX_LENGTH: usize = 40;
/// Characters shown before masking salts and hashes.
const UNMASKED_LENGTH: usize = 6;

pub(crate) type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// A hashed password stored in the database.
///
/// Either a PHC string produced by a [`CredentialHasher`] or an unusable
/// marker which no password can ever match.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wraps a value read back from storage.
    pub(crate) fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Create a credential that never authenticates.
    pub fn unusable() -> Self {
        Self(format!(
            "{UNUSABLE_PASSWORD_PREFIX}{}",
            Alphanumeric.sample_string(&mut OsRng, UNUSABLE_PASSWORD_SUFFIX_LENGTH)
        ))
    }

    /// Whether a password can be checked against this hash.
    pub fn is_usable(&self) -> bool {
        !self.0.is_empty() && !self.0.starts_with(UNUSABLE_PASSWORD_PREFIX)
    }

    /// Returns the same string as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read-only description of the hash, safe to display.
    pub fn summary(&self) -> PasswordSummary {
        if !self.is_usable() {
            return PasswordSummary::unusable();
        }

        match PhcString::new(&self.0) {
            Ok(phc) => PasswordSummary {
                usable: true,
                algorithm: Some(phc.algorithm.to_string()),
                version: phc.version,
                params: Some(phc.params.to_string()).filter(|p| !p.is_empty()),
                salt: phc.salt.map(|salt| mask(salt.as_str())),
                hash: phc.hash.map(|hash| mask(&hash.to_string())),
                message: None,
            },
            Err(_) => PasswordSummary {
                message: Some("Invalid password format or unknown hashing algorithm.".into()),
                ..PasswordSummary::unusable()
            },
        }
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash")
            .field("phc_string", &"[REDACTED]")
            .finish()
    }
}

/// Display form of a [`PasswordHash`] for administrators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PasswordSummary {
    pub usable: bool,
    pub algorithm: Option<String>,
    pub version: Option<u32>,
    pub params: Option<String>,
    pub salt: Option<String>,
    pub hash: Option<String>,
    pub message: Option<String>,
}

impl PasswordSummary {
    fn unusable() -> Self {
        Self {
            usable: false,
            algorithm: None,
            version: None,
            params: None,
            salt: None,
            hash: None,
            message: Some("No password set.".into()),
        }
    }
}

fn mask(value: &str) -> String {
    let shown = value.chars().take(UNMASKED_LENGTH).collect::<String>();
    let hidden = value.chars().count().saturating_sub(UNMASKED_LENGTH);
    format!("{shown}{}", "*".repeat(hidden))
}

/// One-way password hashing service.
pub trait CredentialHasher: Send + Sync {
    /// Hash a plaintext password with a fresh salt.
    fn hash(&self, password: &str) -> Result<PasswordHash>;

    /// Check a plaintext password against a stored hash.
    fn verify(&self, password: &str, hash: &PasswordHash) -> bool;
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }
}

impl CredentialHasher for PasswordManager {
    fn hash(&self, password: &str) -> Result<PasswordHash> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(PasswordHash(hash.to_string()))
    }

    fn verify(&self, password: &str, hash: &PasswordHash) -> bool {
        if !hash.is_usable() {
            return false;
        }

        let Ok(parsed) = PhcString::new(hash.as_str()) else {
            tracing::warn!("stored password hash is not a PHC string");
            return false;
        };

        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
