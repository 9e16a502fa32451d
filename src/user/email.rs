//! Email and username logic management.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;
use validator::ValidateEmail;

use crate::error::{Result, field_error};

const MAX_EMAIL_LENGTH: usize = 254;
const MAX_USERNAME_LENGTH: usize = 150;

static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w.@+-]+$").expect("username pattern compiles")
});

/// Value object of a valid, normalized email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Converts a string into a valid [`EmailAddress`].
    ///
    /// Surrounding whitespace is trimmed and the domain part is lowercased.
    /// The local part keeps its case.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the email is empty or not a valid address.
    pub fn parse(email: &str) -> Result<Self> {
        let email = email.trim();
        if email.is_empty() {
            return Err(field_error(
                "email",
                "required",
                "You must enter a valid email.",
            )
            .into());
        }

        let normalized = normalize_email(email);
        if normalized.len() > MAX_EMAIL_LENGTH || !normalized.validate_email()
        {
            return Err(field_error(
                "email",
                "invalid_email",
                "Enter a valid email address.",
            )
            .into());
        }

        Ok(Self(normalized))
    }

    /// Returns the same string as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase the domain part of an email address.
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_owned(),
    }
}

/// Check an optional ASCII username, mapping blank values to `None`.
pub fn parse_username(username: Option<String>) -> Result<Option<String>> {
    let Some(username) = username
        .map(|u| u.trim().to_owned())
        .filter(|u| !u.is_empty())
    else {
        return Ok(None);
    };

    if username.chars().count() > MAX_USERNAME_LENGTH
        || !USERNAME_RE.is_match(&username)
    {
        return Err(field_error(
            "username",
            "invalid_username",
            "Enter a valid username. This value may contain only unaccented lowercase a-z and uppercase A-Z letters, numbers, and @/./+/-/_ characters.",
        )
        .into());
    }

    Ok(Some(username))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;

    #[test]
    fn test_normalize_domain_only() {
        assert_eq!(normalize_email("John.Doe@EXAMPLE.Org"), "John.Doe@example.org");
        assert_eq!(normalize_email("a@b@C.com"), "a@b@c.com");
        assert_eq!(normalize_email("nodomain"), "nodomain");
    }

    #[test]
    fn test_parse_email() {
        let email = EmailAddress::parse("  Jane@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "Jane@example.com");
    }

    #[test]
    fn test_empty_email_is_rejected() {
        for email in ["", "   "] {
            assert!(matches!(
                EmailAddress::parse(email),
                Err(ServerError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_malformed_email_is_rejected() {
        assert!(EmailAddress::parse("not-an-email").is_err());
        assert!(EmailAddress::parse("@example.com").is_err());
    }

    #[test]
    fn test_username() {
        assert_eq!(parse_username(None).unwrap(), None);
        assert_eq!(parse_username(Some("  ".into())).unwrap(), None);
        assert_eq!(
            parse_username(Some(" jane.doe+1 ".into())).unwrap().as_deref(),
            Some("jane.doe+1")
        );
        assert!(parse_username(Some("jane doe".into())).is_err());
        assert!(parse_username(Some("jöse".into())).is_err());
        assert!(parse_username(Some("Jose_99".into())).is_ok());
        assert!(parse_username(Some("x".repeat(151))).is_err());
    }
}
