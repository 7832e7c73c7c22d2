//! Syntactically validated email addresses

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use validator::{Validate, ValidationErrors};

/// An email address that passed syntax validation.
///
/// This says nothing about whether the address exists or
/// who controls it, that's what the verification round trip is for.
#[derive(Clone, Serialize, Deserialize, Validate, Eq, PartialEq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress {
    #[validate(email)]
    inner: String,
}

impl EmailAddress {
    /// The address as a string slice
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl FromStr for EmailAddress {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let email = Self {
            inner: s.to_string(),
        };
        email.validate()?;
        Ok(email)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = ValidationErrors;

    fn try_from(inner: String) -> Result<Self, Self::Error> {
        let email = Self { inner };
        email.validate()?;
        Ok(email)
    }
}

impl From<EmailAddress> for String {
    fn from(email: EmailAddress) -> Self {
        email.inner
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl fmt::Debug for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EmailAddress").field(&self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_valid_emails() {
        for email in ["a@b.com", "first.last@example.org", "x+tag@sub.domain.io"] {
            assert_matches!(email.parse::<EmailAddress>(), Ok(e) if e.as_str() == email);
        }
    }

    #[test]
    fn test_invalid_emails() {
        for email in [
            "",
            "plainaddress",
            "@b.com",
            "a@",
            "a b@c.com",
            "a@b@c.com",
        ] {
            assert_matches!(email.parse::<EmailAddress>(), Err(_), "{email:?} should be rejected");
        }
    }

    #[test]
    fn test_deserialize_validates() {
        assert_matches!(serde_json::from_str::<EmailAddress>("\"a@b.com\""), Ok(_));
        assert_matches!(serde_json::from_str::<EmailAddress>("\"nope\""), Err(_));
    }
}
