//! The callback URL convention that binds an email to a disclosure request.
//!
//! The email travels inside the callback URL of the request token
//! (`<callback>?email=<email>`), and is read back from there once the
//! wallet answers. Both directions live here so they can't drift apart.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;
use url::{form_urlencoded, Url};

/// Name of the query parameter carrying the email
pub const EMAIL_PARAM: &str = "email";

// Everything but characters that are unambiguous inside a query value.
const EMAIL_QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'@')
    .remove(b'.')
    .remove(b'_')
    .remove(b'-')
    .remove(b'~');

/// Append the email to a callback URL.
///
/// Other query parameters and the fragment are kept. Any `email`
/// parameter already in the callback is dropped, so the result carries
/// exactly one.
///
/// ```
/// use email_attest_core::callback::bind_email;
///
/// assert_eq!(
///     bind_email("https://cb/verify#done", "a@b.com").unwrap(),
///     "https://cb/verify?email=a@b.com#done"
/// );
/// ```
pub fn bind_email(callback_url: &str, email: &str) -> Result<String, CallbackError> {
    let mut url = Url::parse(callback_url).map_err(CallbackError::InvalidUrl)?;

    let mut query: Vec<&str> = url
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && !is_email_pair(pair))
        .collect();
    let email_pair = format!(
        "{EMAIL_PARAM}={}",
        utf8_percent_encode(email, EMAIL_QUERY_VALUE)
    );
    query.push(&email_pair);
    let query = query.join("&");

    url.set_query(Some(&query));
    Ok(url.into())
}

fn is_email_pair(pair: &str) -> bool {
    form_urlencoded::parse(pair.as_bytes())
        .next()
        .is_some_and(|(key, _)| key == EMAIL_PARAM)
}

/// Read the email back out of a callback URL produced by [`bind_email`]
pub fn bound_email(callback_url: &str) -> Result<String, CallbackError> {
    let url = Url::parse(callback_url).map_err(CallbackError::InvalidUrl)?;
    let mut emails = url
        .query_pairs()
        .filter(|(key, _)| key == EMAIL_PARAM)
        .map(|(_, value)| value.into_owned());

    match (emails.next(), emails.next()) {
        (Some(email), None) => Ok(email),
        (None, _) => Err(CallbackError::MissingEmail),
        (Some(_), Some(_)) => Err(CallbackError::AmbiguousEmail),
    }
}

/// Reasons an email can't be bound to or recovered from a callback URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The callback isn't an absolute URL
    InvalidUrl(url::ParseError),
    /// The callback has no `email` query parameter
    MissingEmail,
    /// The callback has more than one `email` query parameter
    AmbiguousEmail,
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackError::InvalidUrl(e) => write!(f, "callback is not a valid URL: {e}"),
            CallbackError::MissingEmail => {
                write!(f, "callback has no `{EMAIL_PARAM}` query parameter")
            }
            CallbackError::AmbiguousEmail => {
                write!(f, "callback has more than one `{EMAIL_PARAM}` query parameter")
            }
        }
    }
}

impl std::error::Error for CallbackError {}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use testresult::TestResult;

    #[test]
    fn test_bind_plain_email_verbatim() -> TestResult {
        assert_eq!(
            bind_email("https://cb/verify", "a@b.com")?,
            "https://cb/verify?email=a@b.com"
        );
        Ok(())
    }

    #[test]
    fn test_bind_escapes_query_syntax() -> TestResult {
        assert_eq!(
            bind_email("https://cb/verify", "a+b&c=d@e.com")?,
            "https://cb/verify?email=a%2Bb%26c%3Dd@e.com"
        );
        Ok(())
    }

    #[test]
    fn test_bind_keeps_existing_query() -> TestResult {
        let bound = bind_email("https://cb/verify?app=1", "a@b.com")?;
        assert_eq!(bound, "https://cb/verify?app=1&email=a@b.com");
        assert_eq!(bound_email(&bound)?, "a@b.com");
        Ok(())
    }

    #[test]
    fn test_bind_replaces_existing_email() -> TestResult {
        for callback in [
            "https://cb/verify?email=victim@bank.com",
            "https://cb/verify?app=1&email=victim@bank.com&email=other@bank.com",
            "https://cb/verify?%65mail=victim@bank.com",
        ] {
            let bound = bind_email(callback, "a@b.com")?;
            assert!(!bound.contains("bank.com"), "{bound} kept a foreign email");
            assert_eq!(bound_email(&bound)?, "a@b.com");
        }
        Ok(())
    }

    #[test]
    fn test_bind_puts_query_before_fragment() -> TestResult {
        let bound = bind_email("https://cb/verify?app=1#done", "a@b.com")?;
        assert_eq!(bound, "https://cb/verify?app=1&email=a@b.com#done");
        assert_eq!(bound_email(&bound)?, "a@b.com");
        Ok(())
    }

    #[test]
    fn test_bind_rejects_invalid_callback() {
        assert_matches!(
            bind_email("not a url", "a@b.com"),
            Err(CallbackError::InvalidUrl(_))
        );
    }

    #[test]
    fn test_round_trip() -> TestResult {
        for email in [
            "a@b.com",
            "first.last@example.org",
            "x+tag@sub.domain.io",
            "o'hara@irish.ie",
            "under_score-dash~tilde@x.y",
        ] {
            assert_eq!(bound_email(&bind_email("https://cb/verify", email)?)?, email);
        }
        Ok(())
    }

    #[test]
    fn test_bound_email_failures() {
        assert_matches!(bound_email("not a url"), Err(CallbackError::InvalidUrl(_)));
        assert_matches!(
            bound_email("https://cb/verify?other=1"),
            Err(CallbackError::MissingEmail)
        );
        assert_matches!(
            bound_email("https://cb/verify?email=a@b.com&email=c@d.com"),
            Err(CallbackError::AmbiguousEmail)
        );
    }
}
