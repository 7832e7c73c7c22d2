//! Issuing disclosure requests bound to an email.

use crate::{
    config::VerifierConfig,
    error::{VerifierError, VerifierResult},
    setups::CredentialAuthority,
};
use email_attest_core::{callback, email::EmailAddress};
use serde_json::{Map, Value};

/// Request parameter holding the callback URL
pub const CALLBACK_URL_PARAM: &str = "callbackUrl";
/// Request parameter asking the wallet for a push token
pub const NOTIFICATIONS_PARAM: &str = "notifications";

/// Builds disclosure requests and has the credential authority sign them
#[derive(Debug)]
pub struct RequestIssuer<'a, A: CredentialAuthority> {
    authority: &'a A,
    config: &'a VerifierConfig,
}

impl<'a, A: CredentialAuthority> RequestIssuer<'a, A> {
    /// Create a new issuer
    pub fn new(authority: &'a A, config: &'a VerifierConfig) -> Self {
        Self { authority, config }
    }

    /// Issue a disclosure request whose callback carries `email`.
    ///
    /// Uses the configured callback URL unless `callback_url` is given.
    /// The email and the callback are validated before anything is sent to the authority.
    pub async fn issue(&self, email: &str, callback_url: Option<&str>) -> VerifierResult<String> {
        let email: EmailAddress = email
            .parse()
            .map_err(|_| VerifierError::InvalidEmailFormat(email.to_string()))?;

        let callback_url = callback_url.unwrap_or(self.config.callback_url());
        let callback_url = callback::bind_email(callback_url, email.as_str())
            .map_err(|e| VerifierError::InvalidCallbackUrl(format!("{callback_url:?}: {e}")))?;

        tracing::debug!(%email, %callback_url, "Issuing disclosure request");

        let params = request_params(self.config.custom_request_params(), callback_url);

        self.authority
            .create_request(&params)
            .await
            .map_err(VerifierError::RequestIssuanceFailed)
    }
}

/// Merge the custom parameters with the callback URL & push notification request.
/// The latter two always win.
pub fn request_params(custom: &Map<String, Value>, callback_url: String) -> Map<String, Value> {
    let mut params = custom.clone();
    params.insert(CALLBACK_URL_PARAM.to_string(), Value::String(callback_url));
    params.insert(NOTIFICATIONS_PARAM.to_string(), Value::Bool(true));
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        setups::test::{AuthorityCall, TestCredentialAuthority},
        test_utils::test_config,
    };
    use assert_matches::assert_matches;
    use serde_json::json;
    use testresult::TestResult;

    #[test_log::test(tokio::test)]
    async fn test_invalid_email_never_reaches_authority() {
        let authority = TestCredentialAuthority::default();
        let config = test_config("https://cb/verify");
        let issuer = RequestIssuer::new(&authority, &config);

        for email in ["", "nope", "a@", "@b.com", "a b@c.com"] {
            assert_matches!(
                issuer.issue(email, None).await,
                Err(VerifierError::InvalidEmailFormat(e)) if e == email
            );
        }

        assert!(authority.requests().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_request_is_bound_to_email() -> TestResult {
        let authority = TestCredentialAuthority::default();
        authority.set_request_token("RT1");
        let config = test_config("https://cb/verify");

        let token = RequestIssuer::new(&authority, &config)
            .issue("a@b.com", None)
            .await?;

        assert_eq!(token, "RT1");
        assert_eq!(
            Value::Object(authority.requests().remove(0)),
            json!({
                "callbackUrl": "https://cb/verify?email=a@b.com",
                "notifications": true,
            })
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_callback_override() -> TestResult {
        let authority = TestCredentialAuthority::default();
        let config = test_config("https://cb/verify");

        RequestIssuer::new(&authority, &config)
            .issue("a@b.com", Some("https://other/cb"))
            .await?;

        assert_eq!(
            authority.requests()[0][CALLBACK_URL_PARAM],
            json!("https://other/cb?email=a@b.com")
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_callback_override_cannot_carry_another_email() -> TestResult {
        let authority = TestCredentialAuthority::default();
        let config = test_config("https://cb/verify");

        RequestIssuer::new(&authority, &config)
            .issue("a@b.com", Some("https://other/cb?email=c@d.com#done"))
            .await?;

        assert_eq!(
            authority.requests()[0][CALLBACK_URL_PARAM],
            json!("https://other/cb?email=a@b.com#done")
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_invalid_callback_override_never_reaches_authority() {
        let authority = TestCredentialAuthority::default();
        let config = test_config("https://cb/verify");
        let issuer = RequestIssuer::new(&authority, &config);

        for callback_url in ["", "not a url", "/relative/cb"] {
            assert_matches!(
                issuer.issue("a@b.com", Some(callback_url)).await,
                Err(VerifierError::InvalidCallbackUrl(_))
            );
        }

        assert!(authority.requests().is_empty());
    }

    #[test]
    fn test_custom_params_cannot_override_binding() {
        let custom = json!({
            "requested": ["name", "avatar"],
            "callbackUrl": "https://evil/cb",
            "notifications": false,
        });
        let Value::Object(custom) = custom else {
            unreachable!()
        };

        let params = request_params(&custom, "https://cb/verify?email=a@b.com".into());

        assert_eq!(
            Value::Object(params),
            json!({
                "requested": ["name", "avatar"],
                "callbackUrl": "https://cb/verify?email=a@b.com",
                "notifications": true,
            })
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_authority_failure() {
        let authority = TestCredentialAuthority::default();
        authority.fail(AuthorityCall::CreateRequest);
        let config = test_config("https://cb/verify");

        assert_matches!(
            RequestIssuer::new(&authority, &config)
                .issue("a@b.com", None)
                .await,
            Err(VerifierError::RequestIssuanceFailed(_))
        );
    }
}
