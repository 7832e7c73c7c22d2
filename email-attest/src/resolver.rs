//! Recovering the email a wallet response belongs to.
//!
//! The access token carries the request token it answers (`req`), and the
//! request token carries the callback URL it was created with (`callback`),
//! which has the email bound into its query. None of this is checked for
//! authenticity here: that happens when the credential authority resolves
//! the access token into an identity.

use crate::{
    error::{VerifierError, VerifierResult},
    setups::TokenDecoder,
};
use email_attest_core::callback;
use serde_json::Value;

/// Payload field of an access token holding the request token
pub const REQUEST_TOKEN_FIELD: &str = "req";
/// Payload field of a request token holding the callback URL
pub const CALLBACK_FIELD: &str = "callback";

/// What an access token says about the request it answers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedResponse {
    /// The disclosure request token the wallet answered
    pub request_token: String,
    /// The email bound to that request
    pub email: String,
}

/// Reads request token & email out of access tokens
#[derive(Clone, Debug, Default)]
pub struct ResponseResolver<D: TokenDecoder> {
    decoder: D,
}

impl<D: TokenDecoder> ResponseResolver<D> {
    /// Create a new resolver
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }

    /// Recover the request token & bound email from an access token
    pub fn resolve(&self, access_token: &str) -> VerifierResult<ResolvedResponse> {
        let request_token = self.string_field(access_token, "access", REQUEST_TOKEN_FIELD)?;
        let callback_url = self.string_field(&request_token, "request", CALLBACK_FIELD)?;

        let email = callback::bound_email(&callback_url)
            .map_err(|e| VerifierError::MalformedToken(format!("request token {e}")))?;

        tracing::debug!(%email, "Resolved email from access token");

        Ok(ResolvedResponse {
            request_token,
            email,
        })
    }

    fn string_field(&self, token: &str, kind: &str, field: &str) -> VerifierResult<String> {
        let payload = self.decoder.decode_payload(token).map_err(|e| {
            VerifierError::MalformedToken(format!("can't decode {kind} token: {e:#}"))
        })?;

        payload
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                VerifierError::MalformedToken(format!(
                    "{kind} token payload has no `{field}` string"
                ))
            })
    }
}
