//! Error taxonomy of the verification flows.

use email_attest_core::common::{Warning, WarningCode};
use std::fmt;

/// Standard return type of the verification flows
pub type VerifierResult<T> = std::result::Result<T, VerifierError>;

/// Everything that can go wrong in `receive` or `verify`.
///
/// Adapters (credential authority, mail transport, ...) report
/// [`anyhow::Error`]s, which get wrapped into the variant for the
/// step that failed.
///
/// `PushNotificationFailed`, `MailDeliveryFailed` and `ArtifactIOFailed`
/// are only fatal in `receive`. In `verify` they are turned into
/// [`Warning`]s via [`VerifierError::as_warning`].
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// The verifier was constructed with missing or conflicting settings
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The email failed syntax validation. Nothing external was contacted.
    #[error("invalid email format: {0:?}")]
    InvalidEmailFormat(String),

    /// The callback URL given for a disclosure request isn't an absolute URL.
    /// Nothing external was contacted.
    #[error("invalid callback URL {0}")]
    InvalidCallbackUrl(String),

    /// The credential authority refused to create a disclosure request
    #[error("failed to issue disclosure request: {0:#}")]
    RequestIssuanceFailed(anyhow::Error),

    /// The access token (or the request token inside it) lacks the expected metadata
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The credential authority couldn't resolve an identity from the access token
    #[error("failed to resolve identity: {0:#}")]
    IdentityResolutionFailed(anyhow::Error),

    /// The credential authority refused to sign the attestation
    #[error("failed to issue attestation: {0:#}")]
    AttestationFailed(anyhow::Error),

    /// The push notification couldn't be delivered
    #[error("failed to send push notification: {0:#}")]
    PushNotificationFailed(anyhow::Error),

    /// The mail transport rejected the message
    #[error("failed to deliver email: {0:#}")]
    MailDeliveryFailed(anyhow::Error),

    /// Rendering, writing or removing a scannable code file failed
    #[error("code artifact I/O failed: {0:#}")]
    ArtifactIOFailed(anyhow::Error),
}

impl VerifierError {
    /// The warning this error becomes when it happens during best-effort
    /// delivery. `None` for errors that are always fatal.
    pub fn as_warning(&self) -> Option<Warning> {
        let code = match self {
            VerifierError::PushNotificationFailed(_) => WarningCode::PushNotificationFailed,
            VerifierError::MailDeliveryFailed(_) => WarningCode::MailDeliveryFailed,
            VerifierError::ArtifactIOFailed(_) => WarningCode::ArtifactIOFailed,
            _ => return None,
        };

        Some(Warning::new(code, self.to_string()))
    }
}

/// All problems found while validating the verifier's settings.
///
/// Validation doesn't stop at the first problem, so a single error
/// lists everything that needs fixing.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
pub struct ConfigurationError {
    problems: Vec<String>,
}

impl ConfigurationError {
    /// Record a problem
    pub(crate) fn push(&mut self, problem: impl Into<String>) {
        self.problems.push(problem.into());
    }

    /// Record that a required field is missing
    pub(crate) fn missing(&mut self, field: &str) {
        self.push(format!("`{field}` is required"));
    }

    /// Every problem that was found
    pub fn problems(&self) -> &[String] {
        &self.problems
    }

    /// `Err(self)` if any problem was recorded
    pub(crate) fn into_result(self) -> Result<(), Self> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.problems.join("; "))
    }
}
