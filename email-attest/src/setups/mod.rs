//! This abstracts the verifier's side-effects into "setups".
//!
//! This module defines the traits, submodules define production,
//! local development & test collections of implementations.
use crate::{
    config::MailSettings,
    mailer::{DeliveryInfo, OutgoingMail},
};
use anyhow::Result;
use async_trait::async_trait;
use email_attest_core::common::{AttestationClaim, Identity, PushPayload};
use serde_json::{Map, Value};

pub mod local;
pub mod prod;

/// This trait groups type parameters to the [`EmailVerifier`] struct.
///
/// It captures the setup of the verifier, distinguishing between e.g.
/// unit testing & production setups.
///
/// [`EmailVerifier`]: crate::verifier::EmailVerifier
pub trait VerifierSetup: Clone + Send + Sync + 'static {
    /// Which implementation of the credential authority to talk to
    type CredentialAuthority: CredentialAuthority;
    /// Which implementation to use to send emails
    type MailTransport: MailTransport;
    /// How to read metadata out of signed tokens
    type TokenDecoder: TokenDecoder;
    /// How to turn URIs into scannable images
    type CodeRenderer: CodeRenderer;
}

/// The external signer & verifier of identity tokens.
///
/// Implementations are shared between concurrent flows,
/// so cloning should be cheap.
#[async_trait]
pub trait CredentialAuthority: Clone + Send + Sync {
    /// Sign a selective disclosure request with the given parameters
    async fn create_request(&self, params: &Map<String, Value>) -> Result<String>;

    /// Verify a wallet's access token and resolve the identity behind it
    async fn receive(&self, access_token: &str) -> Result<Identity>;

    /// Sign an attestation
    async fn attest(&self, claim: &AttestationClaim) -> Result<String>;

    /// Deliver a push notification to an identity's wallet
    async fn push(&self, push_token: &str, payload: &PushPayload) -> Result<()>;
}

/// The service that delivers emails
#[async_trait]
pub trait MailTransport: Clone + Send + Sync {
    /// Build a transport from the mail settings.
    /// Used when the builder wasn't given a transport explicitly.
    fn connect(settings: &MailSettings) -> Result<Self>
    where
        Self: Sized;

    /// Deliver one message
    async fn send(&self, mail: &OutgoingMail) -> Result<DeliveryInfo>;
}

/// Reads the (unverified) payload out of a signed token
pub trait TokenDecoder: Clone + Default + Send + Sync {
    /// Decode the token's payload as JSON, without checking any signature
    fn decode_payload(&self, token: &str) -> Result<Value>;
}

/// Encodes data as a scannable image
pub trait CodeRenderer: Clone + Default + Send + Sync {
    /// Render the data as a PNG image
    fn render_png(&self, data: &str) -> Result<Vec<u8>>;
}
