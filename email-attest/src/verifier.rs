//! The two public flows: sending a disclosure request to an email address,
//! and turning the wallet's answer into an attestation.

use crate::{
    artifact::ArtifactStore,
    builder::EmailVerifierBuilder,
    config::VerifierConfig,
    error::{VerifierError, VerifierResult},
    issuer::RequestIssuer,
    mailer::{DeliveryInfo, Mailer, MessageKind, MessageTemplate},
    resolver::{ResolvedResponse, ResponseResolver},
    setups::{CredentialAuthority, VerifierSetup},
};
use anyhow::anyhow;
use email_attest_core::{
    common::{AttestationClaim, Identity, PushPayload, VerifyOptions, VerifyResponse, Warning},
    wallet_uri,
};
use std::{fmt, sync::Arc, time::Duration};

/// Verifies that someone controls both an email address and an identity.
///
/// Cloning is cheap, clones share the configuration and adapter handles.
#[derive(Clone)]
pub struct EmailVerifier<S: VerifierSetup> {
    config: Arc<VerifierConfig>,
    authority: S::CredentialAuthority,
    mailer: Mailer<S::MailTransport>,
    artifacts: ArtifactStore<S::CodeRenderer>,
    resolver: ResponseResolver<S::TokenDecoder>,
}

impl<S: VerifierSetup> fmt::Debug for EmailVerifier<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailVerifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Progress of a `verify` call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VerifyStage {
    EmailResolved,
    IdentityReceived,
    Attested,
    Pushed,
    Emailed,
    Done,
}

/// Outcome of sending one code image. The artifact is gone either way.
struct CodeDelivery {
    sent: VerifierResult<DeliveryInfo>,
    cleanup: VerifierResult<()>,
}

impl<S: VerifierSetup> EmailVerifier<S> {
    /// Start configuring a verifier
    pub fn builder() -> EmailVerifierBuilder<S> {
        EmailVerifierBuilder::default()
    }

    pub(crate) fn new(
        config: VerifierConfig,
        authority: S::CredentialAuthority,
        mail_transport: S::MailTransport,
        token_decoder: S::TokenDecoder,
        code_renderer: S::CodeRenderer,
    ) -> Self {
        Self {
            mailer: Mailer::new(mail_transport, config.mail().from.clone()),
            artifacts: ArtifactStore::new(code_renderer, config.artifact_dir()),
            resolver: ResponseResolver::new(token_decoder),
            authority,
            config: Arc::new(config),
        }
    }

    /// The verifier's configuration
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Email a disclosure request bound to `email`, as a scannable code.
    ///
    /// Returns the request token. Fails if the request can't be issued,
    /// or the code can't be rendered or mailed.
    pub async fn receive(&self, email: &str, callback_url: Option<&str>) -> VerifierResult<String> {
        let request_token = RequestIssuer::new(&self.authority, &self.config)
            .issue(email, callback_url)
            .await?;

        let request_uri = wallet_uri::disclosure_request(self.config.wallet_scheme(), &request_token);

        let CodeDelivery { sent, cleanup } = self
            .deliver_code(email, MessageKind::Confirm, &request_uri)
            .await?;

        if let Err(err) = cleanup {
            tracing::warn!(%err, "Failed to delete confirmation code");
        }
        sent?;

        tracing::info!(email, "Sent disclosure request");

        Ok(request_token)
    }

    /// Attest the email bound to the request that `access_token` answers,
    /// then deliver the attestation to the wallet.
    ///
    /// Delivery is best-effort: push & mail failures end up in
    /// [`VerifyResponse::warnings`] instead of failing the call.
    pub async fn verify(
        &self,
        access_token: &str,
        options: VerifyOptions,
    ) -> VerifierResult<VerifyResponse> {
        let ResolvedResponse { email, .. } = self.resolver.resolve(access_token)?;
        stage(VerifyStage::EmailResolved);

        let identity = self
            .authority
            .receive(access_token)
            .await
            .map_err(VerifierError::IdentityResolutionFailed)?;
        stage(VerifyStage::IdentityReceived);

        let attestation = self
            .authority
            .attest(&AttestationClaim::email(&identity.address, &email))
            .await
            .map_err(VerifierError::AttestationFailed)?;
        stage(VerifyStage::Attested);

        tracing::info!(%email, address = %identity.address, "Issued email attestation");

        let attestation_uri = wallet_uri::add_attestation(self.config.wallet_scheme(), &attestation);
        let mut warnings = Vec::new();

        if options.send_push {
            match self.push(&identity, &attestation_uri).await {
                Ok(()) => stage(VerifyStage::Pushed),
                Err(err) => record_warning(&mut warnings, err),
            }
        }

        if options.send_email {
            match self
                .deliver_code(&email, MessageKind::Receive, &attestation_uri)
                .await
            {
                Ok(CodeDelivery { sent, cleanup }) => {
                    match sent {
                        Ok(_) => stage(VerifyStage::Emailed),
                        Err(err) => record_warning(&mut warnings, err),
                    }
                    if let Err(err) = cleanup {
                        record_warning(&mut warnings, err);
                    }
                }
                Err(err) => record_warning(&mut warnings, err),
            }
        }

        stage(VerifyStage::Done);

        Ok(VerifyResponse {
            address: identity.address,
            push_token: identity.push_token,
            attestation,
            email,
            access_token: access_token.to_string(),
            warnings,
        })
    }

    /// Remove code images older than `max_age` left behind by interrupted flows.
    /// Returns how many were removed.
    pub async fn sweep_artifacts(&self, max_age: Duration) -> VerifierResult<usize> {
        self.artifacts.sweep_stale(max_age).await
    }

    async fn push(&self, identity: &Identity, url: &str) -> VerifierResult<()> {
        let Some(push_token) = identity.push_token.as_deref() else {
            return Err(VerifierError::PushNotificationFailed(anyhow!(
                "identity {} has no push token",
                identity.address
            )));
        };

        self.authority
            .push(
                push_token,
                &PushPayload {
                    url: url.to_string(),
                },
            )
            .await
            .map_err(VerifierError::PushNotificationFailed)
    }

    /// Create a code image for `uri`, mail it and delete it again.
    /// Fails only if the image couldn't be created.
    async fn deliver_code(
        &self,
        to: &str,
        kind: MessageKind,
        uri: &str,
    ) -> VerifierResult<CodeDelivery> {
        let artifact = self.artifacts.create(uri).await?;

        let MessageTemplate { subject, template } = self.config.templates().get(kind);
        let sent = self.mailer.send(to, subject, template, &artifact).await;
        let cleanup = self.artifacts.delete(artifact).await;

        Ok(CodeDelivery { sent, cleanup })
    }
}

fn stage(stage: VerifyStage) {
    tracing::debug!(?stage, "Verification progressed");
}

fn record_warning(warnings: &mut Vec<Warning>, err: VerifierError) {
    tracing::warn!(%err, "Attestation delivery step failed");
    if let Some(warning) = err.as_warning() {
        warnings.push(warning);
    }
}
