//! Verifier setup for local development & easier integration testing

use crate::{
    config::MailSettings,
    mailer::{DeliveryInfo, OutgoingMail},
    setups::{
        prod::{HttpCredentialAuthority, JwtPayloadDecoder, QrPngRenderer},
        MailTransport, VerifierSetup,
    },
};
use anyhow::{Context as _, Result};
use async_trait::async_trait;

/// Implementation of `VerifierSetup` for local environments.
/// Talks to a real credential authority, but never sends emails.
#[derive(Debug, Clone)]
pub struct LocalSetup;

impl VerifierSetup for LocalSetup {
    type CredentialAuthority = HttpCredentialAuthority;
    type MailTransport = LoggingMailTransport;
    type TokenDecoder = JwtPayloadDecoder;
    type CodeRenderer = QrPngRenderer;
}

/// A `MailTransport` that doesn't actually send emails,
/// but instead logs them via tracing.
#[derive(Debug, Clone)]
pub struct LoggingMailTransport {
    from: String,
}

#[async_trait]
impl MailTransport for LoggingMailTransport {
    fn connect(settings: &MailSettings) -> Result<Self> {
        Ok(Self {
            from: settings.from.clone(),
        })
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<DeliveryInfo> {
        let image = tokio::fs::metadata(&mail.inline_image.path)
            .await
            .with_context(|| format!("reading {}", mail.inline_image.path.display()))?;

        tracing::info!(
            from = %self.from,
            to = %mail.to,
            subject = %mail.subject,
            content_id = %mail.inline_image.content_id,
            image_bytes = image.len(),
            html = %mail.html,
            "email (not sent)"
        );

        Ok(DeliveryInfo {
            message_id: None,
            response: "logged".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SmtpEndpoint, mailer::InlineImage};
    use testresult::TestResult;

    #[test_log::test(tokio::test)]
    async fn test_logging_transport_requires_image() -> TestResult {
        let transport = LoggingMailTransport::connect(&MailSettings {
            user: "user".into(),
            pass: "pass".into(),
            from: "verifier@example.com".into(),
            endpoint: SmtpEndpoint::new("localhost", 1025, false),
        })?;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("code.png");
        let mail = OutgoingMail {
            from: "verifier@example.com".into(),
            to: "a@b.com".into(),
            subject: "Confirm".into(),
            html: "<img src=\"cid:abc\"/>".into(),
            inline_image: InlineImage {
                content_id: "abc".into(),
                path: path.clone(),
                content_type: "image/png",
            },
        };

        assert!(transport.send(&mail).await.is_err());

        std::fs::write(&path, b"png")?;
        let info = transport.send(&mail).await?;
        assert_eq!(info.message_id, None);
        Ok(())
    }
}
