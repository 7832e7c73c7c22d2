//! Production verifier setup code

use crate::{
    config::MailSettings,
    mailer::{DeliveryInfo, OutgoingMail},
    settings,
    setups::{CodeRenderer, CredentialAuthority, MailTransport, TokenDecoder, VerifierSetup},
};
use anyhow::{anyhow, bail, Context as _, Result};
use async_trait::async_trait;
use email_attest_core::common::{AttestationClaim, Identity, PushPayload};
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use qrcode::QrCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;
use retry_policies::policies::ExponentialBackoffBuilder;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, io::Cursor, sync::Arc, time::Duration};
use url::Url;

/// Production implementation of `VerifierSetup`.
/// Actually calls out to the credential authority & SMTP server configured in `settings.toml`.
#[derive(Clone, Debug, Default)]
pub struct ProdSetup;

impl VerifierSetup for ProdSetup {
    type CredentialAuthority = HttpCredentialAuthority;
    type MailTransport = SmtpMailTransport;
    type TokenDecoder = JwtPayloadDecoder;
    type CodeRenderer = QrPngRenderer;
}

/// Talks JSON to a credential authority service over HTTP.
///
/// Endpoints, relative to the base URL:
/// - `POST requests`: disclosure request params -> `{ "token" }`
/// - `POST receive`: `{ "accessToken" }` -> identity
/// - `POST attest`: attestation claim -> `{ "token" }`
/// - `POST push`: `{ "pushToken", "payload" }` -> anything successful
#[derive(Clone, Debug)]
pub struct HttpCredentialAuthority {
    client: ClientWithMiddleware,
    base_url: Url,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReceiveRequest<'a> {
    access_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushRequest<'a> {
    push_token: &'a str,
    payload: &'a PushPayload,
}

impl HttpCredentialAuthority {
    /// Create a client for the authority at `base_url`.
    /// Transient failures are retried with exponential backoff.
    pub fn new(mut base_url: Url, settings: &settings::HttpClient) -> Result<Self> {
        // Make relative endpoint paths append to the base path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .pool_idle_timeout(settings.pool_idle_timeout());
        if let Some(user_agent) = &settings.user_agent {
            client = client.user_agent(user_agent);
        }

        let retry = &settings.retry_options;
        let client = ClientBuilder::new(client.build()?)
            .with(RetryTransientMiddleware::new_with_policy(
                ExponentialBackoffBuilder::default()
                    .retry_bounds(
                        Duration::from_millis(retry.bounds_low_ms),
                        Duration::from_millis(retry.bounds_high_ms),
                    )
                    .build_with_max_retries(retry.count.into()),
            ))
            .build();

        Ok(Self { client, base_url })
    }

    async fn call<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.base_url.join(endpoint)?;

        tracing::debug!(%url, "Calling credential authority");

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .with_context(|| format!("POST {url}"))?;

        Ok(response)
    }

    async fn call_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.call(endpoint, body).await?;
        response
            .json()
            .await
            .with_context(|| format!("decoding `{endpoint}` response"))
    }
}

#[async_trait]
impl CredentialAuthority for HttpCredentialAuthority {
    async fn create_request(&self, params: &Map<String, Value>) -> Result<String> {
        let TokenResponse { token } = self.call_json("requests", params).await?;
        Ok(token)
    }

    async fn receive(&self, access_token: &str) -> Result<Identity> {
        self.call_json("receive", &ReceiveRequest { access_token })
            .await
    }

    async fn attest(&self, claim: &AttestationClaim) -> Result<String> {
        let TokenResponse { token } = self.call_json("attest", claim).await?;
        Ok(token)
    }

    async fn push(&self, push_token: &str, payload: &PushPayload) -> Result<()> {
        self.call("push", &PushRequest { push_token, payload })
            .await?;
        Ok(())
    }
}

/// Sends emails over SMTP
#[derive(Clone)]
pub struct SmtpMailTransport {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    host: String,
}

impl fmt::Debug for SmtpMailTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailTransport")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    fn connect(settings: &MailSettings) -> Result<Self> {
        settings
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("`from` {:?} is not a valid mailbox", settings.from))?;

        let endpoint = &settings.endpoint;
        let tls = TlsParameters::new(endpoint.host.clone())?;
        let tls = if endpoint.secure {
            Tls::Wrapper(tls)
        } else {
            Tls::Opportunistic(tls)
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&endpoint.host)
            .port(endpoint.port)
            .tls(tls)
            .credentials(Credentials::new(
                settings.user.clone(),
                settings.pass.clone(),
            ))
            .build();

        tracing::debug!(host = %endpoint.host, port = endpoint.port, secure = endpoint.secure, "Configured SMTP transport");

        Ok(Self {
            transport: Arc::new(transport),
            host: endpoint.host.clone(),
        })
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<DeliveryInfo> {
        let image = tokio::fs::read(&mail.inline_image.path)
            .await
            .with_context(|| format!("reading {}", mail.inline_image.path.display()))?;
        let content_type = ContentType::parse(mail.inline_image.content_type)?;

        let message = Message::builder()
            .from(mail.from.parse::<Mailbox>()?)
            .to(mail
                .to
                .parse::<Mailbox>()
                .with_context(|| format!("invalid recipient {:?}", mail.to))?)
            .subject(&mail.subject)
            .message_id(None)
            .multipart(
                MultiPart::related()
                    .singlepart(SinglePart::html(mail.html.clone()))
                    .singlepart(
                        Attachment::new_inline(mail.inline_image.content_id.clone())
                            .body(image, content_type),
                    ),
            )?;

        let message_id = message
            .headers()
            .get_raw("Message-ID")
            .map(str::to_string);

        let response = self.transport.send(message).await?;

        Ok(DeliveryInfo {
            message_id,
            response: format!(
                "{} {}",
                response.code(),
                response.message().collect::<Vec<_>>().join(" ")
            ),
        })
    }
}

/// Reads the payload of a JWS in compact serialization (`header.payload.signature`).
/// Signatures are not checked.
#[derive(Clone, Copy, Debug, Default)]
pub struct JwtPayloadDecoder;

impl TokenDecoder for JwtPayloadDecoder {
    fn decode_payload(&self, token: &str) -> Result<Value> {
        let segments: Vec<&str> = token.split('.').collect();
        let [_, payload, _] = segments.as_slice() else {
            bail!("expected 3 dot-separated segments, got {}", segments.len());
        };

        let payload = base64_url::decode(payload).context("payload isn't base64url")?;
        serde_json::from_slice(&payload).context("payload isn't JSON")
    }
}

/// Renders QR codes as PNGs
#[derive(Clone, Copy, Debug, Default)]
pub struct QrPngRenderer;

impl CodeRenderer for QrPngRenderer {
    fn render_png(&self, data: &str) -> Result<Vec<u8>> {
        let qr_code =
            QrCode::new(data.as_bytes()).map_err(|e| anyhow!("Failed to create QR code: {e}"))?;

        let image = qr_code.render::<image::Luma<u8>>().build();
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .map_err(|e| anyhow!("Failed to encode QR code as PNG: {e}"))?;

        Ok(buffer)
    }
}
