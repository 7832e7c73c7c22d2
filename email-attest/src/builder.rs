//! Builder for [`EmailVerifier`]

use crate::{
    config::{MailSettings, SmtpEndpoint, VerifierConfig},
    error::ConfigurationError,
    mailer::{MessageTemplate, MessageTemplates, Template},
    setups::{MailTransport, VerifierSetup},
    verifier::EmailVerifier,
};
use email_attest_core::wallet_uri::DEFAULT_WALLET_SCHEME;
use serde_json::{Map, Value};
use std::{fmt, path::PathBuf};
use url::Url;

/// Builder for [`EmailVerifier`].
///
/// Nothing is checked until [`EmailVerifierBuilder::finalize`], which
/// reports every problem at once.
pub struct EmailVerifierBuilder<S: VerifierSetup> {
    credential_authority: Option<S::CredentialAuthority>,
    callback_url: Option<String>,
    user: Option<String>,
    pass: Option<String>,
    service: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    secure: Option<bool>,
    from: Option<String>,
    confirm_subject: Option<String>,
    receive_subject: Option<String>,
    confirm_template: Option<Template>,
    receive_template: Option<Template>,
    custom_request_params: Map<String, Value>,
    wallet_scheme: Option<String>,
    artifact_dir: Option<PathBuf>,
    mail_transport: Option<S::MailTransport>,
    token_decoder: Option<S::TokenDecoder>,
    code_renderer: Option<S::CodeRenderer>,
}

impl<S: VerifierSetup> Default for EmailVerifierBuilder<S> {
    fn default() -> Self {
        Self {
            credential_authority: None,
            callback_url: None,
            user: None,
            pass: None,
            service: None,
            host: None,
            port: None,
            secure: None,
            from: None,
            confirm_subject: None,
            receive_subject: None,
            confirm_template: None,
            receive_template: None,
            custom_request_params: Map::new(),
            wallet_scheme: None,
            artifact_dir: None,
            mail_transport: None,
            token_decoder: None,
            code_renderer: None,
        }
    }
}

impl<S: VerifierSetup> fmt::Debug for EmailVerifierBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailVerifierBuilder")
            .field("callback_url", &self.callback_url)
            .field("user", &self.user)
            .field("service", &self.service)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("from", &self.from)
            .field("wallet_scheme", &self.wallet_scheme)
            .field("artifact_dir", &self.artifact_dir)
            .finish_non_exhaustive()
    }
}

impl<S: VerifierSetup> EmailVerifierBuilder<S> {
    /// Finalize the builder and return the [`EmailVerifier`].
    ///
    /// Requires a credential authority, a callback URL, SMTP user & password
    /// and exactly one of a well-known `service` or `host` + `port`.
    /// When no mail transport was given, one is connected from the mail settings.
    pub fn finalize(self) -> Result<EmailVerifier<S>, ConfigurationError> {
        let mut problems = ConfigurationError::default();

        if self.credential_authority.is_none() {
            problems.missing("credential_authority");
        }

        let callback_url = match self.callback_url {
            None => {
                problems.missing("callback_url");
                None
            }
            Some(url) => match Url::parse(&url) {
                Ok(_) => Some(url),
                Err(e) => {
                    problems.push(format!("`callback_url` {url:?} is not a valid URL: {e}"));
                    None
                }
            },
        };

        if self.user.is_none() {
            problems.missing("user");
        }
        if self.pass.is_none() {
            problems.missing("pass");
        }

        let endpoint = smtp_endpoint(
            self.service.as_deref(),
            self.host,
            self.port,
            self.secure,
            &mut problems,
        );

        let mail = match (self.user, self.pass, endpoint) {
            (Some(user), Some(pass), Some(endpoint)) => Some(MailSettings {
                from: self.from.unwrap_or_else(|| user.clone()),
                user,
                pass,
                endpoint,
            }),
            _ => None,
        };

        let mail_transport = match (self.mail_transport, &mail) {
            (Some(transport), _) => Some(transport),
            (None, Some(mail)) => match S::MailTransport::connect(mail) {
                Ok(transport) => Some(transport),
                Err(e) => {
                    problems.push(format!("can't set up the mail transport: {e:#}"));
                    None
                }
            },
            (None, None) => None,
        };

        let (Some(authority), Some(callback_url), Some(mail), Some(mail_transport)) = (
            self.credential_authority,
            callback_url,
            mail,
            mail_transport,
        ) else {
            return Err(problems);
        };
        problems.into_result()?;

        let templates = MessageTemplates::new(
            MessageTemplate {
                subject: self
                    .confirm_subject
                    .unwrap_or_else(|| MessageTemplates::DEFAULT_CONFIRM_SUBJECT.to_string()),
                template: self
                    .confirm_template
                    .unwrap_or_else(MessageTemplates::default_confirm_template),
            },
            MessageTemplate {
                subject: self
                    .receive_subject
                    .unwrap_or_else(|| MessageTemplates::DEFAULT_RECEIVE_SUBJECT.to_string()),
                template: self
                    .receive_template
                    .unwrap_or_else(MessageTemplates::default_receive_template),
            },
        );

        let config = VerifierConfig {
            callback_url,
            wallet_scheme: self
                .wallet_scheme
                .unwrap_or_else(|| DEFAULT_WALLET_SCHEME.to_string()),
            artifact_dir: self.artifact_dir.unwrap_or_else(std::env::temp_dir),
            custom_request_params: self.custom_request_params,
            mail,
            templates,
        };

        tracing::debug!(?config, "Email verifier configured");

        Ok(EmailVerifier::new(
            config,
            authority,
            mail_transport,
            self.token_decoder.unwrap_or_default(),
            self.code_renderer.unwrap_or_default(),
        ))
    }

    /// Set the credential authority that signs requests & attestations
    pub fn with_credential_authority(mut self, authority: S::CredentialAuthority) -> Self {
        self.credential_authority = Some(authority);
        self
    }

    /// Set the default callback URL for disclosure requests
    pub fn with_callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = Some(callback_url.into());
        self
    }

    /// Set the SMTP user name
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the SMTP password
    pub fn with_pass(mut self, pass: impl Into<String>) -> Self {
        self.pass = Some(pass.into());
        self
    }

    /// Deliver via a well-known mail service, e.g. `gmail`.
    /// Conflicts with [`Self::with_host`] & [`Self::with_port`].
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the SMTP host. Needs a port as well.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the SMTP port. Needs a host as well.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Use TLS from the start of the connection instead of STARTTLS
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Set the sender mailbox. Defaults to the SMTP user.
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the subject of confirmation emails
    pub fn with_confirm_subject(mut self, subject: impl Into<String>) -> Self {
        self.confirm_subject = Some(subject.into());
        self
    }

    /// Set the subject of attestation emails
    pub fn with_receive_subject(mut self, subject: impl Into<String>) -> Self {
        self.receive_subject = Some(subject.into());
        self
    }

    /// Set the body template of confirmation emails
    pub fn with_confirm_template(mut self, template: Template) -> Self {
        self.confirm_template = Some(template);
        self
    }

    /// Set the body template of attestation emails
    pub fn with_receive_template(mut self, template: Template) -> Self {
        self.receive_template = Some(template);
        self
    }

    /// Set extra parameters for every disclosure request
    pub fn with_custom_request_params(mut self, params: Map<String, Value>) -> Self {
        self.custom_request_params = params;
        self
    }

    /// Set the URI scheme of wallet deep links
    pub fn with_wallet_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.wallet_scheme = Some(scheme.into());
        self
    }

    /// Set the directory for transient code images
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Use this mail transport instead of connecting one from the mail settings
    pub fn with_mail_transport(mut self, transport: S::MailTransport) -> Self {
        self.mail_transport = Some(transport);
        self
    }

    /// Set the token decoder
    pub fn with_token_decoder(mut self, decoder: S::TokenDecoder) -> Self {
        self.token_decoder = Some(decoder);
        self
    }

    /// Set the code renderer
    pub fn with_code_renderer(mut self, renderer: S::CodeRenderer) -> Self {
        self.code_renderer = Some(renderer);
        self
    }
}

fn smtp_endpoint(
    service: Option<&str>,
    host: Option<String>,
    port: Option<u16>,
    secure: Option<bool>,
    problems: &mut ConfigurationError,
) -> Option<SmtpEndpoint> {
    match (service, host, port) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            problems.push("`service` conflicts with `host`/`port`, supply only one of them");
            None
        }
        (Some(service), None, None) => {
            let Some(mut endpoint) = SmtpEndpoint::well_known(service) else {
                problems.push(format!("unknown mail `service` {service:?}"));
                return None;
            };
            if let Some(secure) = secure {
                endpoint.secure = secure;
            }
            Some(endpoint)
        }
        (None, Some(host), Some(port)) => {
            Some(SmtpEndpoint::new(host, port, secure.unwrap_or(false)))
        }
        (None, Some(_), None) => {
            problems.missing("port");
            None
        }
        (None, None, Some(_)) => {
            problems.missing("host");
            None
        }
        (None, None, None) => {
            problems.push("either `service` or `host` and `port` are required");
            None
        }
    }
}
