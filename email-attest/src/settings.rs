//! Settings / Configuration.

use crate::{
    builder::EmailVerifierBuilder,
    mailer::Template,
    setups::{prod::HttpCredentialAuthority, VerifierSetup},
    verifier::EmailVerifier,
};
use anyhow::{anyhow, Result};
use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{fmt, path::PathBuf, time::Duration};
use url::Url;

/// Prefix of environment variables overriding settings.
/// `EMAIL_ATTEST_MAIL__HOST` overrides `host` in the `[mail]` section.
pub const ENV_PREFIX: &str = "EMAIL_ATTEST";

/// Names of environments for email-attest.
/// Overrides serialization to force lower case in settings and
/// environment variables
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    /// Local environment: emails are logged instead of sent.
    #[default]
    Local,
    /// Production environment.
    Prod,
}

/// Implement display to force environment to lower case
impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// Verification flow settings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Verifier {
    /// Endpoint the wallet calls after scanning a disclosure request
    pub callback_url: Option<String>,
    /// URI scheme of wallet deep links
    pub wallet_scheme: Option<String>,
    /// Directory for transient code images
    pub artifact_dir: Option<PathBuf>,
    /// Extra parameters for every disclosure request
    #[serde(default)]
    pub custom_request_params: Map<String, Value>,
}

/// Mail settings.
/// Either `service` or `host` and `port` select the SMTP server.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Mail {
    /// SMTP user
    pub user: Option<String>,
    /// SMTP password
    pub pass: Option<String>,
    /// Sender mailbox. Defaults to `user`.
    pub from: Option<String>,
    /// Well-known mail service, e.g. `gmail`
    pub service: Option<String>,
    /// SMTP host
    pub host: Option<String>,
    /// SMTP port
    pub port: Option<u16>,
    /// TLS from the start instead of STARTTLS
    pub secure: Option<bool>,
    /// Subject of confirmation emails
    pub confirm_subject: Option<String>,
    /// Subject of attestation emails
    pub receive_subject: Option<String>,
    /// HTML body of confirmation emails, `{{cid}}` is replaced by the code image reference
    pub confirm_template: Option<String>,
    /// HTML body of attestation emails, `{{cid}}` is replaced by the code image reference
    pub receive_template: Option<String>,
}

impl fmt::Debug for Mail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mail")
            .field("user", &self.user)
            .field("from", &self.from)
            .field("service", &self.service)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

/// Credential authority settings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Authority {
    /// Base URL of the credential authority's HTTP API
    pub url: Option<Url>,
}

/// Http-client retry options.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpClientRetryOptions {
    /// Retry count.
    pub count: u8,
    /// Retry lower bounds for [retry_policies::policies::ExponentialBackoff].
    pub bounds_low_ms: u64,
    /// Retry upper bounds for [retry_policies::policies::ExponentialBackoff].
    pub bounds_high_ms: u64,
}

impl Default for HttpClientRetryOptions {
    fn default() -> Self {
        Self {
            bounds_high_ms: 5_000,
            bounds_low_ms: 100,
            count: 3,
        }
    }
}

/// Settings for the credential authority's Http client.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpClient {
    /// Optional timeout for idle sockets being kept-alive.
    /// Using `None` or `0` to disable timeout.
    pub pool_idle_timeout_ms: Option<u64>,
    /// Http-client retry options.
    pub retry_options: HttpClientRetryOptions,
    /// Client timeout in milliseconds.
    pub timeout_ms: u64,
    /// User agent header to send
    pub user_agent: Option<String>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self {
            pool_idle_timeout_ms: Some(5_000),
            retry_options: HttpClientRetryOptions::default(),
            timeout_ms: 30_000,
            user_agent: Some(concat!("email-attest/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl HttpClient {
    /// Convert `pool_idle_timeout_ms` to [Duration].
    pub fn pool_idle_timeout(&self) -> Option<Duration> {
        self.pool_idle_timeout_ms.and_then(|timeout| {
            if timeout != 0 {
                Some(Duration::from_millis(timeout))
            } else {
                None
            }
        })
    }
}

/// Application settings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Settings {
    /// Which setup to run with
    #[serde(default)]
    pub environment: AppEnvironment,
    /// Verification flow settings
    #[serde(default)]
    pub verifier: Verifier,
    /// Mail settings
    #[serde(default)]
    pub mail: Mail,
    /// Credential authority settings
    #[serde(default)]
    pub authority: Authority,
    /// Http client settings
    #[serde(default)]
    pub http_client: HttpClient,
    /// The path the settings were loaded from.
    /// This can't actually be configured in the settings file itself, for obvious reasons.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from a TOML file (optional, defaults to [`default_config_file`])
    /// layered with `EMAIL_ATTEST_*` environment variables.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, None)
    }

    /// Like [`Settings::load`], but reads overrides from `env` instead of the
    /// process environment when given.
    fn load_with_env(
        config_path: Option<PathBuf>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let path = config_path.unwrap_or_else(default_config_file);
        // e.g. [mail] host="foo"
        // would be overridden by environment variable EMAIL_ATTEST_MAIL__HOST="foo"
        let s = Config::builder()
            .add_source(File::from(path.as_path()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;
        let mut settings: Self = s.try_deserialize()?;
        settings.path = Some(path);
        Ok(settings)
    }

    /// Create the HTTP credential authority client
    pub fn credential_authority(&self) -> Result<HttpCredentialAuthority> {
        let url = self
            .authority
            .url
            .clone()
            .ok_or_else(|| anyhow!("`authority.url` is required"))?;
        HttpCredentialAuthority::new(url, &self.http_client)
    }

    /// A verifier builder with every configured setting applied.
    /// Validation happens when the builder is finalized.
    pub fn verifier_builder<S: VerifierSetup>(&self) -> EmailVerifierBuilder<S> {
        let mut builder = EmailVerifier::<S>::builder()
            .with_custom_request_params(self.verifier.custom_request_params.clone());

        let verifier = &self.verifier;
        if let Some(url) = &verifier.callback_url {
            builder = builder.with_callback_url(url);
        }
        if let Some(scheme) = &verifier.wallet_scheme {
            builder = builder.with_wallet_scheme(scheme);
        }
        if let Some(dir) = self.artifact_dir() {
            builder = builder.with_artifact_dir(dir);
        }

        let mail = &self.mail;
        if let Some(user) = &mail.user {
            builder = builder.with_user(user);
        }
        if let Some(pass) = &mail.pass {
            builder = builder.with_pass(pass);
        }
        if let Some(from) = &mail.from {
            builder = builder.with_from(from);
        }
        if let Some(service) = &mail.service {
            builder = builder.with_service(service);
        }
        if let Some(host) = &mail.host {
            builder = builder.with_host(host);
        }
        if let Some(port) = mail.port {
            builder = builder.with_port(port);
        }
        if let Some(secure) = mail.secure {
            builder = builder.with_secure(secure);
        }
        if let Some(subject) = &mail.confirm_subject {
            builder = builder.with_confirm_subject(subject);
        }
        if let Some(subject) = &mail.receive_subject {
            builder = builder.with_receive_subject(subject);
        }
        if let Some(html) = &mail.confirm_template {
            builder = builder.with_confirm_template(Template::from_html(html));
        }
        if let Some(html) = &mail.receive_template {
            builder = builder.with_receive_template(Template::from_html(html));
        }

        builder
    }

    /// The configured artifact directory, relative to the settings file's directory
    pub fn artifact_dir(&self) -> Option<PathBuf> {
        self.verifier
            .artifact_dir
            .as_deref()
            .map(|dir| self.relative_path(dir))
    }

    fn relative_path(&self, path: &std::path::Path) -> PathBuf {
        match self.path.as_ref().and_then(|p| p.parent()) {
            Some(settings_dir) if path.is_relative() => settings_dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// `settings.toml` in the operating system's configuration directory for email-attest,
/// or in the working directory if there is none
pub fn default_config_file() -> PathBuf {
    ProjectDirs::from("", "", "email-attest")
        .map(|dirs| dirs.config_dir().join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from("settings.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setups::test::{TestCredentialAuthority, TestSetup};
    use serde_json::json;
    use testresult::TestResult;

    const SETTINGS: &str = r#"
environment = "prod"

[verifier]
callback_url = "https://verifier.example.com/verify"
artifact_dir = "codes"
custom_request_params = { requested = ["name"] }

[mail]
user = "verifier@example.com"
pass = "hunter2"
host = "smtp.example.com"
port = 587
confirm_subject = "Please confirm"
confirm_template = "<img src=\"{{cid}}\"/>"

[authority]
url = "https://authority.example.com/api/"

[http_client]
timeout_ms = 1000
"#;

    #[test]
    fn test_default_http_client_settings() {
        let settings = HttpClient::default();

        assert_eq!(
            settings.pool_idle_timeout(),
            Some(Duration::from_millis(5_000))
        );
        assert_eq!(settings.retry_options.bounds_high_ms, 5_000);
        assert_eq!(settings.retry_options.bounds_low_ms, 100);
        assert_eq!(settings.retry_options.count, 3);
        assert_eq!(settings.timeout_ms, 30_000);
    }

    #[test]
    fn test_zero_idle_timeout_disables_it() {
        let settings = HttpClient {
            pool_idle_timeout_ms: Some(0),
            ..Default::default()
        };

        assert_eq!(settings.pool_idle_timeout(), None);
    }

    #[test]
    fn test_load_file_with_env_overrides() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, SETTINGS)?;

        let env = config::Map::from([
            (
                "EMAIL_ATTEST_VERIFIER__WALLET_SCHEME".to_string(),
                "wallet".to_string(),
            ),
            ("EMAIL_ATTEST_MAIL__PORT".to_string(), "2525".to_string()),
        ]);
        let settings = Settings::load_with_env(Some(path.clone()), Some(env))?;

        assert_eq!(settings.environment, AppEnvironment::Prod);
        assert_eq!(settings.path, Some(path));
        assert_eq!(
            settings.verifier.callback_url.as_deref(),
            Some("https://verifier.example.com/verify")
        );
        assert_eq!(settings.verifier.wallet_scheme.as_deref(), Some("wallet"));
        assert_eq!(
            Value::Object(settings.verifier.custom_request_params.clone()),
            json!({ "requested": ["name"] })
        );
        assert_eq!(settings.mail.host.as_deref(), Some("smtp.example.com"));
        assert_eq!(settings.mail.port, Some(2525));
        assert_eq!(settings.http_client.timeout_ms, 1000);
        assert_eq!(settings.http_client.retry_options.count, 3);
        assert!(!format!("{:?}", settings.mail).contains("hunter2"));

        let authority = settings.credential_authority();
        assert!(authority.is_ok());

        let verifier = settings
            .verifier_builder::<TestSetup>()
            .with_credential_authority(TestCredentialAuthority::default())
            .finalize()?;
        let config = verifier.config();
        assert_eq!(config.wallet_scheme(), "wallet");
        assert_eq!(config.artifact_dir(), dir.path().join("codes"));
        assert_eq!(config.mail().endpoint.port, 2525);
        assert_eq!(
            config
                .templates()
                .get(crate::mailer::MessageKind::Confirm)
                .template
                .render("cid:x"),
            "<img src=\"cid:x\"/>"
        );
        Ok(())
    }

    #[test]
    fn test_missing_file_is_fine() -> TestResult {
        let dir = tempfile::tempdir()?;
        let settings =
            Settings::load_with_env(Some(dir.path().join("nope.toml")), Some(Default::default()))?;

        assert_eq!(settings.environment, AppEnvironment::Local);
        assert!(settings.credential_authority().is_err());
        Ok(())
    }
}
