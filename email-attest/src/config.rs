//! The verifier's immutable configuration.
//!
//! A [`VerifierConfig`] only comes out of [`EmailVerifierBuilder::finalize`],
//! which validates everything at once, and is shared read-only between
//! concurrent flows afterwards.
//!
//! [`EmailVerifierBuilder::finalize`]: crate::builder::EmailVerifierBuilder::finalize

use crate::mailer::MessageTemplates;
use serde_json::{Map, Value};
use std::{fmt, path::PathBuf};

/// Immutable verifier settings
#[derive(Clone, Debug)]
pub struct VerifierConfig {
    pub(crate) callback_url: String,
    pub(crate) wallet_scheme: String,
    pub(crate) artifact_dir: PathBuf,
    pub(crate) custom_request_params: Map<String, Value>,
    pub(crate) mail: MailSettings,
    pub(crate) templates: MessageTemplates,
}

impl VerifierConfig {
    /// Default endpoint the wallet calls after scanning a disclosure request
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// URI scheme of wallet deep links
    pub fn wallet_scheme(&self) -> &str {
        &self.wallet_scheme
    }

    /// Directory transient code images are written to
    pub fn artifact_dir(&self) -> &std::path::Path {
        &self.artifact_dir
    }

    /// Extra parameters merged into every disclosure request
    pub fn custom_request_params(&self) -> &Map<String, Value> {
        &self.custom_request_params
    }

    /// Mail identity & transport settings
    pub fn mail(&self) -> &MailSettings {
        &self.mail
    }

    /// Subjects & templates per message kind
    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }
}

/// Mail identity & transport settings
#[derive(Clone, PartialEq, Eq)]
pub struct MailSettings {
    /// SMTP user name
    pub user: String,
    /// SMTP password
    pub pass: String,
    /// Sender mailbox, e.g. `Verifier <verify@example.com>`
    pub from: String,
    /// Where to deliver mail
    pub endpoint: SmtpEndpoint,
}

impl fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSettings")
            .field("user", &self.user)
            .field("from", &self.from)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// An SMTP server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpEndpoint {
    /// Host name
    pub host: String,
    /// Port
    pub port: u16,
    /// Whether the connection is TLS from the start.
    /// When `false`, STARTTLS is used if the server offers it.
    pub secure: bool,
}

impl SmtpEndpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// Look up the SMTP server of a well-known mail service (case-insensitive)
    pub fn well_known(service: &str) -> Option<Self> {
        let endpoint = match service.to_ascii_lowercase().as_str() {
            "gmail" | "googlemail" => Self::new("smtp.gmail.com", 465, true),
            "outlook" | "hotmail" | "outlook365" => Self::new("smtp-mail.outlook.com", 587, false),
            "office365" => Self::new("smtp.office365.com", 587, false),
            "yahoo" => Self::new("smtp.mail.yahoo.com", 465, true),
            "icloud" => Self::new("smtp.mail.me.com", 587, false),
            "zoho" => Self::new("smtp.zoho.com", 465, true),
            "sendgrid" => Self::new("smtp.sendgrid.net", 587, false),
            "mailgun" => Self::new("smtp.mailgun.org", 465, true),
            "fastmail" => Self::new("smtp.fastmail.com", 465, true),
            _ => return None,
        };
        Some(endpoint)
    }
}
