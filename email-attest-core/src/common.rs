//! Request and response data types that are common and useful between email-attest and its clients

use serde::{Deserialize, Serialize};

/// The identity behind an access token, as resolved by the credential authority
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Long-lived identity address
    pub address: String,
    /// Ephemeral push notification token.
    /// Absent when the wallet didn't grant push notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

/// The claim body of an email attestation
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct EmailClaim {
    /// The verified email address
    pub email: String,
}

/// What the credential authority is asked to sign
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AttestationClaim {
    /// Subject of the attestation (the identity address)
    pub sub: String,
    /// The attested claim
    pub claim: EmailClaim,
}

impl AttestationClaim {
    /// Attest that `sub` controls `email`
    pub fn email(sub: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            claim: EmailClaim {
                email: email.into(),
            },
        }
    }
}

/// Payload of a push notification
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PushPayload {
    /// Wallet-addressable URI the notification opens
    pub url: String,
}

/// Which best-effort deliveries to attempt after an attestation was issued
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOptions {
    /// Deliver the attestation via push notification
    #[serde(default = "enabled")]
    pub send_push: bool,
    /// Deliver the attestation via email containing a scannable code
    #[serde(default = "enabled")]
    pub send_email: bool,
}

fn enabled() -> bool {
    true
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            send_push: true,
            send_email: true,
        }
    }
}

/// Result of a successful verification
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// The identity address the email was attested to
    pub address: String,
    /// The identity's push token, if any
    pub push_token: Option<String>,
    /// The signed attestation
    pub attestation: String,
    /// The verified email address
    pub email: String,
    /// The access token this verification was based on
    pub access_token: String,
    /// Best-effort delivery steps that failed.
    /// These never invalidate the attestation.
    pub warnings: Vec<Warning>,
}

/// Kinds of delivery failures that are reported instead of failing a verification
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WarningCode {
    /// The push notification could not be delivered
    PushNotificationFailed,
    /// The attestation email could not be delivered
    MailDeliveryFailed,
    /// The scannable code file could not be written or removed
    ArtifactIOFailed,
}

/// A non-fatal failure attached to an otherwise successful result
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Warning {
    /// What kind of step failed
    pub code: WarningCode,
    /// Human readable description of the failure
    pub detail: String,
}

impl Warning {
    /// Create a new warning
    pub fn new(code: WarningCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}
