//! Composing & sending the emails that carry scannable codes.

use crate::{
    artifact::CodeArtifact,
    error::{VerifierError, VerifierResult},
    setups::MailTransport,
};
use std::{fmt, path::PathBuf, sync::Arc};

/// Placeholder replaced with the `cid:` URI of the code image in HTML templates
pub const CID_PLACEHOLDER: &str = "{{cid}}";

/// Renders an HTML email body, given the `cid:` URI of the embedded code image
#[derive(Clone)]
pub struct Template(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl Template {
    /// Create a template from a function
    pub fn new(render: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(render))
    }

    /// Create a template from HTML containing [`CID_PLACEHOLDER`]s
    pub fn from_html(html: impl Into<String>) -> Self {
        let html = html.into();
        Self::new(move |cid_uri| html.replace(CID_PLACEHOLDER, cid_uri))
    }

    /// Render the body
    pub fn render(&self, cid_uri: &str) -> String {
        (self.0)(cid_uri)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Template").finish_non_exhaustive()
    }
}

/// The two kinds of emails the verifier sends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Carries the disclosure request, asking to confirm the address
    Confirm,
    /// Carries the issued attestation
    Receive,
}

/// Subject & body template of one kind of email
#[derive(Clone, Debug)]
pub struct MessageTemplate {
    /// Email subject
    pub subject: String,
    /// Email body
    pub template: Template,
}

/// Lookup table from [`MessageKind`] to [`MessageTemplate`]
#[derive(Clone, Debug)]
pub struct MessageTemplates {
    confirm: MessageTemplate,
    receive: MessageTemplate,
}

impl MessageTemplates {
    /// Default subject of confirmation emails
    pub const DEFAULT_CONFIRM_SUBJECT: &'static str = "Confirm your email address";
    /// Default subject of attestation emails
    pub const DEFAULT_RECEIVE_SUBJECT: &'static str = "Your email attestation";

    /// Create the lookup table
    pub fn new(confirm: MessageTemplate, receive: MessageTemplate) -> Self {
        Self { confirm, receive }
    }

    /// The subject & template for a kind of email
    pub fn get(&self, kind: MessageKind) -> &MessageTemplate {
        match kind {
            MessageKind::Confirm => &self.confirm,
            MessageKind::Receive => &self.receive,
        }
    }

    /// The built-in confirmation email body
    pub fn default_confirm_template() -> Template {
        Template::from_html(
            "<p>Scan this code with your identity wallet to confirm your email address.</p>\
             <img src=\"{{cid}}\" alt=\"Confirmation code\"/>",
        )
    }

    /// The built-in attestation email body
    pub fn default_receive_template() -> Template {
        Template::from_html(
            "<p>Your email address is verified. \
             Scan this code with your identity wallet to store the attestation.</p>\
             <img src=\"{{cid}}\" alt=\"Attestation code\"/>",
        )
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self::new(
            MessageTemplate {
                subject: Self::DEFAULT_CONFIRM_SUBJECT.to_string(),
                template: Self::default_confirm_template(),
            },
            MessageTemplate {
                subject: Self::DEFAULT_RECEIVE_SUBJECT.to_string(),
                template: Self::default_receive_template(),
            },
        )
    }
}

/// A fully composed email, ready for a [`MailTransport`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Sender mailbox
    pub from: String,
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// HTML body, referencing the inline image by `cid:`
    pub html: String,
    /// The code image
    pub inline_image: InlineImage,
}

/// An image attached inline, to be referenced from the HTML body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineImage {
    /// Content id (without the `cid:` scheme)
    pub content_id: String,
    /// File holding the image
    pub path: PathBuf,
    /// MIME type of the image
    pub content_type: &'static str,
}

/// What the transport reported back for a delivered message
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryInfo {
    /// Message-ID header of the sent message, if known
    pub message_id: Option<String>,
    /// The transport's response text
    pub response: String,
}

/// Sends emails with an embedded code image
#[derive(Clone, Debug)]
pub struct Mailer<T: MailTransport> {
    transport: T,
    from: String,
}

impl<T: MailTransport> Mailer<T> {
    /// Create a new mailer, sending as `from`
    pub fn new(transport: T, from: impl Into<String>) -> Self {
        Self {
            transport,
            from: from.into(),
        }
    }

    /// Send one message with `artifact` as inline image.
    ///
    /// The template receives `cid:<artifact id>`, which is the content id
    /// the image is attached under.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &Template,
        artifact: &CodeArtifact,
    ) -> VerifierResult<DeliveryInfo> {
        let mail = OutgoingMail {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            html: template.render(&artifact.content_id_uri()),
            inline_image: InlineImage {
                content_id: artifact.id().to_string(),
                path: artifact.path().to_path_buf(),
                content_type: "image/png",
            },
        };

        tracing::debug!(to, subject, content_id = artifact.id(), "Sending email");

        let info = self
            .transport
            .send(&mail)
            .await
            .map_err(VerifierError::MailDeliveryFailed)?;

        tracing::info!(to, subject, message_id = ?info.message_id, "Email sent");

        Ok(info)
    }
}
