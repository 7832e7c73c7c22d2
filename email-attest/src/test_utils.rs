use crate::{
    config::{MailSettings, SmtpEndpoint, VerifierConfig},
    mailer::MessageTemplates,
    setups::test::{
        TestCodeRenderer, TestCredentialAuthority, TestMailTransport, TestSetup, TestTokenDecoder,
    },
    verifier::EmailVerifier,
};
use anyhow::Result;
use email_attest_core::{callback, wallet_uri::DEFAULT_WALLET_SCHEME};
use serde_json::json;
use tempfile::TempDir;

pub(crate) const TEST_CALLBACK_URL: &str = "https://cb/verify";

pub(crate) fn test_config(callback_url: &str) -> VerifierConfig {
    VerifierConfig {
        callback_url: callback_url.to_string(),
        wallet_scheme: DEFAULT_WALLET_SCHEME.to_string(),
        artifact_dir: std::env::temp_dir(),
        custom_request_params: Default::default(),
        mail: MailSettings {
            user: "verifier@example.com".to_string(),
            pass: "secret".to_string(),
            from: "verifier@example.com".to_string(),
            endpoint: SmtpEndpoint::new("smtp.example.com", 465, true),
        },
        templates: MessageTemplates::default(),
    }
}

/// A verifier wired to recording test doubles, writing artifacts to a scratch directory
pub(crate) struct TestContext {
    pub(crate) verifier: EmailVerifier<TestSetup>,
    pub(crate) authority: TestCredentialAuthority,
    pub(crate) transport: TestMailTransport,
    pub(crate) decoder: TestTokenDecoder,
    pub(crate) artifact_dir: TempDir,
}

impl TestContext {
    pub(crate) fn new() -> Result<Self> {
        Self::with_renderer(TestCodeRenderer::default())
    }

    pub(crate) fn with_renderer(renderer: TestCodeRenderer) -> Result<Self> {
        let artifact_dir = tempfile::tempdir()?;
        let authority = TestCredentialAuthority::default();
        let transport = TestMailTransport::default();
        let decoder = TestTokenDecoder::default();

        let verifier = EmailVerifier::<TestSetup>::builder()
            .with_credential_authority(authority.clone())
            .with_callback_url(TEST_CALLBACK_URL)
            .with_user("verifier@example.com")
            .with_pass("secret")
            .with_service("gmail")
            .with_artifact_dir(artifact_dir.path())
            .with_mail_transport(transport.clone())
            .with_token_decoder(decoder.clone())
            .with_code_renderer(renderer)
            .finalize()?;

        Ok(Self {
            verifier,
            authority,
            transport,
            decoder,
            artifact_dir,
        })
    }

    /// Make `access_token` decode as an answer to a request bound to `email`
    pub(crate) fn register_response(&self, access_token: &str, email: &str) {
        let callback_url = callback::bind_email(TEST_CALLBACK_URL, email)
            .expect("the test callback is a valid URL");
        self.register_callback(access_token, &callback_url);
    }

    /// Make `access_token` decode as an answer to a request with this callback URL
    pub(crate) fn register_callback(&self, access_token: &str, callback_url: &str) {
        let request_token = format!("request-for-{access_token}");
        self.decoder
            .insert(access_token, json!({ "req": request_token }));
        self.decoder
            .insert(&request_token, json!({ "callback": callback_url }));
    }

    /// How many files are in the artifact directory
    pub(crate) fn artifact_files(&self) -> Result<usize> {
        Ok(std::fs::read_dir(self.artifact_dir.path())?.count())
    }
}
