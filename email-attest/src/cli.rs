//! Main email-attest command line entry points
use crate::{
    logging::setup_tracing,
    settings::{AppEnvironment, Settings},
    setups::{local::LocalSetup, prod::HttpCredentialAuthority, prod::ProdSetup, VerifierSetup},
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use email_attest_core::common::VerifyOptions;
use serde::Serialize;
use serde_json::json;
use std::{path::PathBuf, time::Duration};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "email-attest")]
#[command(about = "Prove control of an email address and an identity with scannable codes")]
pub struct Cli {
    #[arg(long, help = "Path to the settings file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Whether to turn off ansi terminal colors")]
    no_colors: bool,
    #[arg(long, help = "Log JSON lines instead of human-readable text")]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

/// What to do
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Email a disclosure request bound to an email address
    Receive {
        /// Where to send the request
        email: String,
        /// Override the configured callback URL
        #[arg(long)]
        callback_url: Option<String>,
    },
    /// Attest the email bound to a wallet's access token & deliver the attestation
    Verify {
        /// The access token the wallet posted to the callback
        access_token: String,
        /// Skip the push notification
        #[arg(long)]
        no_push: bool,
        /// Skip the attestation email
        #[arg(long)]
        no_email: bool,
    },
    /// Remove code images left behind by interrupted runs
    SweepArtifacts {
        /// Only remove images at least this old
        #[arg(long, default_value_t = 3600)]
        older_than_secs: u64,
    },
    /// Print file paths used by the application (e.g. the path to the settings)
    Paths,
}

impl Cli {
    /// The settings file given on the command line, if any
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone()
    }

    /// Run the command, printing its result as JSON to stdout
    pub async fn run(&self, settings: Settings) -> Result<()> {
        setup_tracing(!self.no_colors, self.json_logs);

        tracing::debug!(?settings, "Loaded settings");

        match settings.environment {
            AppEnvironment::Local => self.run_with::<LocalSetup>(&settings).await,
            AppEnvironment::Prod => self.run_with::<ProdSetup>(&settings).await,
        }
    }

    async fn run_with<S>(&self, settings: &Settings) -> Result<()>
    where
        S: VerifierSetup<CredentialAuthority = HttpCredentialAuthority>,
    {
        if let Commands::Paths = &self.command {
            return print_json(&json!({
                "settings": settings.path,
                "artifactDir": settings.artifact_dir().unwrap_or_else(std::env::temp_dir),
            }));
        }

        let verifier = settings
            .verifier_builder::<S>()
            .with_credential_authority(settings.credential_authority()?)
            .finalize()?;

        tracing::info!(environment = %settings.environment, "Verifier ready");

        match &self.command {
            Commands::Receive {
                email,
                callback_url,
            } => {
                let request_token = verifier.receive(email, callback_url.as_deref()).await?;
                print_json(&json!({ "requestToken": request_token }))
            }
            Commands::Verify {
                access_token,
                no_push,
                no_email,
            } => {
                let options = VerifyOptions {
                    send_push: !no_push,
                    send_email: !no_email,
                };
                let response = verifier.verify(access_token, options).await?;
                print_json(&response)
            }
            Commands::SweepArtifacts { older_than_secs } => {
                let removed = verifier
                    .sweep_artifacts(Duration::from_secs(*older_than_secs))
                    .await?;
                print_json(&json!({ "removed": removed }))
            }
            Commands::Paths => Ok(()),
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clap::CommandFactory;
    use testresult::TestResult;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_verify() -> TestResult {
        let cli = Cli::try_parse_from([
            "email-attest",
            "--config",
            "settings.toml",
            "verify",
            "AT1",
            "--no-push",
        ])?;

        assert_eq!(cli.config_path(), Some(PathBuf::from("settings.toml")));
        assert_matches!(
            cli.command,
            Commands::Verify { access_token, no_push: true, no_email: false } if access_token == "AT1"
        );
        Ok(())
    }

    #[test]
    fn test_parse_sweep_default() -> TestResult {
        let cli = Cli::try_parse_from(["email-attest", "sweep-artifacts"])?;

        assert_matches!(
            cli.command,
            Commands::SweepArtifacts {
                older_than_secs: 3600
            }
        );
        Ok(())
    }
}
