//! email-attest

use anyhow::Result;
use clap::Parser;
use email_attest::{cli::Cli, settings::Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config_path())?;
    cli.run(settings).await?;

    Ok(())
}
