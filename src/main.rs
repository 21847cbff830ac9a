use anyhow::Context;
use asta_lib::agent::CdpBrowser;
use asta_lib::branding::Branding;
use asta_lib::config::{self, AppConfig};
use asta_lib::shell::Shell;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,asta=info,asta_lib=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Never overwrite an existing file that failed to load
    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}. Using in-memory defaults.", e);
            AppConfig::default()
        }
    };
    let config = match config::validate_config(&config) {
        Ok(()) => config,
        Err(e) => {
            tracing::error!("Invalid config: {}. Using in-memory defaults.", e);
            AppConfig::default()
        }
    };

    let browser = CdpBrowser::launch(&config.browser)
        .await
        .context("Failed to start the browser")?
        .with_branding(Branding::new(config.branding.clone()));
    let mut shell = Shell::start(&config, Arc::new(browser))
        .await
        .context("Failed to open the first tab")?;

    shell.run().await?;
    tracing::info!("Shutting down");
    Ok(())
}
