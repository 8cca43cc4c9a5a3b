//! The `natours` server binary.
//!
//! Configuration is read from `natours.toml` (or the file named by
//! `NATOURS_CONFIG`), then `.env`, `NODE_ENV` and `NATOURS__*` variables.

use anyhow::Context;
use natours::prelude::*;

const DEFAULT_CONFIG_FILE: &str = "natours.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::var("NATOURS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

    let config = ConfigLoader::new()
        .with_optional_file(&path)
        .with_context(|| format!("loading {path}"))?
        .with_dotenv()?
        .with_node_env()
        .with_env_prefix("NATOURS")
        .load()
        .context("invalid configuration")?;

    init_logging(&LogConfig::from(&config.logging))?;
    tracing::info!(
        environment = config.environment.as_str(),
        addr = %config.server.http_addr,
        "starting natours"
    );

    let app = natours::inspect::mount_all(App::builder(config.clone())).build();
    Server::new(app, config.server).run().await?;
    Ok(())
}
