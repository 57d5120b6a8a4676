#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::info;

use lcp_store::cli::{self, Cli};
use lcp_store::config::Config;
use lcp_store::db::StoreManager;
use lcp_store::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from_file(&cli.config)?;
    utils::logging::init_tracing(&config.logging);
    info!(dialect = %config.database.dialect(), "lcp-store starting up");

    let stores = StoreManager::from_config(&config.database).await?;
    let mut stdout = std::io::stdout().lock();
    cli::execute(&cli.command, &stores, &mut stdout).await
}
