use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tracing::info;

use crate::db::{RecordStream, StoreManager};

#[derive(Debug, Parser)]
#[command(name = "lcp-store", version, about = "Inspect the LCP content index and license store")]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the content and license tables if they are missing
    Init,
    #[command(subcommand)]
    Content(ContentCommand),
    #[command(subcommand)]
    License(LicenseCommand),
}

#[derive(Debug, Subcommand)]
pub enum ContentCommand {
    Get { id: String },
    List,
}

#[derive(Debug, Subcommand)]
pub enum LicenseCommand {
    Get {
        id: String,
    },
    /// Licenses issued for one content
    List {
        content_id: String,
        /// Page size
        #[arg(long, default_value_t = 30)]
        page: u32,
        /// Zero-based page index
        #[arg(long, default_value_t = 0)]
        page_num: u32,
    },
    /// All licenses, most recent first
    ListAll {
        #[arg(long, default_value_t = 30)]
        page: u32,
        #[arg(long, default_value_t = 0)]
        page_num: u32,
    },
    SetStatus {
        id: String,
        status: i32,
    },
}

/// Runs one command against already opened stores, writing JSON lines to `out`.
pub async fn execute<W: Write>(command: &Command, stores: &StoreManager, out: &mut W) -> Result<()> {
    match command {
        Command::Init => {
            let report = serde_json::json!({
                "backend": stores.database().backend_name(),
                "dialect": stores.dialect(),
            });
            print_json(out, &report)?;
        }
        Command::Content(ContentCommand::Get { id }) => {
            print_json(out, &stores.content_index().get(id).await?)?;
        }
        Command::Content(ContentCommand::List) => {
            let count = drain(stores.content_index().list().await, out).await?;
            info!(count, "listed content");
        }
        Command::License(LicenseCommand::Get { id }) => {
            print_json(out, &stores.license_store().get(id).await?)?;
        }
        Command::License(LicenseCommand::List {
            content_id,
            page,
            page_num,
        }) => {
            let stream = stores.license_store().list(content_id, *page, *page_num).await;
            let count = drain(stream, out).await?;
            info!(count, content_id = %content_id, "listed licenses");
        }
        Command::License(LicenseCommand::ListAll { page, page_num }) => {
            let count = drain(stores.license_store().list_all(*page, *page_num).await, out).await?;
            info!(count, "listed licenses");
        }
        Command::License(LicenseCommand::SetStatus { id, status }) => {
            stores.license_store().update_lsd_status(id, *status).await?;
            info!(license = %id, status, "license status updated");
        }
    }
    Ok(())
}

fn print_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

async fn drain<W: Write, T: Serialize>(mut stream: RecordStream<T>, out: &mut W) -> Result<usize> {
    let mut count = 0;
    while let Some(record) = stream.next().await {
        print_json(out, &record?)?;
        count += 1;
    }
    Ok(count)
}
