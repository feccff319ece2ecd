// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! imagesaid API server
//!
//! Serves the JSON API a browser front end drives.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use imagesaid::config::EngineOptions;
use imagesaid::history::History;
use imagesaid::ollama::OllamaClient;
use imagesaid::renamer::FsRenamer;
use imagesaid::settings::JsonFileStore;
use imagesaid::{Result, Workflow};

#[derive(Parser, Debug)]
#[command(name = "imagesaid-web")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "imagesaid API server")]
struct Args {
    /// Settings file (JSON)
    #[arg(short, long, default_value = "imagesaid-settings.json")]
    settings: PathBuf,

    /// Rename history log (JSON lines)
    #[arg(long, default_value = "imagesaid_history.jsonl")]
    history: PathBuf,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug,tower_http=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("imagesaid API v{}", env!("CARGO_PKG_VERSION"));
    info!("Settings: {:?}", args.settings);

    let options = EngineOptions::default();
    let workflow = Workflow::new(
        Arc::new(OllamaClient::new(&options)?),
        Arc::new(FsRenamer::with_history(History::new(args.history))),
        Arc::new(JsonFileStore::new(args.settings)),
        &options,
    );

    let addr = format!("{}:{}", args.host, args.port);
    let served = tokio::select! {
        result = imagesaid::web::start_server(workflow.clone(), &addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    };

    workflow.flush_settings()?;
    served
}
