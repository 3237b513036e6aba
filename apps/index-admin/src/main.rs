//! Index Admin
//!
//! Operator CLI for the text and image embedding collections: provisioning,
//! statistics, ad-hoc searches and workspace cleanup. Every command prints
//! its result as pretty JSON on stdout.

use clap::Parser;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_embedding_index::IndexConfig;
use eyre::{Result, WrapErr};
use resilience::CancellationToken;
use tracing::{info, warn};

mod backend;
mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "index-admin")]
#[command(about = "Manage the text and image embedding collections")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    init_tracing(&environment);

    let cli = Cli::parse();

    let config = IndexConfig::from_env().wrap_err("Invalid index configuration")?;
    info!(
        backend = %config.backend,
        dimension = config.dimension,
        metric = %config.metric,
        region = %config.region,
        "Loaded index configuration"
    );

    let index = backend::build_index(&config)?;

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            shutdown.cancel();
        }
    });

    let output = commands::run(cli.command, &index, &token).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
