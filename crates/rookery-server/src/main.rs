use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use crate::config::Config;

mod config;
mod server;

const THREAD_NAME: &str = "rookery-server";

#[derive(Debug, Parser)]
#[command(name = "rookery", version, about = "GraphQL API over a relational social graph")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long)]
    listen_address: Option<SocketAddr>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(listen_address) = args.listen_address {
        config.network.listen_address = listen_address;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rookery=info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name(THREAD_NAME)
        .build()?;

    runtime.block_on(server::serve(config))
}
