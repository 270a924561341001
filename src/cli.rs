//! The operator-facing CLI surface: `run`, `verify`, and `status` (§6).
//!
//! CLI flags are the final layer over [`AppConfig`]'s file/environment
//! layering, for the values an operator is most likely to tune at
//! invocation time.

use crate::config::AppConfig;
use crate::crawler::Crawler;
use crate::rpc::RpcPool;
use crate::store::Store;
use crate::verifier;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

#[derive(Parser)]
#[command(name = "chain-event-crawler", version, about = "Reorg-safe Deposit/Withdraw event crawler")]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a config file (TOML/YAML/JSON); overrides the default search path.
    #[arg(long, env = "CRAWLER_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Override the active network selector.
    #[arg(long, global = true)]
    pub network: Option<String>,

    /// Override the database URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Override the active chain's RPC endpoints (comma-separated, in failover order).
    #[arg(long = "rpc-url", value_delimiter = ',', global = true)]
    pub rpc_urls: Option<Vec<String>>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the crawler loop for the configured network and block until shutdown.
    Run,
    /// Invoke the fallback verifier once for a single transaction.
    Verify {
        chain_id: String,
        tx_hash: String,
    },
    /// Print the checkpoint and per-status row counts for the configured network.
    Status,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_from_file(path)?,
            None => AppConfig::load()?,
        };

        if let Some(network) = &self.network {
            config.network = network.clone();
        }
        if let Some(database_url) = &self.database_url {
            config.database_url = database_url.clone();
        }
        if let Some(rpc_urls) = &self.rpc_urls {
            let network = config.network.clone();
            if let Some(chain) = config.chains.get_mut(&network) {
                chain.rpc_urls = rpc_urls.clone();
            }
        }

        config.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }

    pub async fn execute(self) -> anyhow::Result<()> {
        let config = self.load_config()?;

        match self.command {
            Command::Run => run_command(config).await,
            Command::Verify { chain_id, tx_hash } => verify_command(config, chain_id, tx_hash).await,
            Command::Status => status_command(config).await,
        }
    }
}

async fn run_command(config: AppConfig) -> anyhow::Result<()> {
    let chain = config.active_chain().map_err(|e| anyhow::anyhow!(e))?.clone();
    tracing::info!(chain_id = %chain.chain_id, name = %chain.name, "starting crawler");

    let rpc = RpcPool::new(&chain)?;
    let store = Store::new(&config.database_url).await?;
    let mut crawler = Crawler::new(chain, rpc, store).await?;

    let shutdown = crawler.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received, stopping after the current batch");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    crawler.run().await?;
    Ok(())
}

async fn verify_command(config: AppConfig, chain_id: String, tx_hash: String) -> anyhow::Result<()> {
    let chain = config
        .chains
        .get(&chain_id)
        .ok_or_else(|| anyhow::anyhow!("unknown chain '{chain_id}'"))?;

    let rpc = RpcPool::new(chain)?;
    let store = Store::new(&config.database_url).await?;

    let outcome = verifier::verify(&config, &rpc, &store, &chain_id, &tx_hash).await?;

    println!("found: {}", outcome.found);
    println!("message: {}", outcome.message);
    if let Some(row) = outcome.row {
        println!("transaction_hash: {}", row.transaction_hash);
        println!("operation: {}", row.operation);
        println!("amount: {}", row.amount);
        println!("status: {}", row.status);
        println!("confirmations: {}/{}", row.confirmations, row.require_confirmations);
    }

    Ok(())
}

async fn status_command(config: AppConfig) -> anyhow::Result<()> {
    let chain = config.active_chain().map_err(|e| anyhow::anyhow!(e))?;
    let store = Store::new(&config.database_url).await?;

    let checkpoint = store.get_checkpoint(&chain.chain_id).await?;
    let counts = store.status_counts(&chain.chain_id).await?;

    println!("network: {} ({})", chain.chain_id, chain.name);
    println!(
        "last_processed_block: {}",
        checkpoint.map(|b| b.to_string()).unwrap_or_else(|| "none".to_string())
    );
    for (status, count) in counts {
        println!("{status}: {count}");
    }

    Ok(())
}
