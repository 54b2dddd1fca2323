//! MEVM RPC Bridge
//!
//! Entry point for the bridge that serves Ethereum JSON-RPC on top of a
//! Move-based ledger. Loads configuration from environment/.env file, opens
//! the persistent store, starts the event indexer, and runs the JSON-RPC
//! server on the configured port.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mevm_rpc::config::Config;
use mevm_rpc::emulator::block::HeadCache;
use mevm_rpc::indexer::EventIndexer;
use mevm_rpc::ledger::{LedgerApi, LocalAccount, MoveRestClient};
use mevm_rpc::relay::Relayer;
use mevm_rpc::resolver::AddressResolver;
use mevm_rpc::server::{start_server, RpcState};
use mevm_rpc::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    info!("=== MEVM RPC Bridge ===");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Chain ID: {} ({})", config.chain_id, config.chain_id_hex());
    info!("  RPC Port: {}", config.server_port);
    info!("  Node URL: {}", config.node_url);
    info!("  Database: {}", config.database_url);

    let store = Store::connect(&config.database_url).await?;

    let ledger: Arc<dyn LedgerApi> = Arc::new(MoveRestClient::new(&config.node_url));
    let relayer_account = LocalAccount::from_private_key_hex(&config.relayer_private_key)?;
    let faucet_account = LocalAccount::from_private_key_hex(&config.faucet_private_key)?;
    info!("  Relayer: {}", relayer_account.address());

    let resolver = Arc::new(AddressResolver::new(ledger.clone()));
    let relayer = Arc::new(Relayer::new(
        ledger.clone(),
        resolver.clone(),
        store.clone(),
        relayer_account,
        faucet_account,
    ));

    let indexer = EventIndexer::new(ledger.clone(), store.clone()).start();

    let state = RpcState {
        config,
        ledger,
        store,
        head: HeadCache::new(),
        resolver,
        relayer,
    };

    let result = start_server(state).await;
    indexer.stop();
    result
}
