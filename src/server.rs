use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use jsonrpsee::server::{RpcModule, Server};
use jsonrpsee::types::ErrorObjectOwned;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::emulator::block::HeadCache;
use crate::ledger::LedgerApi;
use crate::methods::{eth, net, web3};
use crate::relay::Relayer;
use crate::resolver::AddressResolver;
use crate::store::Store;

/// Shared state for the RPC server.
pub struct RpcState {
    pub config: Config,
    pub ledger: Arc<dyn LedgerApi>,
    pub store: Store,
    pub head: HeadCache,
    pub resolver: Arc<AddressResolver>,
    pub relayer: Arc<Relayer>,
}

/// Start the JSON-RPC server.
pub async fn start_server(state: RpcState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server_port));

    info!("Starting MEVM RPC bridge on {}", addr);
    info!(
        "Chain ID: {} ({})",
        state.config.chain_id,
        state.config.chain_id_hex()
    );
    info!("Node URL: {}", state.config.node_url);

    match state.ledger.ledger_info().await {
        Ok(ledger_info) => {
            info!("Node reachable, block height {}", ledger_info.block_height);
        }
        Err(e) => {
            warn!("Could not reach the node (will retry on requests): {e}");
        }
    }

    let state = Arc::new(state);

    let mut module = RpcModule::new(state.clone());
    register_methods(&mut module)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);
    let middleware = tower::ServiceBuilder::new().layer(cors);

    let server = Server::builder()
        .set_http_middleware(middleware)
        .build(addr)
        .await
        .map_err(|e| anyhow!("Failed to bind server to {}: {}", addr, e))?;

    info!("MEVM RPC bridge listening on http://{}", addr);
    info!("Compatible with MetaMask, Hardhat, ethers.js, and other EVM tooling");

    let handle = server.start(module);

    // Runs until shutdown signal
    handle.stopped().await;

    info!("MEVM RPC bridge stopped");
    Ok(())
}

/// Register all JSON-RPC methods on the module.
fn register_methods(module: &mut RpcModule<Arc<RpcState>>) -> Result<()> {
    // --- eth_* methods ---

    module.register_async_method("eth_chainId", |params, ctx, _| async move {
        let _ = params;
        eth::chain_id(&ctx.config).await.map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_blockNumber", |params, ctx, _| async move {
        let _ = params;
        eth::block_number(&ctx.ledger, &ctx.head)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_gasPrice", |params, ctx, _| async move {
        let _ = params;
        eth::gas_price(&ctx.ledger).await.map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_feeHistory", |params, ctx, _| async move {
        let _ = params;
        eth::fee_history(&ctx.ledger, &ctx.head)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_getBalance", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::get_balance(&ctx.resolver, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_getTransactionCount", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::get_transaction_count(&ctx.resolver, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_getCode", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::get_code(&ctx.resolver, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_getStorageAt", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::get_storage_at(&ctx.ledger, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_call", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::call(&ctx.ledger, &p).await.map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_estimateGas", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::estimate_gas(&ctx.relayer, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_sendRawTransaction", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::send_raw_transaction(&ctx.relayer, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_getTransactionByHash", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::get_transaction_by_hash(&ctx.ledger, &ctx.store, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_getTransactionReceipt", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::get_transaction_receipt(&ctx.ledger, &ctx.store, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_getBlockByNumber", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::get_block_by_number(&ctx.ledger, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_getBlockByHash", |params, _ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::get_block_by_hash(&p).await.map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_getLogs", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::get_logs(&ctx.ledger, &ctx.head, &ctx.store, &p)
            .await
            .map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("eth_faucet", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::faucet(&ctx.relayer, &p).await.map_err(ErrorObjectOwned::from)
    })?;

    // --- bridge-specific methods ---

    module.register_async_method("mvm_getMoveHash", |params, ctx, _| async move {
        let p: Vec<serde_json::Value> = params.parse().unwrap_or_default();
        eth::move_hash(&ctx.store, &p).await.map_err(ErrorObjectOwned::from)
    })?;

    // --- net_* / web3_* methods ---

    module.register_async_method("net_version", |_params, ctx, _| async move {
        net::version(&ctx.config).await.map_err(ErrorObjectOwned::from)
    })?;

    module.register_async_method("web3_clientVersion", |_params, _ctx, _| async move {
        web3::client_version().await.map_err(ErrorObjectOwned::from)
    })?;

    info!("Registered all RPC methods successfully");
    Ok(())
}
