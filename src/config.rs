use anyhow::{Context, Result};
use std::env;

/// Move module that hosts the EVM execution entry points on the ledger.
pub const EVM_CONTRACT: &str = "0x1";

/// 32-byte zero hash, hex encoded.
pub const ZERO_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// 20-byte zero address, hex encoded.
pub const ZERO_ADDRESS_HEX: &str = "0x0000000000000000000000000000000000000000";

/// 256-byte all-zero logs bloom, hex encoded.
pub fn zero_bloom() -> String {
    format!("0x{}", "0".repeat(512))
}

/// Ratio between Ethereum's 18 decimals and the ledger's 8: gas prices move
/// across the boundary multiplied or divided by 10^10.
pub const GAS_PRICE_SCALE: u128 = 10_000_000_000;

/// MEVM RPC bridge configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Move node REST API base URL
    pub node_url: String,
    /// ed25519 private key (hex) of the shared relayer account
    pub relayer_private_key: String,
    /// ed25519 private key (hex) of the faucet account
    pub faucet_private_key: String,
    /// Ethereum chain ID reported to clients
    pub chain_id: u64,
    /// RPC server port
    pub server_port: u16,
    /// SQLite database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Call dotenvy::dotenv() before calling this.
    pub fn from_env() -> Result<Self> {
        let node_url =
            env::var("NODE_URL").context("NODE_URL must be set in environment or .env file")?;

        let relayer_private_key = env::var("EVM_SENDER")
            .context("EVM_SENDER must be set in environment or .env file")?;

        let faucet_private_key = env::var("FAUCET_SENDER")
            .context("FAUCET_SENDER must be set in environment or .env file")?;

        let chain_id: u64 = env::var("CHAIN_ID")
            .unwrap_or_else(|_| "336".to_string())
            .parse()
            .context("CHAIN_ID must be a valid u64")?;

        let server_port: u16 = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3044".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://mevm-rpc.db".to_string());

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Config {
            node_url,
            relayer_private_key,
            faucet_private_key,
            chain_id,
            server_port,
            database_url,
            log_level,
        })
    }

    /// Return the chain ID as a hex string with 0x prefix
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }
}
