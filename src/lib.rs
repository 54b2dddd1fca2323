//! MEVM RPC Bridge
//!
//! This crate implements an Ethereum-compatible JSON-RPC service backed by a
//! Move-based ledger that has no native notion of Ethereum transactions,
//! blocks, or logs. Externally-signed Ethereum transactions are decoded,
//! nonce-ordered, and relayed through a single shared relayer account;
//! Ethereum-shaped blocks, transactions, and receipts are synthesized from
//! ledger data; and a background indexer maintains a durable, resumable
//! index of contract event logs for `eth_getLogs`.
//!
//! # Architecture
//!
//! ```text
//! EVM tooling (MetaMask/Hardhat/ethers.js)
//!     |
//!     | eth_* JSON-RPC calls
//!     v
//! MEVM RPC bridge (this crate)
//!     |            \
//!     | REST API    \ SQLite (raw txs, hash mappings, logs, cursor)
//!     v
//! Move ledger node
//! ```
//!
//! # Modules
//!
//! - `config` - Environment and configuration management
//! - `codec` - Raw Ethereum transaction decoding and sender recovery
//! - `ledger` - Capability interface over the Move ledger node
//! - `resolver` - Ethereum-to-native address resolution cache
//! - `relay` - Nonce-ordered, serialized transaction relay pipeline
//! - `emulator` - Block/transaction/receipt synthesis (ledger -> EVM format)
//! - `indexer` - Background contract-event log indexer
//! - `store` - Persistent store for raw txs, hash mappings, and logs
//! - `server` - JSON-RPC server setup and method registration
//! - `methods` - Individual RPC method implementations (eth, net, web3)

pub mod codec;
pub mod config;
pub mod emulator;
pub mod error;
pub mod indexer;
pub mod ledger;
pub mod methods;
pub mod relay;
pub mod resolver;
pub mod server;
pub mod store;
