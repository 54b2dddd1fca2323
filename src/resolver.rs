use ethereum_types::U256;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::config::EVM_CONTRACT;
use crate::error::BridgeError;
use crate::ledger::{LedgerApi, ViewRequest};

/// Ethereum-visible account state, zero-valued until the address has been
/// deposited-to from the native side.
#[derive(Debug, Clone, Default)]
pub struct AccountInfo {
    pub balance: U256,
    pub nonce: u64,
    pub code: String,
}

impl AccountInfo {
    pub fn balance_hex(&self) -> String {
        format!("0x{:x}", self.balance)
    }

    pub fn nonce_hex(&self) -> String {
        format!("0x{:x}", self.nonce)
    }

    pub fn code_hex(&self) -> String {
        if self.code.is_empty() {
            "0x".to_string()
        } else {
            self.code.clone()
        }
    }
}

/// Maps Ethereum-style addresses to native ledger addresses. One-directional
/// and memoized for the process lifetime; entries are never invalidated.
pub struct AddressResolver {
    ledger: Arc<dyn LedgerApi>,
    cache: RwLock<HashMap<String, String>>,
}

impl AddressResolver {
    pub fn new(ledger: Arc<dyn LedgerApi>) -> Self {
        Self {
            ledger,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve an Ethereum address to its native counterpart. The lower-cased
    /// input is the cache key.
    pub async fn resolve(&self, eth_address: &str) -> Result<String, BridgeError> {
        let key = eth_address.to_lowercase();
        if let Some(native) = self.cache.read().expect("cache lock").get(&key) {
            return Ok(native.clone());
        }

        let request = ViewRequest {
            function: format!("{EVM_CONTRACT}::evm::get_move_address"),
            type_arguments: Vec::new(),
            arguments: vec![json!(key)],
        };
        let result = self.ledger.view(&request).await?;
        let native = result
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| BridgeError::NotFound(format!("native address for {key}")))?
            .to_string();

        debug!("resolved {key} -> {native}");
        self.cache
            .write()
            .expect("cache lock")
            .insert(key, native.clone());
        Ok(native)
    }

    /// Read balance/nonce/code for an Ethereum address. Addresses the ledger
    /// does not know yet resolve to zero-valued defaults rather than errors.
    pub async fn account_info(&self, eth_address: &str) -> AccountInfo {
        match self.try_account_info(eth_address).await {
            Ok(info) => info,
            Err(e) => {
                debug!("account info for {eth_address} unavailable, using defaults: {e}");
                AccountInfo::default()
            }
        }
    }

    async fn try_account_info(&self, eth_address: &str) -> Result<AccountInfo, BridgeError> {
        let native = self.resolve(eth_address).await?;
        let resource = self
            .ledger
            .account_resource(&native, &format!("{EVM_CONTRACT}::evm::Account"))
            .await?;

        let balance = resource.data["balance"]
            .as_str()
            .and_then(|s| U256::from_dec_str(s).ok())
            .unwrap_or_default();
        let nonce = resource.data["nonce"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let code = resource.data["code"].as_str().unwrap_or("0x").to_string();

        Ok(AccountInfo {
            balance,
            nonce,
            code,
        })
    }
}
