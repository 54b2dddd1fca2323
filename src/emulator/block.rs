use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{zero_bloom, EVM_CONTRACT, ZERO_ADDRESS_HEX, ZERO_HASH};
use crate::error::BridgeError;
use crate::ledger::LedgerApi;

/// How long a fetched head height stays fresh.
const HEAD_CACHE_TTL: Duration = Duration::from_secs(2);

/// Ethereum-shaped block synthesized from ledger data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmBlock {
    pub base_fee_per_gas: String,
    pub difficulty: String,
    pub extra_data: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub hash: String,
    pub logs_bloom: String,
    pub miner: String,
    pub mix_hash: String,
    pub nonce: String,
    pub number: String,
    pub parent_hash: String,
    pub receipts_root: String,
    pub sha3_uncles: String,
    pub size: String,
    pub state_root: String,
    pub timestamp: String,
    pub total_difficulty: String,
    pub transactions: Vec<String>,
    pub transactions_root: String,
    pub uncles: Vec<String>,
}

/// Process-wide cache of the chain head height, refreshed at most every
/// two seconds.
pub struct HeadCache {
    inner: RwLock<Option<(Instant, u64)>>,
}

impl HeadCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// The current head height, from cache when fresh.
    pub async fn get(&self, ledger: &Arc<dyn LedgerApi>) -> Result<u64, BridgeError> {
        if let Some((fetched_at, height)) = *self.inner.read().expect("head cache lock") {
            if fetched_at.elapsed() < HEAD_CACHE_TTL {
                return Ok(height);
            }
        }
        let info = ledger.ledger_info().await?;
        let height = info.block_height_u64();
        *self.inner.write().expect("head cache lock") = Some((Instant::now(), height));
        Ok(height)
    }
}

impl Default for HeadCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an EVM block number parameter.
/// Handles "latest", "earliest", "pending", "safe", "finalized", and hex numbers.
pub fn parse_block_number(block_param: &str, latest: u64) -> u64 {
    match block_param {
        "latest" | "safe" | "finalized" | "pending" => latest,
        "earliest" => 0,
        hex_str => {
            let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
            u64::from_str_radix(stripped, 16).unwrap_or(latest)
        }
    }
}

/// Parse a strictly 0x-prefixed hex quantity; anything else is None.
pub fn parse_hex_quantity(value: Option<&str>) -> Option<u64> {
    let value = value?;
    let stripped = value.strip_prefix("0x")?;
    u64::from_str_radix(stripped, 16).ok()
}

/// N-th iterated keccak of the block's native hash. Gives the block's
/// required-but-meaningless fields deterministic, distinct values without
/// claiming any cryptographic meaning.
fn derived_field_hash(seed_hex: &str, rounds: u32) -> String {
    let mut hash = hex::decode(seed_hex.strip_prefix("0x").unwrap_or(seed_hex))
        .unwrap_or_else(|_| seed_hex.as_bytes().to_vec());
    for _ in 0..rounds {
        hash = Keccak256::digest(&hash).to_vec();
    }
    format!("0x{}", hex::encode(hash))
}

/// Synthesize the Ethereum-shaped block at `height`.
pub async fn block_by_number(
    ledger: &Arc<dyn LedgerApi>,
    height: u64,
) -> Result<EvmBlock, BridgeError> {
    let block = ledger.block_by_height(height, true).await?;

    let parent_hash = if height > 2 {
        let parent = ledger.block_by_height(height - 1, false).await?;
        parent.block_hash.clone()
    } else {
        ZERO_HASH.to_string()
    };

    // Only relayed Ethereum transactions surface in the block view; their
    // synthesized hashes come from re-decoding the submitted raw bytes.
    let send_tx_prefix = format!("{EVM_CONTRACT}::evm::send_tx");
    let mut transactions = Vec::new();
    for tx in block.transactions.iter().flatten() {
        if !tx.is_user_transaction() {
            continue;
        }
        let Some(payload) = &tx.payload else { continue };
        if !payload.function.starts_with(&send_tx_prefix) {
            continue;
        }
        match super::receipt::decode_payload_transaction(payload) {
            Ok(decoded) => transactions.push(decoded.hash_hex()),
            Err(e) => debug!("skipping undecodable relayed tx in block {height}: {e}"),
        }
    }

    let seed = &block.block_hash;
    Ok(EvmBlock {
        base_fee_per_gas: "0xc".to_string(),
        difficulty: "0x0".to_string(),
        extra_data: derived_field_hash(seed, 1),
        gas_limit: format!("0x{:x}", 30_000_000u64),
        gas_used: "0x0000000000000000".to_string(),
        hash: block.block_hash.clone(),
        logs_bloom: zero_bloom(),
        miner: ZERO_ADDRESS_HEX.to_string(),
        mix_hash: derived_field_hash(seed, 2),
        nonce: "0x0000000000000000".to_string(),
        number: format!("0x{height:x}"),
        parent_hash,
        receipts_root: derived_field_hash(seed, 3),
        sha3_uncles: derived_field_hash(seed, 4),
        size: format!("0x{:x}", 1_000_000u64),
        state_root: derived_field_hash(seed, 5),
        timestamp: format!("0x{:x}", block.timestamp_secs()),
        total_difficulty: "0x0000000000000000".to_string(),
        transactions,
        transactions_root: derived_field_hash(seed, 6),
        uncles: Vec::new(),
    })
}

/// Static fee-history snapshot reflecting typical recent activity.
pub async fn fee_history(
    ledger: &Arc<dyn LedgerApi>,
    head: &HeadCache,
) -> Result<Value, BridgeError> {
    let height = head.get(ledger).await?;
    let base_fee = format!("0x{:x}", 1_500_000_000_000u64);
    Ok(json!({
        "oldestBlock": format!("0x{:x}", height.saturating_sub(4)),
        "reward": [
            ["0x5f5e100", "0xd3cdba48"],
            ["0x5f5e100", "0xb146453a"],
            ["0xb8c63f00", "0xb8c63f00"],
            ["0x5f5e100", "0x77359400"],
        ],
        "baseFeePerGas": [base_fee.clone(), base_fee.clone(), base_fee.clone(), base_fee],
        "gasUsedRatio": [0.5329073333333333, 0.3723229, 0.9996228333333333, 0.5487537333333333],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_number_params() {
        assert_eq!(parse_block_number("latest", 1000), 1000);
        assert_eq!(parse_block_number("earliest", 1000), 0);
        assert_eq!(parse_block_number("0xa", 1000), 10);
        assert_eq!(parse_block_number("0xff", 1000), 255);
        assert_eq!(parse_block_number("garbage", 1000), 1000);
    }

    #[test]
    fn parses_hex_quantities_strictly() {
        assert_eq!(parse_hex_quantity(Some("0x10")), Some(16));
        assert_eq!(parse_hex_quantity(Some("16")), None);
        assert_eq!(parse_hex_quantity(Some("latest")), None);
        assert_eq!(parse_hex_quantity(None), None);
    }

    #[test]
    fn derived_fields_are_deterministic_and_distinct() {
        let seed = "0x75e8f1d9a5a7e2a5e7a75ee9a75f3b6a60e8f1d9a5a7e2a5e7a75ee9a75f3b6a";
        let fields: Vec<String> = (1..=6).map(|i| derived_field_hash(seed, i)).collect();
        let again: Vec<String> = (1..=6).map(|i| derived_field_hash(seed, i)).collect();

        assert_eq!(fields, again);
        for (i, a) in fields.iter().enumerate() {
            for b in fields.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
