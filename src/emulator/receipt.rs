use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::codec::{self, DecodedTransaction};
use crate::config::{zero_bloom, EVM_CONTRACT, GAS_PRICE_SCALE, ZERO_HASH};
use crate::error::BridgeError;
use crate::ledger::{EntryFunctionPayload, LedgerApi, TransactionView};
use crate::store::Store;

/// Ethereum-shaped transaction view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTransaction {
    pub block_hash: String,
    pub block_number: String,
    pub from: String,
    pub gas: String,
    pub gas_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    pub hash: String,
    pub input: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub nonce: String,
    pub to: Option<String>,
    pub transaction_index: String,
    pub value: String,
    pub v: String,
    pub r: String,
    pub s: String,
}

/// Ethereum-shaped transaction receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmReceipt {
    pub block_hash: String,
    pub block_number: String,
    pub contract_address: Option<String>,
    pub cumulative_gas_used: String,
    pub effective_gas_price: String,
    pub from: String,
    pub gas_used: String,
    pub logs: Vec<EvmLog>,
    pub to: Option<String>,
    pub logs_bloom: String,
    pub status: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    #[serde(rename = "type")]
    pub tx_type: String,
}

/// One contract event in Ethereum log shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub block_hash: String,
    pub log_index: String,
    pub removed: bool,
}

/// Re-decode the originally submitted raw transaction out of a relayed
/// ledger transaction's payload.
pub fn decode_payload_transaction(
    payload: &EntryFunctionPayload,
) -> Result<DecodedTransaction, BridgeError> {
    let raw_hex = payload
        .arguments
        .get(1)
        .and_then(|v| v.as_str())
        .ok_or_else(|| BridgeError::malformed("relayed payload is missing raw transaction"))?;
    codec::decode_raw_transaction_hex(raw_hex)
}

fn relayed_payload(view: &TransactionView) -> Result<&EntryFunctionPayload, BridgeError> {
    view.payload
        .as_ref()
        .ok_or_else(|| BridgeError::NotFound("relayed transaction payload".to_string()))
}

/// Last 20 bytes of a native address, as an Ethereum address.
fn move_to_eth_address(address: &str) -> String {
    let stripped = address.to_lowercase();
    let stripped = stripped.strip_prefix("0x").unwrap_or(&stripped);
    let padded = format!("{stripped:0>40}");
    format!("0x{}", &padded[padded.len() - 40..])
}

/// Deployed-contract address: present only when the decoded recipient was
/// the zero address and the underlying execution succeeded.
fn deployed_contract(view: &TransactionView, decoded: &DecodedTransaction) -> Option<String> {
    if !view.success || !decoded.is_create() {
        return None;
    }
    let address = codec::derive_contract_address(&decoded.from, decoded.nonce);
    Some(format!("0x{}", hex::encode(address)))
}

/// Extract the contract event logs of one relayed transaction, in event
/// order, with log indexes 0..N-1.
pub fn extract_logs(
    view: &TransactionView,
    block_number: u64,
    block_hash: &str,
    evm_hash: &str,
) -> Vec<EvmLog> {
    let known_events: Vec<String> = (1..=4)
        .map(|i| format!("{EVM_CONTRACT}::evm::Log{i}Event"))
        .collect();

    let mut logs = Vec::new();
    for event in view.events.iter().flatten() {
        if !known_events.contains(&event.event_type) {
            continue;
        }
        let mut topics = Vec::new();
        for key in ["topic0", "topic1", "topic2", "topic3"] {
            if let Some(topic) = event.data[key].as_str() {
                topics.push(topic.to_string());
            }
        }
        logs.push(EvmLog {
            address: move_to_eth_address(event.data["contract"].as_str().unwrap_or_default()),
            topics,
            data: event.data["data"].as_str().unwrap_or("0x").to_string(),
            block_number: format!("0x{block_number:x}"),
            transaction_hash: evm_hash.to_string(),
            transaction_index: format!(
                "0x{:x}",
                event.sequence_number.parse::<u64>().unwrap_or_default()
            ),
            block_hash: block_hash.to_string(),
            log_index: format!("0x{:x}", logs.len()),
            removed: false,
        });
    }
    logs
}

/// Resolve a synthesized hash and build the Ethereum transaction view from
/// the underlying transaction and its containing block.
pub async fn transaction_by_hash(
    ledger: &Arc<dyn LedgerApi>,
    store: &Store,
    evm_hash: &str,
) -> Result<EvmTransaction, BridgeError> {
    let move_hash = store.move_hash_for(evm_hash).await?;
    let view = ledger.transaction_by_hash(&move_hash).await?;
    let block = ledger.block_by_version(view.version_u64()).await?;
    let decoded = decode_payload_transaction(relayed_payload(&view)?)?;

    let gas_price_native = view.gas_unit_price_u64() as u128 * GAS_PRICE_SCALE;
    let (max_fee, max_priority_fee) = if decoded.tx_type == 2 {
        let fee = format!("0x{:x}", decoded.gas_price);
        (Some(fee.clone()), Some(fee))
    } else {
        (None, None)
    };

    Ok(EvmTransaction {
        block_hash: ZERO_HASH.to_string(),
        block_number: format!("0x{:x}", block.height_u64()),
        from: decoded.from_hex(),
        gas: format!("0x{:x}", view.gas_used_u64()),
        gas_price: format!("0x{gas_price_native:x}"),
        max_fee_per_gas: max_fee,
        max_priority_fee_per_gas: max_priority_fee,
        hash: decoded.hash_hex(),
        input: decoded.input_hex(),
        tx_type: format!("0x{:x}", decoded.tx_type),
        nonce: format!("0x{:x}", decoded.nonce),
        to: Some(decoded.to_hex_or_zero()),
        transaction_index: "0x0".to_string(),
        value: format!("0x{:x}", decoded.value),
        v: format!("0x{:x}", decoded.v),
        r: format!("0x{}", hex::encode(decoded.r)),
        s: format!("0x{}", hex::encode(decoded.s)),
    })
}

/// Resolve a synthesized hash and build the receipt, reading event data live
/// from the underlying transaction.
pub async fn transaction_receipt(
    ledger: &Arc<dyn LedgerApi>,
    store: &Store,
    evm_hash: &str,
) -> Result<EvmReceipt, BridgeError> {
    let move_hash = store.move_hash_for(evm_hash).await?;
    let view = ledger.transaction_by_hash(&move_hash).await?;
    let block = ledger.block_by_version(view.version_u64()).await?;
    let decoded = decode_payload_transaction(relayed_payload(&view)?)?;

    let contract_address = deployed_contract(&view, &decoded);
    let logs = extract_logs(
        &view,
        block.height_u64(),
        &block.block_hash,
        &decoded.hash_hex(),
    );

    Ok(EvmReceipt {
        block_hash: block.block_hash.clone(),
        block_number: format!("0x{:x}", block.height_u64()),
        cumulative_gas_used: format!("0x{:x}", view.gas_used_u64()),
        effective_gas_price: format!(
            "0x{:x}",
            view.gas_unit_price_u64() as u128 * GAS_PRICE_SCALE
        ),
        from: decoded.from_hex(),
        gas_used: format!("0x{:x}", view.gas_used_u64()),
        logs,
        to: if contract_address.is_some() {
            None
        } else {
            Some(decoded.to_hex_or_zero())
        },
        contract_address,
        logs_bloom: zero_bloom(),
        status: if view.success { "0x1" } else { "0x0" }.to_string(),
        transaction_hash: decoded.hash_hex(),
        transaction_index: "0x0".to_string(),
        tx_type: format!("0x{:x}", decoded.tx_type),
    })
}
