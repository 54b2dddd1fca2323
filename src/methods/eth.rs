use ethereum_types::U256;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{Config, EVM_CONTRACT, ZERO_ADDRESS_HEX, GAS_PRICE_SCALE};
use crate::emulator::block::{self, parse_block_number, parse_hex_quantity, HeadCache};
use crate::emulator::receipt;
use crate::error::BridgeError;
use crate::ledger::{LedgerApi, ViewRequest};
use crate::relay::Relayer;
use crate::resolver::AddressResolver;
use crate::store::{LogQuery, Store};

fn require_str<'a>(params: &'a [Value], index: usize, name: &str) -> Result<&'a str, BridgeError> {
    params
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| BridgeError::NotFound(format!("{name} parameter")))
}

/// Handler for eth_chainId
pub async fn chain_id(config: &Config) -> Result<Value, BridgeError> {
    Ok(Value::String(config.chain_id_hex()))
}

/// Handler for eth_blockNumber. Served from the 2-second head cache.
pub async fn block_number(
    ledger: &Arc<dyn LedgerApi>,
    head: &HeadCache,
) -> Result<Value, BridgeError> {
    let height = head.get(ledger).await?;
    Ok(Value::String(format!("0x{height:x}")))
}

/// Handler for eth_gasPrice. The ledger's prioritized estimate rescaled to
/// Ethereum decimals.
pub async fn gas_price(ledger: &Arc<dyn LedgerApi>) -> Result<Value, BridgeError> {
    let estimate = ledger.estimate_gas_price().await?;
    let price = estimate.prioritized() as u128 * GAS_PRICE_SCALE;
    Ok(Value::String(format!("0x{price:x}")))
}

/// Handler for eth_feeHistory
pub async fn fee_history(
    ledger: &Arc<dyn LedgerApi>,
    head: &HeadCache,
) -> Result<Value, BridgeError> {
    block::fee_history(ledger, head).await
}

/// Handler for eth_getBalance
pub async fn get_balance(
    resolver: &AddressResolver,
    params: &[Value],
) -> Result<Value, BridgeError> {
    let address = require_str(params, 0, "address")?;
    let info = resolver.account_info(address).await;
    Ok(Value::String(info.balance_hex()))
}

/// Handler for eth_getTransactionCount (nonce)
pub async fn get_transaction_count(
    resolver: &AddressResolver,
    params: &[Value],
) -> Result<Value, BridgeError> {
    let address = require_str(params, 0, "address")?;
    let info = resolver.account_info(address).await;
    Ok(Value::String(info.nonce_hex()))
}

/// Handler for eth_getCode
pub async fn get_code(
    resolver: &AddressResolver,
    params: &[Value],
) -> Result<Value, BridgeError> {
    let address = require_str(params, 0, "address")?;
    let info = resolver.account_info(address).await;
    Ok(Value::String(info.code_hex()))
}

/// Handler for eth_getStorageAt
pub async fn get_storage_at(
    ledger: &Arc<dyn LedgerApi>,
    params: &[Value],
) -> Result<Value, BridgeError> {
    let address = require_str(params, 0, "address")?;
    let position = params.get(1).and_then(|v| v.as_str()).unwrap_or("0x0");

    let request = ViewRequest {
        function: format!("{EVM_CONTRACT}::evm::get_storage_at"),
        type_arguments: Vec::new(),
        arguments: vec![json!(address.to_lowercase()), json!(position)],
    };
    match ledger.view(&request).await {
        Ok(result) => Ok(result.into_iter().next().unwrap_or(json!("0x"))),
        Err(e) => {
            warn!("eth_getStorageAt failed: {e}");
            Ok(Value::String("0x".to_string()))
        }
    }
}

/// Handler for eth_call. Delegates to the read-only `query` view function;
/// never touches the submission pipeline.
pub async fn call(ledger: &Arc<dyn LedgerApi>, params: &[Value]) -> Result<Value, BridgeError> {
    let call_obj = params
        .first()
        .ok_or_else(|| BridgeError::NotFound("call object parameter".to_string()))?;

    // Calls carrying an explicit gas price get an empty object back.
    if !call_obj["gasPrice"].is_null() {
        return Ok(json!({}));
    }

    let to = call_obj["to"]
        .as_str()
        .ok_or_else(|| BridgeError::NotFound("call 'to' field".to_string()))?;
    let from = call_obj["from"].as_str().unwrap_or(ZERO_ADDRESS_HEX);
    let data = call_obj["data"]
        .as_str()
        .or_else(|| call_obj["input"].as_str())
        .unwrap_or("0x");

    let request = ViewRequest {
        function: format!("{EVM_CONTRACT}::evm::query"),
        type_arguments: Vec::new(),
        arguments: vec![
            json!(from.to_lowercase()),
            json!(to.to_lowercase()),
            json!(data),
        ],
    };
    match ledger.view(&request).await {
        Ok(result) => Ok(result.into_iter().next().unwrap_or(json!("0x"))),
        Err(e) => {
            debug!("eth_call reverted: {e}");
            Err(BridgeError::SimulationRevert("execution reverted".to_string()))
        }
    }
}

/// Handler for eth_estimateGas
pub async fn estimate_gas(relayer: &Relayer, params: &[Value]) -> Result<Value, BridgeError> {
    let default_obj = json!({});
    let call_obj = params.first().unwrap_or(&default_obj);

    let from = call_obj["from"].as_str().unwrap_or(ZERO_ADDRESS_HEX);
    let to = call_obj["to"].as_str();
    let data = call_obj["data"]
        .as_str()
        .or_else(|| call_obj["input"].as_str())
        .unwrap_or("0x");
    let value = call_obj["value"]
        .as_str()
        .and_then(|s| U256::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).ok())
        .unwrap_or_default();

    let outcome = relayer.estimate_gas(from, to, value, data).await;
    if !outcome.success {
        return Err(BridgeError::SimulationRevert(outcome.error));
    }
    Ok(Value::String(format!("0x{:x}", outcome.show_gas)))
}

/// Handler for eth_sendRawTransaction
pub async fn send_raw_transaction(
    relayer: &Relayer,
    params: &[Value],
) -> Result<Value, BridgeError> {
    let raw_tx = require_str(params, 0, "raw transaction")?;
    let hash = relayer.send_raw_transaction(raw_tx).await?;
    Ok(Value::String(hash))
}

/// Handler for eth_getTransactionByHash
pub async fn get_transaction_by_hash(
    ledger: &Arc<dyn LedgerApi>,
    store: &Store,
    params: &[Value],
) -> Result<Value, BridgeError> {
    let hash = require_str(params, 0, "transaction hash")?;
    let tx = receipt::transaction_by_hash(ledger, store, hash).await?;
    Ok(serde_json::to_value(&tx).map_err(anyhow::Error::from)?)
}

/// Handler for eth_getTransactionReceipt
pub async fn get_transaction_receipt(
    ledger: &Arc<dyn LedgerApi>,
    store: &Store,
    params: &[Value],
) -> Result<Value, BridgeError> {
    let hash = require_str(params, 0, "transaction hash")?;
    let receipt = receipt::transaction_receipt(ledger, store, hash).await?;
    Ok(serde_json::to_value(&receipt).map_err(anyhow::Error::from)?)
}

/// Handler for eth_getBlockByNumber
pub async fn get_block_by_number(
    ledger: &Arc<dyn LedgerApi>,
    params: &[Value],
) -> Result<Value, BridgeError> {
    let block_param = params.first().and_then(|v| v.as_str()).unwrap_or("latest");

    let info = ledger.ledger_info().await?;
    let height = parse_block_number(block_param, info.block_height_u64());

    let block = block::block_by_number(ledger, height).await?;
    Ok(serde_json::to_value(&block).map_err(anyhow::Error::from)?)
}

/// Handler for eth_getBlockByHash. Derived block hashes cannot be reversed;
/// answered with an empty object.
pub async fn get_block_by_hash(_params: &[Value]) -> Result<Value, BridgeError> {
    Ok(json!({}))
}

/// Handler for eth_getLogs. Serves filtered queries from the log index.
pub async fn get_logs(
    ledger: &Arc<dyn LedgerApi>,
    head: &HeadCache,
    store: &Store,
    params: &[Value],
) -> Result<Value, BridgeError> {
    let default_filter = json!({});
    let filter = params.first().unwrap_or(&default_filter);

    let current = head.get(ledger).await?;
    let from_block =
        parse_hex_quantity(filter["fromBlock"].as_str()).unwrap_or(current) as i64;
    let to_block = parse_hex_quantity(filter["toBlock"].as_str()).unwrap_or(current) as i64;

    let addresses = match &filter["address"] {
        Value::String(address) => Some(vec![address.clone()]),
        Value::Array(list) => Some(
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    };

    let mut topics: [Option<Vec<String>>; 4] = [None, None, None, None];
    if let Value::Array(list) = &filter["topics"] {
        for (position, entry) in list.iter().take(4).enumerate() {
            topics[position] = match entry {
                Value::String(topic) => Some(vec![topic.clone()]),
                Value::Array(options) => Some(
                    options
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                ),
                _ => None,
            };
        }
    }

    let query = LogQuery {
        from_block,
        to_block,
        addresses,
        topics,
    };
    let rows = store.query_logs(&query).await?;
    Ok(Value::Array(rows.iter().map(|r| r.to_rpc_value()).collect()))
}

/// Handler for the non-standard eth_faucet
pub async fn faucet(relayer: &Relayer, params: &[Value]) -> Result<Value, BridgeError> {
    let address = require_str(params, 0, "address")?;
    let hash = relayer.faucet(address).await?;
    Ok(Value::String(hash))
}

/// Handler for mvm_getMoveHash: raw lookup of the underlying-chain
/// identifier behind a synthesized hash.
pub async fn move_hash(store: &Store, params: &[Value]) -> Result<Value, BridgeError> {
    let hash = require_str(params, 0, "transaction hash")?.to_lowercase();
    let move_hash = store.move_hash_for(&hash).await?;
    Ok(Value::String(move_hash))
}
