use serde_json::Value;

use crate::config::Config;
use crate::error::BridgeError;

/// Handler for net_version. Reports the fixed chain id.
pub async fn version(config: &Config) -> Result<Value, BridgeError> {
    Ok(Value::String(config.chain_id_hex()))
}
