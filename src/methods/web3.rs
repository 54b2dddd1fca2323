use serde_json::Value;

use crate::error::BridgeError;

/// Client version string expected by EVM tooling that sniffs for Geth.
const CLIENT_VERSION: &str = "Geth/v1.11.6-omnibus-f83e1598/linux-.mdx64/go1.20.3";

/// Handler for web3_clientVersion
pub async fn client_version() -> Result<Value, BridgeError> {
    Ok(Value::String(CLIENT_VERSION.to_string()))
}
