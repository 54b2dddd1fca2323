use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ledger summary returned by the node root endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerInfo {
    #[serde(default)]
    pub chain_id: u64,
    pub block_height: String,
    #[serde(default)]
    pub ledger_version: String,
    #[serde(default)]
    pub ledger_timestamp: String,
}

impl LedgerInfo {
    pub fn block_height_u64(&self) -> u64 {
        self.block_height.parse().unwrap_or_default()
    }
}

/// A ledger block, optionally carrying its transactions.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockView {
    pub block_height: String,
    pub block_hash: String,
    /// Microseconds since the epoch
    pub block_timestamp: String,
    #[serde(default)]
    pub first_version: String,
    #[serde(default)]
    pub last_version: String,
    #[serde(default)]
    pub transactions: Option<Vec<TransactionView>>,
}

impl BlockView {
    pub fn height_u64(&self) -> u64 {
        self.block_height.parse().unwrap_or_default()
    }

    /// Block timestamp truncated to seconds.
    pub fn timestamp_secs(&self) -> u64 {
        self.block_timestamp.parse::<u64>().unwrap_or_default() / 1_000_000
    }
}

/// A committed or pending ledger transaction. Fields absent for the
/// transaction's kind deserialize to their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionView {
    #[serde(rename = "type", default)]
    pub tx_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub vm_status: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub gas_unit_price: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub payload: Option<EntryFunctionPayload>,
    #[serde(default)]
    pub events: Option<Vec<EventView>>,
}

impl TransactionView {
    pub fn is_pending(&self) -> bool {
        self.tx_type == "pending_transaction"
    }

    pub fn is_user_transaction(&self) -> bool {
        self.tx_type == "user_transaction"
    }

    pub fn version_u64(&self) -> u64 {
        self.version.parse().unwrap_or_default()
    }

    pub fn gas_used_u64(&self) -> u64 {
        self.gas_used.parse().unwrap_or_default()
    }

    pub fn gas_unit_price_u64(&self) -> u64 {
        self.gas_unit_price.parse().unwrap_or_default()
    }
}

/// Contract event emitted by a transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct EventView {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub sequence_number: String,
    #[serde(default)]
    pub data: Value,
}

/// Entry-function call payload, both as submitted and as read back from
/// committed transactions. Unknown payload kinds deserialize with empty
/// fields rather than failing the whole transaction view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFunctionPayload {
    #[serde(rename = "type", default)]
    pub payload_type: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub type_arguments: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl EntryFunctionPayload {
    pub fn entry_function(function: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            payload_type: "entry_function_payload".to_string(),
            function: function.into(),
            type_arguments: Vec::new(),
            arguments,
        }
    }
}

/// Read-only view function request.
#[derive(Debug, Clone, Serialize)]
pub struct ViewRequest {
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

/// An account resource read: `{ "type": ..., "data": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct MoveResource {
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Node gas-price oracle response.
#[derive(Debug, Clone, Deserialize)]
pub struct GasEstimate {
    pub gas_estimate: u64,
    #[serde(default)]
    pub prioritized_gas_estimate: Option<u64>,
    #[serde(default)]
    pub deprioritized_gas_estimate: Option<u64>,
}

impl GasEstimate {
    pub fn prioritized(&self) -> u64 {
        self.prioritized_gas_estimate.unwrap_or(self.gas_estimate)
    }
}

/// Unsigned transaction request, numeric fields string-encoded the way the
/// node's JSON API expects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTransactionRequest {
    pub sender: String,
    pub sequence_number: String,
    pub max_gas_amount: String,
    pub gas_unit_price: String,
    pub expiration_timestamp_secs: String,
    pub payload: EntryFunctionPayload,
}

/// ed25519 signature attachment for a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSignature {
    #[serde(rename = "type")]
    pub signature_type: String,
    pub public_key: String,
    pub signature: String,
}

impl TransactionSignature {
    pub fn ed25519(public_key: String, signature: String) -> Self {
        Self {
            signature_type: "ed25519_signature".to_string(),
            public_key,
            signature,
        }
    }
}

/// A fully signed transaction ready for submission.
#[derive(Debug, Clone, Serialize)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub request: UserTransactionRequest,
    pub signature: TransactionSignature,
}

/// Submission acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingTransaction {
    pub hash: String,
}

/// Outcome of simulating a transaction without submitting it.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub success: bool,
    pub gas_used: u64,
    pub vm_status: String,
}

/// Knobs for transaction generation. `None` fields fall back to the
/// client defaults.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub max_gas_amount: Option<u64>,
    pub gas_unit_price: Option<u64>,
    pub expiration_secs: Option<u64>,
}
