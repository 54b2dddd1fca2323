use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::account::LocalAccount;
use super::types::*;

/// Capability interface over the underlying Move ledger. The bridge consumes
/// this everywhere as `Arc<dyn LedgerApi>`; tests substitute their own
/// implementation.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    async fn ledger_info(&self) -> Result<LedgerInfo>;
    async fn block_by_height(&self, height: u64, with_transactions: bool) -> Result<BlockView>;
    async fn block_by_version(&self, version: u64) -> Result<BlockView>;
    async fn transaction_by_hash(&self, hash: &str) -> Result<TransactionView>;
    async fn transaction_by_version(&self, version: u64) -> Result<TransactionView>;
    async fn view(&self, request: &ViewRequest) -> Result<Vec<Value>>;
    async fn account_resource(&self, address: &str, resource_type: &str) -> Result<MoveResource>;
    async fn estimate_gas_price(&self) -> Result<GasEstimate>;
    async fn generate_transaction(
        &self,
        sender: &str,
        payload: EntryFunctionPayload,
        options: SubmitOptions,
    ) -> Result<UserTransactionRequest>;
    async fn sign_transaction(
        &self,
        signer: &LocalAccount,
        request: UserTransactionRequest,
    ) -> Result<SignedTransaction>;
    async fn submit_transaction(&self, signed: &SignedTransaction) -> Result<PendingTransaction>;
    async fn simulate_transaction(
        &self,
        signer: &LocalAccount,
        request: &UserTransactionRequest,
    ) -> Result<SimulationOutcome>;
    async fn wait_for_transaction(&self, hash: &str) -> Result<()>;
}

/// Default gas ceiling for generated transactions.
const DEFAULT_MAX_GAS_AMOUNT: u64 = 2_000_000;
/// Default gas unit price for generated transactions.
const DEFAULT_GAS_UNIT_PRICE: u64 = 100;
/// Default expiration window in seconds.
const DEFAULT_EXPIRATION_SECS: u64 = 10;

/// How long to poll for a submitted transaction before giving up.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const WAIT_MAX_ATTEMPTS: u32 = 60;

#[derive(Debug, Deserialize)]
struct AccountData {
    sequence_number: String,
}

/// REST client for the Move node's `/v1` API.
#[derive(Clone)]
pub struct MoveRestClient {
    http: Client,
    base_url: String,
}

impl MoveRestClient {
    pub fn new(node_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: node_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("failed to reach the node")?;
        Self::decode_response(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &impl serde::Serialize,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .query(query)
            .json(body)
            .send()
            .await
            .context("failed to reach the node")?;
        Self::decode_response(response).await
    }

    async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("node returned HTTP {status}: {body}"));
        }
        response.json().await.context("failed to parse node response")
    }

    async fn account_sequence_number(&self, address: &str) -> Result<u64> {
        let account: AccountData = self.get_json(&format!("/accounts/{address}")).await?;
        account
            .sequence_number
            .parse()
            .context("invalid sequence number from node")
    }
}

#[async_trait]
impl LedgerApi for MoveRestClient {
    async fn ledger_info(&self) -> Result<LedgerInfo> {
        self.get_json("").await
    }

    async fn block_by_height(&self, height: u64, with_transactions: bool) -> Result<BlockView> {
        self.get_json(&format!(
            "/blocks/by_height/{height}?with_transactions={with_transactions}"
        ))
        .await
    }

    async fn block_by_version(&self, version: u64) -> Result<BlockView> {
        self.get_json(&format!("/blocks/by_version/{version}")).await
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<TransactionView> {
        self.get_json(&format!("/transactions/by_hash/{hash}")).await
    }

    async fn transaction_by_version(&self, version: u64) -> Result<TransactionView> {
        self.get_json(&format!("/transactions/by_version/{version}")).await
    }

    async fn view(&self, request: &ViewRequest) -> Result<Vec<Value>> {
        self.post_json("/view", &[], request).await
    }

    async fn account_resource(&self, address: &str, resource_type: &str) -> Result<MoveResource> {
        self.get_json(&format!("/accounts/{address}/resource/{resource_type}"))
            .await
    }

    async fn estimate_gas_price(&self) -> Result<GasEstimate> {
        self.get_json("/estimate_gas_price").await
    }

    async fn generate_transaction(
        &self,
        sender: &str,
        payload: EntryFunctionPayload,
        options: SubmitOptions,
    ) -> Result<UserTransactionRequest> {
        let sequence_number = self.account_sequence_number(sender).await?;
        let expiration = chrono::Utc::now().timestamp() as u64
            + options.expiration_secs.unwrap_or(DEFAULT_EXPIRATION_SECS);

        Ok(UserTransactionRequest {
            sender: sender.to_string(),
            sequence_number: sequence_number.to_string(),
            max_gas_amount: options
                .max_gas_amount
                .unwrap_or(DEFAULT_MAX_GAS_AMOUNT)
                .to_string(),
            gas_unit_price: options
                .gas_unit_price
                .unwrap_or(DEFAULT_GAS_UNIT_PRICE)
                .to_string(),
            expiration_timestamp_secs: expiration.to_string(),
            payload,
        })
    }

    async fn sign_transaction(
        &self,
        signer: &LocalAccount,
        request: UserTransactionRequest,
    ) -> Result<SignedTransaction> {
        // The node computes the BCS signing message for us; we only hold the key.
        let signing_message: String = self
            .post_json("/transactions/encode_submission", &[], &request)
            .await?;
        let message = hex::decode(signing_message.strip_prefix("0x").unwrap_or(&signing_message))
            .context("invalid signing message from node")?;
        let signature = signer.sign(&message);

        Ok(SignedTransaction {
            request,
            signature: TransactionSignature::ed25519(
                signer.public_key_hex(),
                format!("0x{}", hex::encode(signature)),
            ),
        })
    }

    async fn submit_transaction(&self, signed: &SignedTransaction) -> Result<PendingTransaction> {
        let pending: PendingTransaction = self.post_json("/transactions", &[], signed).await?;
        debug!("submitted transaction {}", pending.hash);
        Ok(pending)
    }

    async fn simulate_transaction(
        &self,
        signer: &LocalAccount,
        request: &UserTransactionRequest,
    ) -> Result<SimulationOutcome> {
        // Simulation takes the unsigned request with a zeroed signature.
        let body = SignedTransaction {
            request: request.clone(),
            signature: TransactionSignature::ed25519(
                signer.public_key_hex(),
                format!("0x{}", "00".repeat(64)),
            ),
        };
        let results: Vec<TransactionView> = self
            .post_json(
                "/transactions/simulate",
                &[("estimate_prioritized_gas_unit_price", "true")],
                &body,
            )
            .await?;
        let first = results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("empty simulation response"))?;

        Ok(SimulationOutcome {
            success: first.success,
            gas_used: first.gas_used_u64(),
            vm_status: first.vm_status,
        })
    }

    async fn wait_for_transaction(&self, hash: &str) -> Result<()> {
        for _ in 0..WAIT_MAX_ATTEMPTS {
            match self.transaction_by_hash(hash).await {
                Ok(view) if !view.is_pending() => return Ok(()),
                Ok(_) => {}
                // The node answers 404 until the transaction reaches a node
                // that knows about it.
                Err(e) => debug!("transaction {hash} not yet visible: {e}"),
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
        Err(anyhow!(
            "transaction {hash} not committed after {WAIT_MAX_ATTEMPTS} attempts"
        ))
    }
}
