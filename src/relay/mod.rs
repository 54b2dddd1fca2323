pub mod lock;

pub use lock::{RelayGuard, RelayLock, MAX_HOLD_TIME, MAX_PENDING_RELAYS};

use ethereum_types::U256;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::{self, DecodedTransaction};
use crate::config::{EVM_CONTRACT, GAS_PRICE_SCALE, ZERO_ADDRESS_HEX};
use crate::error::BridgeError;
use crate::ledger::{
    EntryFunctionPayload, LedgerApi, LocalAccount, SimulationOutcome, SubmitOptions,
};
use crate::resolver::AddressResolver;
use crate::store::Store;

/// Nonce-convergence polling cadence and deadlines.
const NONCE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const NONCE_POLL_TIMEOUT: Duration = Duration::from_secs(10);
const NONCE_WAIT_DEADLINE: Duration = Duration::from_secs(30);

/// Gas unit price bounds after translating the Ethereum gas price into the
/// ledger's decimal precision. The relayer pays, so the ceiling matters.
const MIN_GAS_UNIT_PRICE: u64 = 100;
const MAX_GAS_UNIT_PRICE: u64 = 300;

/// Submission knobs for the relayed transaction.
const RELAY_MAX_GAS_AMOUNT: u64 = 2_000_000;
const RELAY_EXPIRATION_SECS: u64 = 10;

/// Gas estimate returned when estimation itself fails.
const ERROR_GAS: u64 = 1_000_000;
/// Minimum gas reported to Ethereum tooling.
const MIN_SHOW_GAS: u64 = 21_000;

/// Outcome of an `eth_estimateGas` simulation.
#[derive(Debug, Clone)]
pub struct GasEstimateOutcome {
    pub success: bool,
    pub gas_used: u64,
    pub show_gas: u64,
    pub error: String,
}

/// Relays externally-signed Ethereum transactions through the single shared
/// relayer identity, preserving per-sender nonce order.
pub struct Relayer {
    ledger: Arc<dyn LedgerApi>,
    resolver: Arc<AddressResolver>,
    store: Store,
    lock: RelayLock,
    relayer: LocalAccount,
    faucet: LocalAccount,
}

impl Relayer {
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        resolver: Arc<AddressResolver>,
        store: Store,
        relayer: LocalAccount,
        faucet: LocalAccount,
    ) -> Self {
        Self {
            ledger,
            resolver,
            store,
            lock: RelayLock::default(),
            relayer,
            faucet,
        }
    }

    pub fn lock(&self) -> &RelayLock {
        &self.lock
    }

    /// Validate, nonce-order, and relay a raw signed transaction. Returns the
    /// synthesized Ethereum transaction hash.
    pub async fn send_raw_transaction(&self, raw_tx_hex: &str) -> Result<String, BridgeError> {
        let decoded = codec::decode_raw_transaction_hex(raw_tx_hex)?;
        info!(
            "relaying tx {} from {} nonce {}",
            decoded.hash_hex(),
            decoded.from_hex(),
            decoded.nonce
        );

        self.lock.check_queue()?;

        // Clients may fire a batch of transactions at once with nonces out of
        // order; hold each one until the sender's on-chain nonce catches up.
        self.wait_for_nonce(&decoded).await?;

        let _guard = self.lock.acquire().await;
        match tokio::time::timeout(MAX_HOLD_TIME, self.relay(&decoded, raw_tx_hex)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::RelaySubmissionFailure(
                "relay lock hold time exceeded".to_string(),
            )),
        }
    }

    async fn wait_for_nonce(&self, decoded: &DecodedTransaction) -> Result<(), BridgeError> {
        let deadline = Instant::now() + NONCE_WAIT_DEADLINE;
        let sender = decoded.from_hex();
        loop {
            match tokio::time::timeout(NONCE_POLL_TIMEOUT, self.resolver.account_info(&sender))
                .await
            {
                Ok(info) if info.nonce == decoded.nonce => return Ok(()),
                Ok(info) => debug!(
                    "sender {sender} at nonce {}, waiting for {}",
                    info.nonce, decoded.nonce
                ),
                Err(_) => debug!("nonce poll for {sender} timed out, retrying"),
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::NonceOrderTimeout);
            }
            tokio::time::sleep(NONCE_POLL_INTERVAL).await;
        }
    }

    /// The serialized critical section: simulate for gas, compute the fee,
    /// submit, and persist the record and hash mapping before the lock is
    /// released.
    async fn relay(
        &self,
        decoded: &DecodedTransaction,
        raw_tx_hex: &str,
    ) -> Result<String, BridgeError> {
        let mut payload = send_tx_payload(decoded, raw_tx_hex, "0x01");

        let request = self
            .ledger
            .generate_transaction(self.relayer.address(), payload.clone(), SubmitOptions::default())
            .await
            .map_err(|e| BridgeError::SimulationRevert(e.to_string()))?;
        let simulation = self
            .ledger
            .simulate_transaction(&self.relayer, &request)
            .await
            .map_err(|e| BridgeError::SimulationRevert(e.to_string()))?;
        if !simulation.success {
            return Err(BridgeError::SimulationRevert(simulation.vm_status));
        }

        let gas_unit_price = clamp_gas_unit_price(decoded.gas_price);
        let fee = U256::from(gas_unit_price) * U256::from(simulation.gas_used);
        let fee_hex = codec::u256_to_hex_bytes(fee);
        info!("nonce {}, fee {}", decoded.nonce, fee_hex);
        payload.arguments[2] = json!(fee_hex);

        let request = self
            .ledger
            .generate_transaction(
                self.relayer.address(),
                payload,
                SubmitOptions {
                    max_gas_amount: Some(RELAY_MAX_GAS_AMOUNT),
                    gas_unit_price: Some(gas_unit_price),
                    expiration_secs: Some(RELAY_EXPIRATION_SECS),
                },
            )
            .await
            .map_err(relay_failure)?;
        let signed = self
            .ledger
            .sign_transaction(&self.relayer, request)
            .await
            .map_err(relay_failure)?;
        let pending = self
            .ledger
            .submit_transaction(&signed)
            .await
            .map_err(relay_failure)?;
        self.ledger
            .wait_for_transaction(&pending.hash)
            .await
            .map_err(relay_failure)?;

        let evm_hash = decoded.hash_hex();
        // Bookkeeping failures must not fail a transaction the chain has
        // already accepted.
        if let Err(e) = self
            .store
            .save_raw_transaction(raw_tx_hex, &evm_hash, &decoded.snapshot().to_string())
            .await
        {
            warn!("failed to persist raw transaction {evm_hash}: {e:#}");
        }
        if let Err(e) = self.store.save_hash_mapping(&pending.hash, &evm_hash).await {
            warn!(
                "failed to persist hash mapping {} -> {evm_hash}: {e:#}",
                pending.hash
            );
        }

        Ok(evm_hash)
    }

    /// Simulate `estimate_tx_gas` for an unsigned call description.
    pub async fn estimate_gas(
        &self,
        from: &str,
        to: Option<&str>,
        value: U256,
        data: &str,
    ) -> GasEstimateOutcome {
        let payload = EntryFunctionPayload::entry_function(
            format!("{EVM_CONTRACT}::evm::estimate_tx_gas"),
            vec![
                json!(from.to_lowercase()),
                json!(to.unwrap_or(ZERO_ADDRESS_HEX).to_lowercase()),
                json!(if data.is_empty() { "0x" } else { data }),
                json!(codec::u256_to_hex_bytes(value)),
                json!("1"),
            ],
        );

        match self.try_simulate(payload).await {
            Ok(simulation) if simulation.success => GasEstimateOutcome {
                success: true,
                gas_used: simulation.gas_used,
                show_gas: simulation.gas_used.max(MIN_SHOW_GAS),
                error: String::new(),
            },
            Ok(simulation) => GasEstimateOutcome {
                success: false,
                gas_used: ERROR_GAS,
                show_gas: ERROR_GAS,
                error: simulation.vm_status,
            },
            Err(e) => GasEstimateOutcome {
                success: false,
                gas_used: ERROR_GAS,
                show_gas: ERROR_GAS,
                error: e.to_string(),
            },
        }
    }

    async fn try_simulate(
        &self,
        payload: EntryFunctionPayload,
    ) -> anyhow::Result<SimulationOutcome> {
        let request = self
            .ledger
            .generate_transaction(self.relayer.address(), payload, SubmitOptions::default())
            .await?;
        self.ledger.simulate_transaction(&self.relayer, &request).await
    }

    /// Deposit one whole unit (10^18) to an Ethereum address via the faucet
    /// identity. Returns the native transaction hash.
    pub async fn faucet(&self, eth_address: &str) -> Result<String, BridgeError> {
        let amount = U256::exp10(18);
        let payload = EntryFunctionPayload::entry_function(
            format!("{EVM_CONTRACT}::evm::deposit"),
            vec![
                json!(eth_address.to_lowercase()),
                json!(codec::u256_to_hex_bytes(amount)),
            ],
        );

        let request = self
            .ledger
            .generate_transaction(self.faucet.address(), payload, SubmitOptions::default())
            .await
            .map_err(relay_failure)?;
        let signed = self
            .ledger
            .sign_transaction(&self.faucet, request)
            .await
            .map_err(relay_failure)?;
        let pending = self
            .ledger
            .submit_transaction(&signed)
            .await
            .map_err(relay_failure)?;
        self.ledger
            .wait_for_transaction(&pending.hash)
            .await
            .map_err(relay_failure)?;
        Ok(pending.hash)
    }
}

fn relay_failure(e: anyhow::Error) -> BridgeError {
    BridgeError::RelaySubmissionFailure(e.to_string())
}

fn send_tx_payload(
    decoded: &DecodedTransaction,
    raw_tx_hex: &str,
    fee_hex: &str,
) -> EntryFunctionPayload {
    let raw = if raw_tx_hex.starts_with("0x") {
        raw_tx_hex.to_string()
    } else {
        format!("0x{raw_tx_hex}")
    };
    EntryFunctionPayload::entry_function(
        format!("{EVM_CONTRACT}::evm::send_tx"),
        vec![
            json!(decoded.from_hex()),
            json!(raw),
            json!(fee_hex),
            json!("1"),
        ],
    )
}

/// Translate an Ethereum gas price (18 decimals) into the ledger's gas unit
/// price (8 decimals), clamped to the relayer's accepted band.
fn clamp_gas_unit_price(gas_price: U256) -> u64 {
    let scaled = gas_price / U256::from(GAS_PRICE_SCALE);
    if scaled > U256::from(MAX_GAS_UNIT_PRICE) {
        MAX_GAS_UNIT_PRICE
    } else if scaled < U256::from(MIN_GAS_UNIT_PRICE) {
        MIN_GAS_UNIT_PRICE
    } else {
        scaled.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_unit_price_is_rescaled_and_clamped() {
        // 1.5e12 wei -> 150 native units, inside the band
        assert_eq!(
            clamp_gas_unit_price(U256::from(1_500_000_000_000u64)),
            150
        );
        // 20 gwei -> 2, below the floor
        assert_eq!(clamp_gas_unit_price(U256::from(20_000_000_000u64)), 100);
        // 1e16 wei -> 1e6, above the ceiling
        assert_eq!(
            clamp_gas_unit_price(U256::from(10_000_000_000_000_000u64)),
            300
        );
    }
}
