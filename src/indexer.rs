use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::emulator::receipt::{transaction_receipt, EvmLog};
use crate::error::BridgeError;
use crate::ledger::LedgerApi;
use crate::store::{NewLog, Store};

/// Delay between loop iterations.
const TICK_INTERVAL: Duration = Duration::from_millis(100);
/// Extra delay when there is nothing new to index.
const IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to the running indexer loop with an explicit stop hook.
pub struct IndexerTask {
    handle: JoinHandle<()>,
}

impl IndexerTask {
    pub fn stop(&self) {
        self.handle.abort();
    }
}

/// Background task that tails relayed transactions, extracts their contract
/// event logs, and persists them behind a durable cursor. At-least-once:
/// the cursor only advances after the logs are written, so a crash can
/// reprocess a transaction but never skip one.
pub struct EventIndexer {
    ledger: Arc<dyn LedgerApi>,
    store: Store,
}

impl EventIndexer {
    pub fn new(ledger: Arc<dyn LedgerApi>, store: Store) -> Self {
        Self { ledger, store }
    }

    /// Spawn the loop. Iteration failures are logged and retried on the next
    /// tick; the loop itself never exits until stopped.
    pub fn start(self) -> IndexerTask {
        let handle = tokio::spawn(async move {
            info!("event indexer started");
            // Durable cursor, loaded once and then tracked in memory.
            let mut cursor: i64 = -1;
            loop {
                if let Err(e) = self.tick(&mut cursor).await {
                    warn!("indexer iteration failed, will retry: {e}");
                }
                tokio::time::sleep(TICK_INTERVAL).await;
            }
        });
        IndexerTask { handle }
    }

    async fn tick(&self, cursor: &mut i64) -> Result<(), BridgeError> {
        if *cursor < 0 {
            match self.store.sync_cursor().await? {
                Some(value) => *cursor = value,
                None => {
                    self.store.init_sync_cursor().await?;
                    return Ok(());
                }
            }
        }

        let Some(record) = self.store.next_raw_transaction(*cursor).await? else {
            tokio::time::sleep(IDLE_INTERVAL).await;
            return Ok(());
        };

        let receipt = transaction_receipt(&self.ledger, &self.store, &record.hash).await?;
        if !receipt.logs.is_empty() {
            let rows: Vec<NewLog> = receipt.logs.iter().map(new_log_row).collect();
            self.store.insert_logs(&rows).await?;
            debug!(
                "indexed {} logs for tx {} (record {})",
                rows.len(),
                record.hash,
                record.id
            );
        }

        self.store.set_sync_cursor(record.id).await?;
        *cursor = record.id;
        Ok(())
    }
}

/// Denormalize a receipt log into its stored row: topics as a JSON array
/// plus four positional columns, absent positions padded with empty strings.
fn new_log_row(log: &EvmLog) -> NewLog {
    let block_number = log
        .block_number
        .strip_prefix("0x")
        .and_then(|s| i64::from_str_radix(s, 16).ok())
        .unwrap_or_default();
    let topic = |i: usize| log.topics.get(i).cloned().unwrap_or_default();

    NewLog {
        log_index: log.log_index.clone(),
        block_number,
        block_hash: log.block_hash.clone(),
        transaction_hash: log.transaction_hash.clone(),
        transaction_index: log.transaction_index.clone(),
        address: log.address.clone(),
        data: if log.data.is_empty() {
            "0x".to_string()
        } else {
            log.data.clone()
        },
        topics: serde_json::to_string(&log.topics).unwrap_or_else(|_| "[]".to_string()),
        topic0: topic(0),
        topic1: topic(1),
        topic2: topic(2),
        topic3: topic(3),
    }
}
