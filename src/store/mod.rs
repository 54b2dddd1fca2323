use anyhow::{Context, Result};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;

/// Cursor row key for the event indexer.
const SYNC_CURSOR_KEY: &str = "latest_synced_tx";

/// Hard cap on rows returned by a log query.
pub const LOG_QUERY_LIMIT: i64 = 10_000;

/// A relayed raw transaction. `hash` is the synthesized Ethereum hash;
/// `info` the decoded snapshot JSON. Ids are dense and strictly increasing,
/// which makes them the indexer's unit of progress.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawTxRecord {
    pub id: i64,
    pub tx: String,
    pub hash: String,
    pub info: String,
}

/// One indexed contract event, denormalized for range/topic queries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LogRow {
    pub log_index: String,
    pub block_number: i64,
    pub block_hash: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub address: String,
    pub data: String,
    pub topics: String,
    pub topic0: String,
    pub topic1: String,
    pub topic2: String,
    pub topic3: String,
}

impl LogRow {
    /// RPC-facing shape: topics as an array, hex block number, never removed.
    pub fn to_rpc_value(&self) -> Value {
        let topics: Value = serde_json::from_str(&self.topics).unwrap_or_else(|_| json!([]));
        json!({
            "address": self.address,
            "topics": topics,
            "data": self.data,
            "blockNumber": format!("0x{:x}", self.block_number),
            "transactionHash": self.transaction_hash,
            "transactionIndex": self.transaction_index,
            "blockHash": self.block_hash,
            "logIndex": self.log_index,
            "removed": false,
        })
    }
}

/// A log row about to be persisted by the indexer.
#[derive(Debug, Clone)]
pub struct NewLog {
    pub log_index: String,
    pub block_number: i64,
    pub block_hash: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub address: String,
    pub data: String,
    pub topics: String,
    pub topic0: String,
    pub topic1: String,
    pub topic2: String,
    pub topic3: String,
}

/// Log query filter: inclusive block range, optional address set, and up to
/// four positional topic sets (OR within a position, AND across positions).
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub from_block: i64,
    pub to_block: i64,
    pub addresses: Option<Vec<String>>,
    pub topics: [Option<Vec<String>>; 4],
}

/// SQLite-backed persistent store: raw transactions, hash mappings, indexed
/// logs, and the indexer cursor.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the database URL and apply the schema migration.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .context("invalid database URL")?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("failed to open database")?;

        sqlx::raw_sql(include_str!("../../migrations/001_initial.sql"))
            .execute(&pool)
            .await
            .context("failed to run migration")?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Raw transactions
    // ------------------------------------------------------------------

    pub async fn save_raw_transaction(&self, tx: &str, hash: &str, info: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO raw_transactions (tx, hash, info) VALUES (?, ?, ?)")
            .bind(tx)
            .bind(hash)
            .bind(info)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// The next record past the cursor, if any.
    pub async fn next_raw_transaction(&self, after_id: i64) -> Result<Option<RawTxRecord>> {
        let record = sqlx::query_as::<_, RawTxRecord>(
            "SELECT id, tx, hash, info FROM raw_transactions WHERE id > ? ORDER BY id ASC LIMIT 1",
        )
        .bind(after_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Hash mappings
    // ------------------------------------------------------------------

    pub async fn save_hash_mapping(&self, move_hash: &str, evm_hash: &str) -> Result<()> {
        sqlx::query("INSERT INTO hash_mappings (move_hash, evm_hash) VALUES (?, ?)")
            .bind(move_hash)
            .bind(evm_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resolve a synthesized hash to the native transaction identifier.
    /// The most recent mapping wins; an unmapped input is returned as-is
    /// (idempotent passthrough).
    pub async fn move_hash_for(&self, evm_hash: &str) -> Result<String> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT move_hash FROM hash_mappings WHERE evm_hash = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(evm_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(h,)| h).unwrap_or_else(|| evm_hash.to_string()))
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    /// Persist one transaction's logs atomically.
    pub async fn insert_logs(&self, logs: &[NewLog]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for log in logs {
            sqlx::query(
                "INSERT INTO tx_logs (log_index, block_number, block_hash, transaction_hash, \
                 transaction_index, address, data, topics, topic0, topic1, topic2, topic3) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&log.log_index)
            .bind(log.block_number)
            .bind(&log.block_hash)
            .bind(&log.transaction_hash)
            .bind(&log.transaction_index)
            .bind(&log.address)
            .bind(&log.data)
            .bind(&log.topics)
            .bind(&log.topic0)
            .bind(&log.topic1)
            .bind(&log.topic2)
            .bind(&log.topic3)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogRow>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT log_index, block_number, block_hash, transaction_hash, transaction_index, \
             address, data, topics, topic0, topic1, topic2, topic3 \
             FROM tx_logs WHERE block_number >= ",
        );
        builder.push_bind(query.from_block);
        builder.push(" AND block_number <= ");
        builder.push_bind(query.to_block);

        if let Some(addresses) = &query.addresses {
            builder.push(" AND address IN (");
            {
                let mut list = builder.separated(", ");
                for address in addresses {
                    list.push_bind(address.to_lowercase());
                }
            }
            builder.push(")");
        }

        for (position, topics) in query.topics.iter().enumerate() {
            if let Some(topics) = topics {
                builder.push(format!(" AND topic{position} IN ("));
                {
                    let mut list = builder.separated(", ");
                    for topic in topics {
                        list.push_bind(topic.clone());
                    }
                }
                builder.push(")");
            }
        }

        builder.push(" ORDER BY id ASC LIMIT ");
        builder.push_bind(LOG_QUERY_LIMIT);

        let rows = builder.build_query_as::<LogRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Sync cursor
    // ------------------------------------------------------------------

    pub async fn sync_cursor(&self) -> Result<Option<i64>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM sync_state WHERE key = ? LIMIT 1")
                .bind(SYNC_CURSOR_KEY)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((value,)) => Ok(Some(value.parse().context("corrupt sync cursor")?)),
            None => Ok(None),
        }
    }

    /// Bootstrap the cursor row at the beginning of history.
    pub async fn init_sync_cursor(&self) -> Result<()> {
        sqlx::query("INSERT INTO sync_state (key, value) VALUES (?, '0')")
            .bind(SYNC_CURSOR_KEY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Advance the cursor. Only ever called after the record's logs are
    /// durably written.
    pub async fn set_sync_cursor(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE sync_state SET value = ? WHERE key = ?")
            .bind(id.to_string())
            .bind(SYNC_CURSOR_KEY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    fn sample_log(block: i64, tx_hash: &str, index: u32, topic0: &str) -> NewLog {
        NewLog {
            log_index: format!("0x{index:x}"),
            block_number: block,
            block_hash: "0xbb".to_string(),
            transaction_hash: tx_hash.to_string(),
            transaction_index: "0x0".to_string(),
            address: "0x00000000000000000000000000000000000000aa".to_string(),
            data: "0x".to_string(),
            topics: format!("[\"{topic0}\"]"),
            topic0: topic0.to_string(),
            topic1: String::new(),
            topic2: String::new(),
            topic3: String::new(),
        }
    }

    #[tokio::test]
    async fn raw_transaction_ids_are_dense_and_increasing() {
        let store = test_store().await;
        let a = store.save_raw_transaction("0x01", "0xh1", "{}").await.unwrap();
        let b = store.save_raw_transaction("0x02", "0xh2", "{}").await.unwrap();
        let c = store.save_raw_transaction("0x03", "0xh3", "{}").await.unwrap();
        assert_eq!((a + 1, b + 1), (b, c));

        let next = store.next_raw_transaction(a).await.unwrap().unwrap();
        assert_eq!(next.id, b);
        assert_eq!(next.hash, "0xh2");
        assert!(store.next_raw_transaction(c).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hash_mapping_latest_wins_with_passthrough() {
        let store = test_store().await;
        assert_eq!(store.move_hash_for("0xabc").await.unwrap(), "0xabc");

        store.save_hash_mapping("0xmove1", "0xabc").await.unwrap();
        store.save_hash_mapping("0xmove2", "0xabc").await.unwrap();
        assert_eq!(store.move_hash_for("0xabc").await.unwrap(), "0xmove2");
    }

    #[tokio::test]
    async fn cursor_bootstraps_and_advances() {
        let store = test_store().await;
        assert_eq!(store.sync_cursor().await.unwrap(), None);

        store.init_sync_cursor().await.unwrap();
        assert_eq!(store.sync_cursor().await.unwrap(), Some(0));

        store.set_sync_cursor(7).await.unwrap();
        assert_eq!(store.sync_cursor().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn log_queries_filter_by_range_address_and_topic() {
        let store = test_store().await;
        let t0 = "0x00000000000000000000000000000000000000000000000000000000000000t0";
        store
            .insert_logs(&[
                sample_log(5, "0xt1", 0, t0),
                sample_log(6, "0xt2", 0, t0),
                sample_log(9, "0xt3", 0, "0xother"),
                sample_log(20, "0xt4", 0, t0),
            ])
            .await
            .unwrap();

        let query = LogQuery {
            from_block: 5,
            to_block: 10,
            addresses: None,
            topics: [Some(vec![t0.to_string()]), None, None, None],
        };
        let rows = store.query_logs(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| (5..=10).contains(&r.block_number)));
        assert!(rows.iter().all(|r| r.topic0 == t0));

        // Address filter excludes everything when no address matches
        let query = LogQuery {
            from_block: 0,
            to_block: 100,
            addresses: Some(vec!["0xdoesnotexist".to_string()]),
            topics: [None, None, None, None],
        };
        assert!(store.query_logs(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn log_rpc_shape_reports_removed_false() {
        let store = test_store().await;
        store
            .insert_logs(&[sample_log(3, "0xt1", 0, "0xt0")])
            .await
            .unwrap();
        let rows = store
            .query_logs(&LogQuery {
                from_block: 0,
                to_block: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        let value = rows[0].to_rpc_value();
        assert_eq!(value["removed"], serde_json::json!(false));
        assert_eq!(value["blockNumber"], serde_json::json!("0x3"));
        assert_eq!(value["topics"][0], serde_json::json!("0xt0"));
    }
}
