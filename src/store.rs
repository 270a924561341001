//! Transaction Store and Checkpoint Store (§3, §4.4-6, §6).
//!
//! A single relational table holds the extracted events; a second,
//! single-row-per-chain table holds the checkpoint. Both live behind one
//! connection pool so the persist-and-confirm step (§4.4 step 6) and the
//! reorg rollback (§4.4 step 3) can run inside one database transaction.
//!
//! Schema bootstrap is plain `CREATE TABLE IF NOT EXISTS` rather than a
//! migration runner: schema migration tooling is explicitly out of scope
//! (§1), and a crawler that owns its own bootstrap DDL needs nothing else to
//! start against a fresh database.

use crate::error::Result;
use crate::events::ParsedEvent;
use crate::config::ChainConfig;
use crate::types::{Operation, Status};
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

#[derive(Clone)]
enum DatabasePool {
    Sqlite(sqlx::SqlitePool),
    Postgres(sqlx::PgPool),
}

/// A persisted projection of one `Deposit`/`Withdraw` event (§3 "Transaction row").
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    pub id: i64,
    pub transaction_hash: String,
    pub chain_id: String,
    pub address: String,
    pub operation: Operation,
    pub raw_amount: String,
    pub amount: String,
    pub token_decimals: u8,
    pub token_address: Option<String>,
    pub contract_address: String,
    pub block_number: u64,
    pub block_hash: String,
    pub block_time_ms: i64,
    pub confirmations: u64,
    pub require_confirmations: u64,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields needed to insert a new row, before the store assigns `id`,
/// `created_at`, and `updated_at`.
#[derive(Debug, Clone)]
pub struct NewTransactionRow {
    pub transaction_hash: String,
    pub chain_id: String,
    pub address: String,
    pub operation: Operation,
    pub raw_amount: String,
    pub amount: String,
    pub token_decimals: u8,
    pub token_address: Option<String>,
    pub contract_address: String,
    pub block_number: u64,
    pub block_hash: String,
    pub block_time_ms: i64,
    pub confirmations: u64,
    pub require_confirmations: u64,
}

impl NewTransactionRow {
    /// Build a row from a parsed log plus the block metadata and confirmation
    /// count the crawler (or the fallback verifier) computed for it (§4.4
    /// step 6a). `confirmations` is `head - blockNumber + 1`, never negative.
    pub fn from_parsed_event(
        event: &ParsedEvent,
        chain: &ChainConfig,
        head: u64,
        block_hash: &str,
        block_time_ms: i64,
    ) -> Self {
        let confirmations = (head + 1).saturating_sub(event.block_number);

        Self {
            transaction_hash: event.transaction_hash.clone(),
            chain_id: chain.chain_id.clone(),
            address: event.address.as_str().to_string(),
            operation: event.operation,
            raw_amount: event.raw_amount.clone(),
            amount: event.amount.clone(),
            token_decimals: event.decimals,
            token_address: event.token_address.as_ref().map(|a| a.as_str().to_string()),
            contract_address: event.contract_address.as_str().to_string(),
            block_number: event.block_number,
            block_hash: block_hash.to_string(),
            block_time_ms,
            confirmations: confirmations.min(chain.required_confirmations),
            require_confirmations: chain.required_confirmations,
        }
    }

    fn status(&self) -> Status {
        Status::from_confirmations(self.confirmations, self.require_confirmations)
    }
}

#[derive(Clone)]
pub struct Store {
    pool: DatabasePool,
}

impl Store {
    /// Connect and bootstrap the schema. Accepts a SQLite file path (or
    /// `sqlite://...`) or a `postgres://`/`postgresql://` URL.
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let url = database_url.as_ref().to_string_lossy().to_string();

        let pool = if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            tracing::info!("connecting to PostgreSQL database");
            DatabasePool::Postgres(sqlx::PgPool::connect(&url).await?)
        } else {
            let sqlite_url = if url.starts_with("sqlite://") {
                url.clone()
            } else {
                if let Some(parent) = database_url.as_ref().parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                format!("sqlite:{url}")
            };

            use sqlx::sqlite::SqliteConnectOptions;
            let options = SqliteConnectOptions::from_str(&sqlite_url)?.create_if_missing(true);
            tracing::info!("connecting to SQLite database: {}", url);
            DatabasePool::Sqlite(sqlx::SqlitePool::connect_with(options).await?)
        };

        let store = Self { pool };
        store.bootstrap_schema().await?;
        Ok(store)
    }

    async fn bootstrap_schema(&self) -> Result<()> {
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS transactions (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        transaction_hash TEXT NOT NULL UNIQUE,
                        chain_id TEXT NOT NULL,
                        address TEXT NOT NULL,
                        operation TEXT NOT NULL,
                        raw_amount TEXT NOT NULL,
                        amount TEXT NOT NULL,
                        token_decimals INTEGER NOT NULL,
                        token_address TEXT,
                        contract_address TEXT NOT NULL,
                        block_number INTEGER NOT NULL,
                        block_hash TEXT NOT NULL,
                        block_time INTEGER NOT NULL,
                        confirmations INTEGER NOT NULL,
                        require_confirmations INTEGER NOT NULL,
                        status TEXT NOT NULL,
                        created_at INTEGER NOT NULL,
                        updated_at INTEGER NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await?;

                for stmt in [
                    "CREATE INDEX IF NOT EXISTS idx_tx_address ON transactions(address)",
                    "CREATE INDEX IF NOT EXISTS idx_tx_operation ON transactions(operation)",
                    "CREATE INDEX IF NOT EXISTS idx_tx_token_address ON transactions(token_address)",
                    "CREATE INDEX IF NOT EXISTS idx_tx_contract_address ON transactions(contract_address)",
                    "CREATE INDEX IF NOT EXISTS idx_tx_chain_block ON transactions(chain_id, block_number DESC)",
                ] {
                    sqlx::query(stmt).execute(pool).await?;
                }

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS checkpoints (
                        chain_id TEXT PRIMARY KEY,
                        last_processed_block INTEGER NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await?;
            }
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS transactions (
                        id BIGSERIAL PRIMARY KEY,
                        transaction_hash TEXT NOT NULL UNIQUE,
                        chain_id TEXT NOT NULL,
                        address TEXT NOT NULL,
                        operation TEXT NOT NULL,
                        raw_amount TEXT NOT NULL,
                        amount TEXT NOT NULL,
                        token_decimals INTEGER NOT NULL,
                        token_address TEXT,
                        contract_address TEXT NOT NULL,
                        block_number BIGINT NOT NULL,
                        block_hash TEXT NOT NULL,
                        block_time BIGINT NOT NULL,
                        confirmations BIGINT NOT NULL,
                        require_confirmations BIGINT NOT NULL,
                        status TEXT NOT NULL,
                        created_at BIGINT NOT NULL,
                        updated_at BIGINT NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await?;

                for stmt in [
                    "CREATE INDEX IF NOT EXISTS idx_tx_address ON transactions(address)",
                    "CREATE INDEX IF NOT EXISTS idx_tx_operation ON transactions(operation)",
                    "CREATE INDEX IF NOT EXISTS idx_tx_token_address ON transactions(token_address)",
                    "CREATE INDEX IF NOT EXISTS idx_tx_contract_address ON transactions(contract_address)",
                    "CREATE INDEX IF NOT EXISTS idx_tx_chain_block ON transactions(chain_id, block_number DESC)",
                ] {
                    sqlx::query(stmt).execute(pool).await?;
                }

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS checkpoints (
                        chain_id TEXT PRIMARY KEY,
                        last_processed_block BIGINT NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await?;
            }
        }

        Ok(())
    }

    /// §4.4 step 6: insert new rows (idempotently) and recompute
    /// confirmations for every still-pending row of this chain, atomically.
    /// Returns the number of rows inserted.
    pub async fn persist_batch(
        &self,
        chain_id: &str,
        new_rows: &[NewTransactionRow],
        head: u64,
    ) -> Result<usize> {
        let now = Utc::now();
        let mut inserted = 0usize;

        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;

                for row in new_rows {
                    let result = sqlx::query(
                        r#"
                        INSERT INTO transactions
                        (transaction_hash, chain_id, address, operation, raw_amount, amount,
                         token_decimals, token_address, contract_address, block_number, block_hash,
                         block_time, confirmations, require_confirmations, status, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        ON CONFLICT(transaction_hash) DO NOTHING
                        "#,
                    )
                    .bind(&row.transaction_hash)
                    .bind(&row.chain_id)
                    .bind(&row.address)
                    .bind(row.operation.as_str())
                    .bind(&row.raw_amount)
                    .bind(&row.amount)
                    .bind(row.token_decimals as i64)
                    .bind(&row.token_address)
                    .bind(&row.contract_address)
                    .bind(row.block_number as i64)
                    .bind(&row.block_hash)
                    .bind(row.block_time_ms)
                    .bind(row.confirmations as i64)
                    .bind(row.require_confirmations as i64)
                    .bind(row.status().as_str())
                    .bind(now.timestamp_millis())
                    .bind(now.timestamp_millis())
                    .execute(&mut *tx)
                    .await?;

                    inserted += result.rows_affected() as usize;
                }

                refresh_pending_sqlite(&mut tx, chain_id, head, now).await?;
                tx.commit().await?;
            }
            DatabasePool::Postgres(pool) => {
                let mut tx = pool.begin().await?;

                for row in new_rows {
                    let result = sqlx::query(
                        r#"
                        INSERT INTO transactions
                        (transaction_hash, chain_id, address, operation, raw_amount, amount,
                         token_decimals, token_address, contract_address, block_number, block_hash,
                         block_time, confirmations, require_confirmations, status, created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                        ON CONFLICT (transaction_hash) DO NOTHING
                        "#,
                    )
                    .bind(&row.transaction_hash)
                    .bind(&row.chain_id)
                    .bind(&row.address)
                    .bind(row.operation.as_str())
                    .bind(&row.raw_amount)
                    .bind(&row.amount)
                    .bind(row.token_decimals as i32)
                    .bind(&row.token_address)
                    .bind(&row.contract_address)
                    .bind(row.block_number as i64)
                    .bind(&row.block_hash)
                    .bind(row.block_time_ms)
                    .bind(row.confirmations as i64)
                    .bind(row.require_confirmations as i64)
                    .bind(row.status().as_str())
                    .bind(now.timestamp_millis())
                    .bind(now.timestamp_millis())
                    .execute(&mut *tx)
                    .await?;

                    inserted += result.rows_affected() as usize;
                }

                refresh_pending_postgres(&mut tx, chain_id, head, now).await?;
                tx.commit().await?;
            }
        }

        Ok(inserted)
    }

    /// §4.4 step 3: delete every row at or past the divergent block and
    /// rewind the checkpoint to `reorg_block - 1`, atomically.
    pub async fn rollback(&self, chain_id: &str, reorg_block: u64) -> Result<u64> {
        let rewound_to = reorg_block.saturating_sub(1);

        let deleted = match &self.pool {
            DatabasePool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;
                let result = sqlx::query(
                    "DELETE FROM transactions WHERE chain_id = ? AND block_number >= ?",
                )
                .bind(chain_id)
                .bind(reorg_block as i64)
                .execute(&mut *tx)
                .await?;
                set_checkpoint_sqlite(&mut tx, chain_id, rewound_to).await?;
                tx.commit().await?;
                result.rows_affected()
            }
            DatabasePool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                let result = sqlx::query(
                    "DELETE FROM transactions WHERE chain_id = $1 AND block_number >= $2",
                )
                .bind(chain_id)
                .bind(reorg_block as i64)
                .execute(&mut *tx)
                .await?;
                set_checkpoint_postgres(&mut tx, chain_id, rewound_to).await?;
                tx.commit().await?;
                result.rows_affected()
            }
        };

        tracing::info!(chain_id, reorg_block, rewound_to, deleted, "reorg rollback complete");
        Ok(deleted)
    }

    pub async fn get_checkpoint(&self, chain_id: &str) -> Result<Option<u64>> {
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query("SELECT last_processed_block FROM checkpoints WHERE chain_id = ?")
                    .bind(chain_id)
                    .fetch_optional(pool)
                    .await?;
                Ok(row.map(|r| r.get::<i64, _>("last_processed_block") as u64))
            }
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query("SELECT last_processed_block FROM checkpoints WHERE chain_id = $1")
                    .bind(chain_id)
                    .fetch_optional(pool)
                    .await?;
                Ok(row.map(|r| r.get::<i64, _>("last_processed_block") as u64))
            }
        }
    }

    pub async fn set_checkpoint(&self, chain_id: &str, block: u64) -> Result<()> {
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;
                set_checkpoint_sqlite(&mut tx, chain_id, block).await?;
                tx.commit().await?;
            }
            DatabasePool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                set_checkpoint_postgres(&mut tx, chain_id, block).await?;
                tx.commit().await?;
            }
        }
        Ok(())
    }

    /// Cross-check for cold start: `MAX(blockNumber)` for this chain, used
    /// when the checkpoint store has no entry (§4.4 Startup).
    pub async fn max_block_number(&self, chain_id: &str) -> Result<Option<u64>> {
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query("SELECT MAX(block_number) AS m FROM transactions WHERE chain_id = ?")
                    .bind(chain_id)
                    .fetch_one(pool)
                    .await?;
                let max: Option<i64> = row.try_get("m").ok().flatten();
                Ok(max.map(|m| m as u64))
            }
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query("SELECT MAX(block_number) AS m FROM transactions WHERE chain_id = $1")
                    .bind(chain_id)
                    .fetch_one(pool)
                    .await?;
                let max: Option<i64> = row.try_get("m").ok().flatten();
                Ok(max.map(|m| m as u64))
            }
        }
    }

    /// Fallback verifier step 1: does a row already exist for this tx?
    pub async fn find_by_transaction_hash(
        &self,
        chain_id: &str,
        transaction_hash: &str,
    ) -> Result<Option<TransactionRow>> {
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query(
                    "SELECT * FROM transactions WHERE chain_id = ? AND transaction_hash = ?",
                )
                .bind(chain_id)
                .bind(transaction_hash)
                .fetch_optional(pool)
                .await?;
                row.map(row_to_transaction_sqlite).transpose()
            }
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query(
                    "SELECT * FROM transactions WHERE chain_id = $1 AND transaction_hash = $2",
                )
                .bind(chain_id)
                .bind(transaction_hash)
                .fetch_optional(pool)
                .await?;
                row.map(row_to_transaction_postgres).transpose()
            }
        }
    }

    /// Read-only counts for the `status` CLI command: total rows and a
    /// per-status breakdown, without touching the RPC pool.
    pub async fn status_counts(&self, chain_id: &str) -> Result<Vec<(String, i64)>> {
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                let rows = sqlx::query(
                    "SELECT status, COUNT(*) AS n FROM transactions WHERE chain_id = ? GROUP BY status",
                )
                .bind(chain_id)
                .fetch_all(pool)
                .await?;
                Ok(rows
                    .into_iter()
                    .map(|r| (r.get::<String, _>("status"), r.get::<i64, _>("n")))
                    .collect())
            }
            DatabasePool::Postgres(pool) => {
                let rows = sqlx::query(
                    "SELECT status, COUNT(*) AS n FROM transactions WHERE chain_id = $1 GROUP BY status",
                )
                .bind(chain_id)
                .fetch_all(pool)
                .await?;
                Ok(rows
                    .into_iter()
                    .map(|r| (r.get::<String, _>("status"), r.get::<i64, _>("n")))
                    .collect())
            }
        }
    }
}

async fn set_checkpoint_sqlite(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    chain_id: &str,
    block: u64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO checkpoints (chain_id, last_processed_block) VALUES (?, ?)
        ON CONFLICT(chain_id) DO UPDATE SET last_processed_block = excluded.last_processed_block
        "#,
    )
    .bind(chain_id)
    .bind(block as i64)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn set_checkpoint_postgres(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    chain_id: &str,
    block: u64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO checkpoints (chain_id, last_processed_block) VALUES ($1, $2)
        ON CONFLICT (chain_id) DO UPDATE SET last_processed_block = excluded.last_processed_block
        "#,
    )
    .bind(chain_id)
    .bind(block as i64)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// §4.4 step 6c: recompute confirmations for every pending row, capped at
/// `require_confirmations`, flipping status to `CONFIRMED` at the threshold.
async fn refresh_pending_sqlite(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    chain_id: &str,
    head: u64,
    now: DateTime<Utc>,
) -> Result<()> {
    let rows = sqlx::query(
        "SELECT id, block_number, confirmations, require_confirmations FROM transactions \
         WHERE chain_id = ? AND confirmations < require_confirmations",
    )
    .bind(chain_id)
    .fetch_all(&mut **tx)
    .await?;

    for row in rows {
        let id: i64 = row.get("id");
        let block_number = row.get::<i64, _>("block_number") as u64;
        let current: u64 = row.get::<i64, _>("confirmations") as u64;
        let required: u64 = row.get::<i64, _>("require_confirmations") as u64;

        let recomputed = ((head + 1).saturating_sub(block_number)).min(required);
        if recomputed != current {
            let status = Status::from_confirmations(recomputed, required);
            sqlx::query(
                "UPDATE transactions SET confirmations = ?, status = ?, updated_at = ? WHERE id = ?",
            )
            .bind(recomputed as i64)
            .bind(status.as_str())
            .bind(now.timestamp_millis())
            .bind(id)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

async fn refresh_pending_postgres(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    chain_id: &str,
    head: u64,
    now: DateTime<Utc>,
) -> Result<()> {
    let rows = sqlx::query(
        "SELECT id, block_number, confirmations, require_confirmations FROM transactions \
         WHERE chain_id = $1 AND confirmations < require_confirmations",
    )
    .bind(chain_id)
    .fetch_all(&mut **tx)
    .await?;

    for row in rows {
        let id: i64 = row.get("id");
        let block_number = row.get::<i64, _>("block_number") as u64;
        let current: u64 = row.get::<i64, _>("confirmations") as u64;
        let required: u64 = row.get::<i64, _>("require_confirmations") as u64;

        let recomputed = ((head + 1).saturating_sub(block_number)).min(required);
        if recomputed != current {
            let status = Status::from_confirmations(recomputed, required);
            sqlx::query(
                "UPDATE transactions SET confirmations = $1, status = $2, updated_at = $3 WHERE id = $4",
            )
            .bind(recomputed as i64)
            .bind(status.as_str())
            .bind(now.timestamp_millis())
            .bind(id)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

macro_rules! row_to_transaction_fn {
    ($name:ident, $row_ty:ty) => {
        fn $name(row: $row_ty) -> Result<TransactionRow> {
            use crate::error::CrawlerError;

            let operation_str: String = row.get("operation");
            let status_str: String = row.get("status");

            Ok(TransactionRow {
                id: row.get::<i64, _>("id"),
                transaction_hash: row.get("transaction_hash"),
                chain_id: row.get("chain_id"),
                address: row.get("address"),
                operation: operation_str
                    .parse()
                    .map_err(|_| CrawlerError::Parse(format!("bad operation in row: {operation_str}")))?,
                raw_amount: row.get("raw_amount"),
                amount: row.get("amount"),
                token_decimals: row.get::<i64, _>("token_decimals") as u8,
                token_address: row.get("token_address"),
                contract_address: row.get("contract_address"),
                block_number: row.get::<i64, _>("block_number") as u64,
                block_hash: row.get("block_hash"),
                block_time_ms: row.get::<i64, _>("block_time"),
                confirmations: row.get::<i64, _>("confirmations") as u64,
                require_confirmations: row.get::<i64, _>("require_confirmations") as u64,
                status: status_str
                    .parse()
                    .map_err(|_| CrawlerError::Parse(format!("bad status in row: {status_str}")))?,
                created_at: DateTime::from_timestamp_millis(row.get::<i64, _>("created_at"))
                    .unwrap_or_else(Utc::now),
                updated_at: DateTime::from_timestamp_millis(row.get::<i64, _>("updated_at"))
                    .unwrap_or_else(Utc::now),
            })
        }
    };
}

row_to_transaction_fn!(row_to_transaction_sqlite, sqlx::sqlite::SqliteRow);
row_to_transaction_fn!(row_to_transaction_postgres, sqlx::postgres::PgRow);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use tempfile::NamedTempFile;

    fn test_chain() -> ChainConfig {
        ChainConfig {
            chain_id: "1".to_string(),
            name: "test".to_string(),
            rpc_urls: vec!["https://rpc.example".to_string()],
            contract_address: "0xcccccccccccccccccccccccccccccccccccccccc".to_string(),
            start_block: 1000,
            required_confirmations: 12,
            reorg_depth: 12,
            batch_size: 100,
            polling_interval_ms: 10,
            restart_delay_ms: 10,
            max_retries: 3,
            retry_delay_ms: 10,
            rpc_timeout_ms: 5_000,
        }
    }

    fn event(block_number: u64, tx_hash: &str) -> ParsedEvent {
        ParsedEvent {
            operation: Operation::Deposit,
            address: Address::new("0x1111111111111111111111111111111111111111").unwrap(),
            token_address: Some(Address::new("0x2222222222222222222222222222222222222222").unwrap()),
            raw_amount: "1000000000000000000".to_string(),
            decimals: 18,
            amount: "1.000000000000000000".to_string(),
            contract_address: Address::new("0xcccccccccccccccccccccccccccccccccccccccc").unwrap(),
            block_number,
            transaction_hash: tx_hash.to_string(),
            block_hash: Some("0xaaaa".to_string()),
            log_index: 0,
        }
    }

    async fn temp_store() -> (Store, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let store = Store::new(file.path()).await.unwrap();
        (store, file)
    }

    #[tokio::test]
    async fn s1_happy_path_single_batch() {
        let (store, _file) = temp_store().await;
        let chain = test_chain();
        let head = 1010;
        let row = NewTransactionRow::from_parsed_event(&event(1005, "0xdead"), &chain, head, "0xblockhash", 0);

        let inserted = store.persist_batch(&chain.chain_id, &[row], head).await.unwrap();
        assert_eq!(inserted, 1);

        let stored = store.find_by_transaction_hash(&chain.chain_id, "0xdead").await.unwrap().unwrap();
        assert_eq!(stored.raw_amount, "1000000000000000000");
        assert_eq!(stored.amount, "1.000000000000000000");
        assert_eq!(stored.confirmations, 6);
        assert_eq!(stored.status, Status::Pending);
    }

    #[tokio::test]
    async fn s2_confirmation_progression_to_confirmed() {
        let (store, _file) = temp_store().await;
        let chain = test_chain();
        let row = NewTransactionRow::from_parsed_event(&event(1005, "0xdead"), &chain, 1010, "0xblockhash", 0);
        store.persist_batch(&chain.chain_id, &[row], 1010).await.unwrap();

        store.persist_batch(&chain.chain_id, &[], 1017).await.unwrap();

        let stored = store.find_by_transaction_hash(&chain.chain_id, "0xdead").await.unwrap().unwrap();
        assert_eq!(stored.confirmations, 12);
        assert_eq!(stored.status, Status::Confirmed);
    }

    #[tokio::test]
    async fn s3_idempotent_replay_no_duplicate_row() {
        let (store, _file) = temp_store().await;
        let chain = test_chain();
        let row = NewTransactionRow::from_parsed_event(&event(1005, "0xdead"), &chain, 1010, "0xblockhash", 0);

        store.persist_batch(&chain.chain_id, &[row.clone()], 1010).await.unwrap();
        store.persist_batch(&chain.chain_id, &[row], 1017).await.unwrap();

        let counts = store.status_counts(&chain.chain_id).await.unwrap();
        let total: i64 = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn p1_uniqueness_rejects_duplicate_insert_in_same_batch() {
        let (store, _file) = temp_store().await;
        let chain = test_chain();
        let row = NewTransactionRow::from_parsed_event(&event(1005, "0xdead"), &chain, 1010, "0xblockhash", 0);

        store.persist_batch(&chain.chain_id, &[row.clone(), row], 1010).await.unwrap();

        let counts = store.status_counts(&chain.chain_id).await.unwrap();
        let total: i64 = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn s4_rollback_deletes_rows_and_rewinds_checkpoint() {
        let (store, _file) = temp_store().await;
        let chain = test_chain();
        let row_a = NewTransactionRow::from_parsed_event(&event(1015, "0xaaa"), &chain, 1020, "0xh", 0);
        let row_b = NewTransactionRow::from_parsed_event(&event(1010, "0xbbb"), &chain, 1020, "0xh", 0);
        store.persist_batch(&chain.chain_id, &[row_a, row_b], 1020).await.unwrap();
        store.set_checkpoint(&chain.chain_id, 1020).await.unwrap();

        let deleted = store.rollback(&chain.chain_id, 1015).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(store.find_by_transaction_hash(&chain.chain_id, "0xaaa").await.unwrap().is_none());
        assert!(store.find_by_transaction_hash(&chain.chain_id, "0xbbb").await.unwrap().is_some());
        assert_eq!(store.get_checkpoint(&chain.chain_id).await.unwrap(), Some(1014));
    }

    #[tokio::test]
    async fn checkpoint_falls_back_to_max_block_number_when_unset() {
        let (store, _file) = temp_store().await;
        let chain = test_chain();
        assert_eq!(store.get_checkpoint(&chain.chain_id).await.unwrap(), None);
        assert_eq!(store.max_block_number(&chain.chain_id).await.unwrap(), None);

        let row = NewTransactionRow::from_parsed_event(&event(1005, "0xdead"), &chain, 1010, "0xh", 0);
        store.persist_batch(&chain.chain_id, &[row], 1010).await.unwrap();

        assert_eq!(store.max_block_number(&chain.chain_id).await.unwrap(), Some(1005));
    }

    #[tokio::test]
    async fn s6_fallback_verifier_caps_confirmations_at_threshold() {
        let (store, _file) = temp_store().await;
        let chain = test_chain();
        let row = NewTransactionRow::from_parsed_event(&event(1008, "0xbeef"), &chain, 1025, "0xh", 0);
        assert_eq!(row.confirmations, 12);

        store.persist_batch(&chain.chain_id, &[row], 1025).await.unwrap();
        let stored = store.find_by_transaction_hash(&chain.chain_id, "0xbeef").await.unwrap().unwrap();
        assert_eq!(stored.confirmations, 12);
        assert_eq!(stored.status, Status::Confirmed);
    }
}
