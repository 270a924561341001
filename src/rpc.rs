//! RPC Client Pool: a façade over a configured, ordered list of endpoints for
//! one chain. Providers are built once at construction (memoized by endpoint
//! string) and iterated on a classified set of recoverable errors; any other
//! error propagates immediately.

use crate::config::ChainConfig;
use crate::error::{CrawlerError, Result};
use crate::events::Vault;
use crate::types::Address as ChainAddress;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Block, BlockTransactionsKind, Filter, Log};
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client, Http};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Enough of a block's identity to detect a reorg and stamp a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMeta {
    pub hash: String,
    pub parent_hash: String,
    pub timestamp_ms: i64,
}

/// Enough of a transaction receipt to run the fallback verifier's checks.
#[derive(Debug, Clone)]
pub struct ReceiptMeta {
    pub to: Option<ChainAddress>,
    pub block_number: u64,
    pub logs: Vec<Log>,
}

/// The four operations the crawler and verifier need from a chain, behind a
/// trait so both can be exercised in tests without a live RPC endpoint.
pub trait ChainRpc: Send + Sync {
    fn head_block_number(&self) -> impl Future<Output = Result<u64>> + Send;
    fn get_block(&self, number: u64) -> impl Future<Output = Result<Option<BlockMeta>>> + Send;
    fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> impl Future<Output = Result<Option<ReceiptMeta>>> + Send;
    fn query_logs(
        &self,
        contract: &ChainAddress,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<Log>>> + Send;
}

/// Substring classification of recoverable JSON-RPC / transport errors (§4.1).
/// Fragile by design (string matching on whatever the transport surfaces);
/// kept as a single predicate so it can be swapped for structured error codes
/// later without touching call sites.
pub fn is_recoverable(message: &str) -> bool {
    let lower = message.to_lowercase();
    const RECOVERABLE_SUBSTRINGS: &[&str] = &[
        "429",
        "too many requests",
        "pruned",
        "missing trie node",
        "disconnect",
        "failed to detect network",
        "connection reset",
        "connection refused",
        "internal error",
        "internal json-rpc error",
        "timed out",
        "timeout",
    ];
    RECOVERABLE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

/// A façade over `chain.rpc_urls`, failing over left to right on a
/// recoverable error and surfacing the last error once every endpoint has
/// been exhausted.
pub struct RpcPool {
    providers: Vec<(String, RootProvider<Http<Client>>)>,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl RpcPool {
    pub fn new(chain: &ChainConfig) -> Result<Self> {
        let mut providers = Vec::with_capacity(chain.rpc_urls.len());
        for url in &chain.rpc_urls {
            let parsed = url
                .parse()
                .map_err(|e| CrawlerError::Config(format!("invalid RPC URL '{url}': {e}")))?;
            providers.push((url.clone(), ProviderBuilder::new().on_http(parsed)));
        }

        Ok(Self {
            providers,
            // extended_retry_wait_seconds is intentionally large: the
            // per-call timeout below, not this module's own backoff,
            // is what bounds a single endpoint attempt so the pool can
            // fail over rather than retry forever on one endpoint.
            retry: RetryConfig {
                max_retries: chain.max_retries,
                initial_delay_ms: chain.retry_delay_ms,
                backoff_multiplier: 4,
                extended_retry_wait_seconds: 3600,
            },
            call_timeout: Duration::from_millis(chain.rpc_timeout_ms),
        })
    }

    /// Run `f` against each endpoint in order. A call that is recoverable
    /// (per [`is_recoverable`]) or that exceeds the per-call timeout advances
    /// to the next endpoint; anything else propagates immediately.
    async fn call<T, E, F, Fut>(&self, op_name: &str, f: F) -> Result<T>
    where
        F: Fn(&RootProvider<Http<Client>>) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_err: Option<String> = None;

        for (endpoint, provider) in &self.providers {
            let attempt = tokio::time::timeout(
                self.call_timeout,
                self.retry
                    .execute_with_predicate(|| f(provider), |e| is_recoverable(&e.to_string())),
            )
            .await;

            match attempt {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(message)) => {
                    // execute_with_predicate only returns Err for a
                    // non-recoverable error (it loops forever on recoverable
                    // ones until this call's timeout cuts it off below).
                    tracing::error!(endpoint = %endpoint, op = op_name, error = %message, "non-recoverable RPC error");
                    return Err(CrawlerError::Rpc(message));
                }
                Err(_elapsed) => {
                    tracing::warn!(endpoint = %endpoint, op = op_name, "RPC call timed out, failing over to next endpoint");
                    last_err = Some(format!("endpoint '{endpoint}' timed out calling {op_name}"));
                }
            }
        }

        Err(CrawlerError::Rpc(last_err.unwrap_or_else(|| {
            format!("no RPC endpoints configured for {op_name}")
        })))
    }
}

impl ChainRpc for RpcPool {
    async fn head_block_number(&self) -> Result<u64> {
        self.call("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockMeta>> {
        let block: Option<Block> = self
            .call("eth_getBlockByNumber", |p| async move {
                p.get_block_by_number(number.into(), BlockTransactionsKind::Hashes)
                    .await
            })
            .await?;

        Ok(block.map(|b| BlockMeta {
            hash: format!("{:#x}", b.header.hash),
            parent_hash: format!("{:#x}", b.header.parent_hash),
            timestamp_ms: b.header.timestamp as i64 * 1000,
        }))
    }

    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptMeta>> {
        let hash = tx_hash
            .parse()
            .map_err(|e| CrawlerError::Parse(format!("invalid transaction hash '{tx_hash}': {e}")))?;

        let receipt = self
            .call("eth_getTransactionReceipt", |p| async move {
                p.get_transaction_receipt(hash).await
            })
            .await?;

        Ok(receipt.map(|r| ReceiptMeta {
            to: r.to.map(ChainAddress::from_alloy),
            block_number: r.block_number.unwrap_or_default(),
            logs: r.inner.logs().to_vec(),
        }))
    }

    async fn query_logs(
        &self,
        contract: &ChainAddress,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        let address = alloy::primitives::Address::from_str(contract.as_str())
            .map_err(|e| CrawlerError::Parse(format!("invalid contract address: {e}")))?;

        // Narrow to the registry's two tracked events by topic0 (§6: "a
        // topic/address filter for the watched contract and the two event
        // signatures"), rather than pulling every log the contract emits.
        let filter = Filter::new()
            .address(address)
            .from_block(from_block)
            .to_block(to_block)
            .event_signature(vec![Vault::Deposit::SIGNATURE_HASH, Vault::Withdraw::SIGNATURE_HASH]);

        self.call("eth_getLogs", |p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_as_recoverable() {
        assert!(is_recoverable("429 Too Many Requests"));
        assert!(is_recoverable("server replied: Too Many Requests"));
    }

    #[test]
    fn classifies_pruned_history_as_recoverable() {
        assert!(is_recoverable("missing trie node; pruned history"));
    }

    #[test]
    fn classifies_disconnect_as_recoverable() {
        assert!(is_recoverable("transport error: disconnected"));
    }

    #[test]
    fn classifies_network_detection_as_recoverable() {
        assert!(is_recoverable("failed to detect network"));
    }

    #[test]
    fn classifies_generic_internal_error_as_recoverable() {
        assert!(is_recoverable("Internal JSON-RPC error"));
    }

    #[test]
    fn classifies_auth_failure_as_non_recoverable() {
        assert!(!is_recoverable("401 Unauthorized"));
        assert!(!is_recoverable("malformed response body"));
    }

    #[test]
    fn pool_construction_rejects_invalid_url() {
        let mut chain = test_chain_config();
        chain.rpc_urls = vec!["not-a-url".to_string()];
        assert!(RpcPool::new(&chain).is_err());
    }

    #[test]
    fn pool_construction_memoizes_one_provider_per_endpoint() {
        let mut chain = test_chain_config();
        chain.rpc_urls = vec![
            "https://rpc-a.example".to_string(),
            "https://rpc-b.example".to_string(),
        ];
        let pool = RpcPool::new(&chain).unwrap();
        assert_eq!(pool.providers.len(), 2);
    }

    fn test_chain_config() -> ChainConfig {
        ChainConfig {
            chain_id: "1".to_string(),
            name: "test".to_string(),
            rpc_urls: vec!["https://rpc.example".to_string()],
            contract_address: "0x0000000000000000000000000000000000000000".to_string(),
            start_block: 1,
            required_confirmations: 12,
            reorg_depth: 12,
            batch_size: 100,
            polling_interval_ms: 10,
            restart_delay_ms: 10,
            max_retries: 3,
            retry_delay_ms: 10,
            rpc_timeout_ms: 20_000,
        }
    }
}
