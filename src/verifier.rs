//! Fallback Verifier (§4.5): an on-demand path that resolves a single
//! `(chainId, txHash)` pair the live crawler may have missed — e.g. during
//! downtime — and backfills it. Shares the event-parsing and persistence
//! contracts with the crawler loop, so it cannot violate I1 or I2.

use crate::config::AppConfig;
use crate::error::Result;
use crate::parser;
use crate::rpc::ChainRpc;
use crate::store::{NewTransactionRow, Store, TransactionRow};
use crate::types::Address;

/// The outcome of one verification attempt.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub found: bool,
    pub row: Option<TransactionRow>,
    pub message: String,
}

impl VerifyOutcome {
    fn not_found(message: impl Into<String>) -> Self {
        Self { found: false, row: None, message: message.into() }
    }
}

/// Runs §4.5 steps 1-8 against a single chain's RPC pool and store.
pub async fn verify<R: ChainRpc>(
    config: &AppConfig,
    rpc: &R,
    store: &Store,
    chain_id: &str,
    tx_hash: &str,
) -> Result<VerifyOutcome> {
    if let Some(row) = store.find_by_transaction_hash(chain_id, tx_hash).await? {
        return Ok(VerifyOutcome { found: true, row: Some(row), message: "already present".to_string() });
    }

    let Some(chain) = config.chains.get(chain_id) else {
        return Ok(VerifyOutcome::not_found("unsupported chain"));
    };

    let Some(receipt) = rpc.get_transaction_receipt(tx_hash).await? else {
        return Ok(VerifyOutcome::not_found("not on chain"));
    };

    let contract = Address::new(chain.contract_address.clone())?;
    match &receipt.to {
        Some(to) if *to == contract => {}
        _ => return Ok(VerifyOutcome::not_found("not tracked contract")),
    }

    let events = parser::parse_all(receipt.logs);
    if events.is_empty() {
        return Ok(VerifyOutcome::not_found("no tracked event in this transaction"));
    }

    let head = rpc.head_block_number().await?;
    let block = rpc.get_block(receipt.block_number).await?;
    let Some(block) = block else {
        return Ok(VerifyOutcome::not_found("block no longer available"));
    };

    let new_rows: Vec<NewTransactionRow> = events
        .iter()
        .map(|event| NewTransactionRow::from_parsed_event(event, chain, head, &block.hash, block.timestamp_ms))
        .collect();

    let inserted = store.persist_batch(chain_id, &new_rows, head).await?;
    let row = store.find_by_transaction_hash(chain_id, tx_hash).await?;

    Ok(VerifyOutcome {
        found: true,
        row,
        message: format!("saved {inserted} row(s)"),
    })
}
