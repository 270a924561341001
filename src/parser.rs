//! Event Parser Registry: decodes a raw log into a typed [`ParsedEvent`] or
//! rejects it. Adding a new event kind means adding one more arm to
//! `try_parse_one` plus registering its name in [`crate::events::TRACKED_EVENTS`]
//! — nothing else changes.

use crate::amount::format_amount;
use crate::error::Result;
use crate::events::{ParsedEvent, Vault};
use crate::types::{Address, Operation};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

/// Decode every log in a batch. Unknown event names are skipped with a
/// warning; malformed logs are skipped with an error. Never aborts the batch.
pub fn parse_all(logs: Vec<Log>) -> Vec<ParsedEvent> {
    let mut parsed = Vec::with_capacity(logs.len());

    for log in logs {
        match try_parse_one(&log) {
            Ok(Some(event)) => parsed.push(event),
            Ok(None) => {
                tracing::warn!(
                    address = %log.address(),
                    "log did not match a registered event, skipping"
                );
            }
            Err(e) => {
                tracing::error!(
                    address = %log.address(),
                    error = %e,
                    "failed to decode log, skipping"
                );
            }
        }
    }

    parsed
}

fn try_parse_one(log: &Log) -> Result<Option<ParsedEvent>> {
    if let Ok(decoded) = Vault::Deposit::decode_log(&log.inner, true) {
        return build_event(log, Operation::Deposit, decoded.user, decoded.tokenAddress, decoded.amount, decoded.decimals)
            .map(Some);
    }

    if let Ok(decoded) = Vault::Withdraw::decode_log(&log.inner, true) {
        return build_event(log, Operation::Withdraw, decoded.user, decoded.tokenAddress, decoded.amount, decoded.decimals)
            .map(Some);
    }

    Ok(None)
}

fn build_event(
    log: &Log,
    operation: Operation,
    user: alloy::primitives::Address,
    token_address: alloy::primitives::Address,
    raw_amount: alloy::primitives::U256,
    decimals: u8,
) -> Result<ParsedEvent> {
    let block_number = log
        .block_number
        .ok_or_else(|| crate::error::CrawlerError::Parse("log missing block number".to_string()))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| crate::error::CrawlerError::Parse("log missing transaction hash".to_string()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| crate::error::CrawlerError::Parse("log missing log index".to_string()))?;

    Ok(ParsedEvent {
        operation,
        address: Address::from_alloy(user),
        token_address: Some(Address::from_alloy(token_address)),
        raw_amount: raw_amount.to_string(),
        decimals,
        amount: format_amount(raw_amount, decimals)?,
        contract_address: Address::from_alloy(log.address()),
        block_number,
        transaction_hash: format!("{transaction_hash:#x}"),
        block_hash: log.block_hash.map(|h| format!("{h:#x}")),
        log_index,
    })
}
