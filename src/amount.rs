//! Bounded-precision amount handling.
//!
//! `rawAmount` is an arbitrary-precision 256-bit integer (up to 78 decimal
//! digits); `amount` is that value divided by `10^decimals`. Both are kept as
//! decimal strings end to end — binary floating point never enters this path.

use crate::error::{CrawlerError, Result};
use alloy::primitives::U256;
use alloy::primitives::utils::format_units;

/// Format a raw on-chain integer amount as a fixed-scale decimal string.
///
/// `decimals` always comes from the decoded `Deposit`/`Withdraw` log itself —
/// the registry contract has no default to fall back on.
pub fn format_amount(raw: U256, decimals: u8) -> Result<String> {
    format_units(raw, decimals).map_err(|e| CrawlerError::Parse(format!("amount formatting failed: {e}")))
}

/// Parse a decimal string (as produced by a JSON-RPC `uint256` field) into `U256`.
pub fn parse_raw_amount(raw: &str) -> Result<U256> {
    U256::from_str_radix(raw, 10)
        .map_err(|e| CrawlerError::Parse(format!("invalid raw amount '{raw}': {e}")))
}
