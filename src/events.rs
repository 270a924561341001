//! The watched contract's ABI and the typed, parsed event shape produced by
//! the registry in [`crate::parser`].

use crate::types::{Address, Operation};
use alloy::sol;
use serde::{Deserialize, Serialize};

// Contract definition for the watched vault using alloy's sol! macro. Both
// events share the same shape: an indexed user, an indexed token, a raw
// amount, and the token's decimals.
sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    Vault,
    r#"[
        {
            "anonymous": false,
            "inputs": [
                { "indexed": true, "internalType": "address", "name": "user", "type": "address" },
                { "indexed": true, "internalType": "address", "name": "tokenAddress", "type": "address" },
                { "indexed": false, "internalType": "uint256", "name": "amount", "type": "uint256" },
                { "indexed": false, "internalType": "uint8", "name": "decimals", "type": "uint8" }
            ],
            "name": "Deposit",
            "type": "event"
        },
        {
            "anonymous": false,
            "inputs": [
                { "indexed": true, "internalType": "address", "name": "user", "type": "address" },
                { "indexed": true, "internalType": "address", "name": "tokenAddress", "type": "address" },
                { "indexed": false, "internalType": "uint256", "name": "amount", "type": "uint256" },
                { "indexed": false, "internalType": "uint8", "name": "decimals", "type": "uint8" }
            ],
            "name": "Withdraw",
            "type": "event"
        }
    ]"#
}

/// The name the registry dispatches on; also the event signature name on chain.
pub const DEPOSIT_EVENT: &str = "Deposit";
pub const WITHDRAW_EVENT: &str = "Withdraw";

pub const TRACKED_EVENTS: [&str; 2] = [DEPOSIT_EVENT, WITHDRAW_EVENT];

/// A decoded `Deposit` or `Withdraw` log, with metadata needed to build a
/// transaction row. `block_hash`/`block_time` are filled in by the crawler
/// from the block cache once the owning block has been fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub operation: Operation,
    pub address: Address,
    pub token_address: Option<Address>,
    /// Decimal-string encoding of the raw on-chain `uint256`; never a binary float.
    pub raw_amount: String,
    pub decimals: u8,
    /// `raw_amount` divided by `10^decimals`, fixed-scale decimal string.
    pub amount: String,
    pub contract_address: Address,
    pub block_number: u64,
    pub transaction_hash: String,
    pub block_hash: Option<String>,
    pub log_index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolEvent;

    #[test]
    fn deposit_and_withdraw_have_distinct_signatures() {
        assert_ne!(Vault::Deposit::SIGNATURE_HASH, Vault::Withdraw::SIGNATURE_HASH);
        assert!(TRACKED_EVENTS.contains(&DEPOSIT_EVENT));
        assert!(TRACKED_EVENTS.contains(&WITHDRAW_EVENT));
    }
}
