//! Type-safe wrappers for chain primitives.
//!
//! Newtype wrappers prevent mixing up addresses with arbitrary strings and
//! keep normalization (lowercase, `0x`-prefixed hex) in one place.

use crate::error::{CrawlerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An EVM address, always stored canonicalized to lowercase hex.
///
/// # Example
///
/// ```ignore
/// let addr = Address::new("0x45a1502382541Cd610CC9068e88727426b696293")?;
/// assert_eq!(addr.as_str(), "0x45a1502382541cd610cc9068e88727426b696293");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Parse and normalize to lowercase. Validates `0x` prefix, 40 hex chars.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let addr = address.into();

        if !addr.starts_with("0x") {
            return Err(CrawlerError::Parse(format!(
                "invalid address '{addr}': must start with 0x"
            )));
        }

        if addr.len() != 42 {
            return Err(CrawlerError::Parse(format!(
                "invalid address '{}': must be 42 characters (0x + 40 hex chars), got {}",
                addr,
                addr.len()
            )));
        }

        if !addr[2..].chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CrawlerError::Parse(format!(
                "invalid address '{addr}': contains non-hex characters"
            )));
        }

        Ok(Self(addr.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build from an `alloy` primitive address, lowercased via its `Display`.
    pub fn from_alloy(addr: alloy::primitives::Address) -> Self {
        Self(format!("{addr:#x}"))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// The two event kinds this system tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Deposit,
    Withdraw,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deposit => "deposit",
            Operation::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deposit" => Ok(Operation::Deposit),
            "withdraw" => Ok(Operation::Withdraw),
            other => Err(CrawlerError::Parse(format!("unknown operation '{other}'"))),
        }
    }
}

/// Lifecycle status of a persisted transaction row, derived from `confirmations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pending,
    Confirmed,
    Failed,
}

impl Status {
    /// Derive status from confirmation counts. Invariant I2.
    pub fn from_confirmations(confirmations: u64, required_confirmations: u64) -> Self {
        if confirmations >= required_confirmations {
            Status::Confirmed
        } else {
            Status::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Confirmed => "CONFIRMED",
            Status::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = CrawlerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Status::Pending),
            "CONFIRMED" => Ok(Status::Confirmed),
            "FAILED" => Ok(Status::Failed),
            other => Err(CrawlerError::Parse(format!("unknown status '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_normalizes_case() {
        let a = Address::new("0xABCDEF1234567890ABCDef1234567890abcDEF12").unwrap();
        let b = Address::new("0xabcdef1234567890abcdef1234567890abcdef12").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn address_rejects_missing_prefix() {
        let result = Address::new("45a1502382541Cd610CC9068e88727426b696293");
        assert!(result.is_err());
    }

    #[test]
    fn address_rejects_wrong_length() {
        let result = Address::new("0x123");
        assert!(result.is_err());
    }

    #[test]
    fn address_rejects_non_hex() {
        let result = Address::new("0x45a1502382541Cd610CC9068e88727426b696zz");
        assert!(result.is_err());
    }

    #[test]
    fn status_coherence_boundary() {
        assert_eq!(Status::from_confirmations(11, 12), Status::Pending);
        assert_eq!(Status::from_confirmations(12, 12), Status::Confirmed);
        assert_eq!(Status::from_confirmations(20, 12), Status::Confirmed);
    }

    #[test]
    fn operation_round_trips_through_str() {
        assert_eq!("deposit".parse::<Operation>().unwrap(), Operation::Deposit);
        assert_eq!("withdraw".parse::<Operation>().unwrap(), Operation::Withdraw);
        assert!("transfer".parse::<Operation>().is_err());
    }
}
