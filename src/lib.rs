//! Reorg-safe EVM `Deposit`/`Withdraw` event crawler.
//!
//! The crawler loop ([`crawler::Crawler`]) polls a configured chain's head,
//! detects and repairs reorgs against an in-memory block-hash cache
//! ([`block_cache`]), fetches and decodes logs through a registry of typed
//! parsers ([`parser`], [`events`]), and persists the result idempotently
//! ([`store`]). The fallback verifier ([`verifier`]) reuses the same
//! persistence contract to backfill a single missed transaction on demand.

pub mod amount;
pub mod block_cache;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod error;
pub mod events;
pub mod parser;
pub mod retry;
pub mod rpc;
pub mod store;
pub mod types;
pub mod verifier;

pub use config::AppConfig;
pub use error::{CrawlerError, Result};
pub use retry::RetryConfig;
pub use types::{Address, Operation, Status};
