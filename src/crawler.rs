//! Crawler Loop: the controller that repeatedly polls the head, detects and
//! repairs reorgs, fetches and parses logs, persists rows, and advances the
//! checkpoint (§4.4). Generic over [`ChainRpc`] so tests can drive it with a
//! scripted mock instead of a live node.

use crate::block_cache::{BlockCache, BlockEntry};
use crate::config::ChainConfig;
use crate::error::Result;
use crate::events::ParsedEvent;
use crate::parser;
use crate::rpc::{BlockMeta, ChainRpc};
use crate::store::{NewTransactionRow, Store};
use crate::types::Address;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How many block-metadata fetches the crawler runs concurrently against the
/// RPC pool (§5's "bounded parallel fan-out").
const BLOCK_FETCH_FANOUT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// `fromBlock > head`; nothing to do this pass.
    Idle,
    /// A reorg was found and rolled back; the caller should loop immediately.
    Reorg,
    /// A window was processed. `reached_head` is true when `toBlock == head`.
    Progressed { reached_head: bool },
}

pub struct Crawler<R: ChainRpc> {
    chain: ChainConfig,
    contract: Address,
    rpc: R,
    store: Store,
    cache: BlockCache,
    last_processed_block: u64,
    shutdown: Arc<AtomicBool>,
}

impl<R: ChainRpc> Crawler<R> {
    /// Loads `lastProcessedBlock` from the checkpoint store, falling back to
    /// `MAX(blockNumber)` and then `startBlock - 1` (§4.4 Startup).
    pub async fn new(chain: ChainConfig, rpc: R, store: Store) -> Result<Self> {
        let contract = Address::new(chain.contract_address.clone())?;
        let last_processed_block = Self::load_checkpoint(&chain, &store).await?;

        Ok(Self {
            chain,
            contract,
            rpc,
            store,
            cache: BlockCache::new(),
            last_processed_block,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn load_checkpoint(chain: &ChainConfig, store: &Store) -> Result<u64> {
        if let Some(checkpoint) = store.get_checkpoint(&chain.chain_id).await? {
            return Ok(checkpoint);
        }

        if let Some(max) = store.max_block_number(&chain.chain_id).await? {
            store.set_checkpoint(&chain.chain_id, max).await?;
            return Ok(max);
        }

        let floor = chain.start_block.saturating_sub(1);
        store.set_checkpoint(&chain.chain_id, floor).await?;
        Ok(floor)
    }

    /// A shared flag the caller can flip to stop the loop after the current
    /// batch finishes persisting (§4.4 Shutdown).
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn last_processed_block(&self) -> u64 {
        self.last_processed_block
    }

    /// Runs cycles until `shutdown_handle()` is set.
    pub async fn run(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            let outcome = self.run_cycle().await?;

            match outcome {
                CycleOutcome::Idle => {
                    tokio::time::sleep(Duration::from_millis(self.chain.restart_delay_ms)).await;
                }
                CycleOutcome::Reorg => {}
                CycleOutcome::Progressed { reached_head } => {
                    tokio::time::sleep(Duration::from_millis(self.chain.polling_interval_ms)).await;
                    if reached_head {
                        tokio::time::sleep(Duration::from_millis(self.chain.restart_delay_ms)).await;
                    }
                }
            }
        }

        Ok(())
    }

    /// One pass of §4.4 steps 1-8. Public so tests can drive cycles one at a
    /// time without the pacing sleeps in [`Self::run`].
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let head = self.rpc.head_block_number().await?;
        let from_block = self.last_processed_block + 1;

        if from_block > head {
            return Ok(CycleOutcome::Idle);
        }

        if let Some(reorg_point) = self.probe_reorg().await? {
            self.rollback(reorg_point).await?;
            return Ok(CycleOutcome::Reorg);
        }

        let to_block = (from_block + self.chain.batch_size - 1).min(head);

        let logs = self.rpc.query_logs(&self.contract, from_block, to_block).await?;
        let events = parser::parse_all(logs);

        self.populate_block_metadata(&events, from_block, to_block, head).await?;

        let mut new_rows = Vec::with_capacity(events.len());
        for event in &events {
            match self.cache.get(event.block_number) {
                Some(entry) => new_rows.push(NewTransactionRow::from_parsed_event(
                    event,
                    &self.chain,
                    head,
                    &entry.hash,
                    entry.timestamp_ms,
                )),
                None => {
                    tracing::warn!(
                        block_number = event.block_number,
                        transaction_hash = %event.transaction_hash,
                        "missing block metadata at persist time, skipping event"
                    );
                }
            }
        }

        self.store.persist_batch(&self.chain.chain_id, &new_rows, head).await?;

        self.last_processed_block = to_block;
        self.store.set_checkpoint(&self.chain.chain_id, to_block).await?;

        self.cache.prune(head.saturating_sub(self.chain.reorg_depth));

        Ok(CycleOutcome::Progressed { reached_head: to_block == head })
    }

    /// Walk back from `lastProcessedBlock` up to `reorgDepth` ancestors,
    /// comparing cached hashes against the current canonical chain. Returns
    /// the deepest divergent height, if any (§4.4 step 2).
    async fn probe_reorg(&mut self) -> Result<Option<u64>> {
        let mut reorg_point = None;

        for i in 0..self.chain.reorg_depth {
            let height = match self.last_processed_block.checked_sub(i) {
                Some(h) => h,
                None => break,
            };

            if height < self.chain.start_block {
                break;
            }

            let cached = match self.cache.get(height) {
                Some(entry) => entry.clone(),
                None => continue,
            };

            let Some(current) = self.rpc.get_block(height).await? else {
                continue;
            };

            if current.hash == cached.hash {
                self.cache.put(height, to_block_entry(&current));
                break;
            }

            reorg_point = Some(height);
            self.cache.put(height, to_block_entry(&current));
        }

        Ok(reorg_point)
    }

    /// §4.4 step 3: delete rows at or past the divergence, drop cache
    /// entries at or past it, rewind the checkpoint.
    async fn rollback(&mut self, reorg_point: u64) -> Result<()> {
        self.store.rollback(&self.chain.chain_id, reorg_point).await?;
        self.cache.drop_from(reorg_point);
        self.last_processed_block = reorg_point.saturating_sub(1);
        self.store
            .set_checkpoint(&self.chain.chain_id, self.last_processed_block)
            .await?;
        Ok(())
    }

    /// §4.4 step 5: fetch every block still needed to stamp new rows (`E`)
    /// or to keep the next cycle's reorg probe supplied with hashes (`F`),
    /// concurrently across the RPC pool.
    async fn populate_block_metadata(
        &mut self,
        events: &[ParsedEvent],
        from_block: u64,
        to_block: u64,
        head: u64,
    ) -> Result<()> {
        let mut needed: BTreeSet<u64> = events.iter().map(|e| e.block_number).collect();
        let window_start = head.saturating_sub(self.chain.reorg_depth) + 1;
        for n in from_block..=to_block {
            if n >= window_start {
                needed.insert(n);
            }
        }

        let missing: Vec<u64> = needed.into_iter().filter(|n| !self.cache.contains(*n)).collect();

        let rpc = &self.rpc;
        let fetched: Vec<Result<(u64, Option<BlockMeta>)>> = stream::iter(missing)
            .map(|n| async move { rpc.get_block(n).await.map(|block| (n, block)) })
            .buffer_unordered(BLOCK_FETCH_FANOUT)
            .collect()
            .await;

        for result in fetched {
            let (n, block) = result?;
            if let Some(block) = block {
                self.cache.put(n, to_block_entry(&block));
            }
        }

        Ok(())
    }
}

fn to_block_entry(block: &BlockMeta) -> BlockEntry {
    BlockEntry {
        hash: block.hash.clone(),
        parent_hash: block.parent_hash.clone(),
        timestamp_ms: block.timestamp_ms,
    }
}
