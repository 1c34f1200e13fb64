// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Short-lived cache of the chain reference data used to build transactions.
//!
//! A single lock guards the snapshot for the whole lookup, including the
//! refresh, so concurrent callers that miss at the same time issue one
//! `get_info` request between them.

use crate::chain_client::{ChainApiError, ChainClient, ChainClientInner};
use crate::metrics::OracleMetrics;
use daobet_types::{Checksum256, TxOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// How long a fetched snapshot is served without querying the chain.
pub const CHAIN_STATE_TTL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainStateSnapshot {
    pub chain_id: Checksum256,
    /// Block used as the TAPOS reference: the last irreversible block.
    pub head_block_id: Checksum256,
    pub fetched_at: Instant,
}

impl ChainStateSnapshot {
    pub fn tx_options(&self) -> TxOptions {
        TxOptions::new(self.chain_id, self.head_block_id)
    }
}

pub struct ChainStateCache<P> {
    client: Arc<ChainClient<P>>,
    snapshot: Mutex<Option<ChainStateSnapshot>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    metrics: Arc<OracleMetrics>,
}

impl<P> ChainStateCache<P>
where
    P: ChainClientInner,
{
    pub fn new(client: Arc<ChainClient<P>>, metrics: Arc<OracleMetrics>) -> Self {
        Self::with_ttl(client, metrics, CHAIN_STATE_TTL)
    }

    pub fn with_ttl(
        client: Arc<ChainClient<P>>,
        metrics: Arc<OracleMetrics>,
        ttl: Duration,
    ) -> Self {
        Self {
            client,
            snapshot: Mutex::new(None),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            metrics,
        }
    }

    /// Returns the cached snapshot while it is younger than the TTL, otherwise
    /// queries the chain and replaces it. On failure the stale snapshot is
    /// kept and the error is returned.
    pub async fn get_snapshot(&self) -> Result<ChainStateSnapshot, ChainApiError> {
        let mut guard = self.snapshot.lock().await;
        if let Some(snapshot) = guard.as_ref() {
            if snapshot.fetched_at.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.chain_state_cache_hits.inc();
                return Ok(snapshot.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.metrics.chain_state_cache_misses.inc();
        let info = self.client.get_info().await?;
        let snapshot = ChainStateSnapshot {
            chain_id: info.chain_id,
            head_block_id: info.last_irreversible_block_id,
            fetched_at: Instant::now(),
        };
        debug!(
            "Refreshed chain state: chain_id={}, tapos block={} (#{})",
            snapshot.chain_id, snapshot.head_block_id, info.last_irreversible_block_num
        );
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn get_tx_options(&self) -> Result<TxOptions, ChainApiError> {
        self.get_snapshot().await.map(|s| s.tx_options())
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    #[cfg(test)]
    pub async fn cached(&self) -> Option<ChainStateSnapshot> {
        self.snapshot.lock().await.clone()
    }
}
