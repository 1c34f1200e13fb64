// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_client::{ChainClient, ChainClientInner};
use crate::error::{OracleError, OracleResult};
use crate::key_bag::{KeyBag, SigningRole};
use crate::metrics::OracleMetrics;
use crate::retry::{retry_with_timeout, RetryPolicy};
use daobet_types::{
    Action, Checksum256, PackedTransaction, SignedTransaction, Transaction, TxOptions,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Signs transactions with one of the oracle's role keys and pushes them to
/// the chain. A push rejected as a duplicate counts as success.
pub struct TransactionBroadcaster<P> {
    client: Arc<ChainClient<P>>,
    keys: KeyBag,
    retry_policy: RetryPolicy,
    metrics: Arc<OracleMetrics>,
}

impl<P> TransactionBroadcaster<P>
where
    P: ChainClientInner,
{
    pub fn new(
        client: Arc<ChainClient<P>>,
        keys: KeyBag,
        retry_policy: RetryPolicy,
        metrics: Arc<OracleMetrics>,
    ) -> Self {
        Self {
            client,
            keys,
            retry_policy,
            metrics,
        }
    }

    pub fn client(&self) -> &Arc<ChainClient<P>> {
        &self.client
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Adds the `role` key's signature to `tx`.
    pub fn sign(
        &self,
        tx: &mut SignedTransaction,
        role: SigningRole,
        chain_id: &Checksum256,
    ) -> OracleResult<()> {
        let key = self.keys.get(role)?;
        tx.sign(key, chain_id)
            .map_err(|e| OracleError::SigningFailed(e.to_string()))
    }

    /// Builds a transaction for `actions` against `opts`, signs it with the
    /// `role` key and broadcasts it. Returns the transaction id, which is also
    /// carried by `BroadcastFailed` when the push does not go through.
    pub async fn sign_and_broadcast(
        &self,
        actions: Vec<Action>,
        role: SigningRole,
        opts: &TxOptions,
    ) -> OracleResult<Checksum256> {
        let mut tx = SignedTransaction::new(Transaction::new(actions, opts));
        self.sign(&mut tx, role, &opts.chain_id)?;
        self.broadcast(&tx.pack()).await
    }

    /// Co-signs a transaction received from a client with the `role` key and
    /// broadcasts it.
    pub async fn cosign_and_broadcast(
        &self,
        mut tx: SignedTransaction,
        role: SigningRole,
        chain_id: &Checksum256,
    ) -> OracleResult<Checksum256> {
        self.sign(&mut tx, role, chain_id)?;
        self.broadcast(&tx.pack()).await
    }

    pub async fn broadcast(&self, packed: &PackedTransaction) -> OracleResult<Checksum256> {
        let tx_id = packed.id();
        let client = &self.client;
        let metrics = &self.metrics;
        debug!("Broadcasting transaction {}", tx_id);

        let result = retry_with_timeout(&self.retry_policy, || async move {
            match client.push_transaction(packed).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_duplicate_transaction() => {
                    info!("Transaction {} was already applied", tx_id);
                    metrics.duplicate_broadcasts.inc();
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })
        .await;

        match result {
            Ok(()) => Ok(tx_id),
            Err(e) => {
                warn!("Failed to broadcast transaction {}: {}", tx_id, e);
                Err(OracleError::BroadcastFailed {
                    tx_id,
                    reason: e.to_string(),
                })
            }
        }
    }
}
