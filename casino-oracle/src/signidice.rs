// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Second half of the signidice protocol.
//!
//! For every broker event the oracle signs the revealed digest with its RSA
//! key and answers the game contract with a `sgdicesecond` action. Events of
//! one message are handled by independent tasks; the offset checkpoint moves
//! past the message as soon as its tasks are spawned, without waiting for
//! them to finish.

use crate::broadcaster::TransactionBroadcaster;
use crate::broker::{Event, EventMessage};
use crate::chain_client::ChainClientInner;
use crate::chain_state::ChainStateCache;
use crate::error::{OracleError, OracleResult};
use crate::key_bag::SigningRole;
use crate::metrics::OracleMetrics;
use crate::offset_store::OffsetStore;
use crate::retry::{retry_with_timeout, RetryPolicy};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use daobet_types::{
    Action, Checksum256, Decoder, Encoder, Name, Pack, PermissionLevel, TypesResult, Unpack,
};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const SGDICE_SECOND: Name = Name::from_static("sgdicesecond");
pub const SIGNIDICE_PERMISSION: Name = Name::from_static("signidice");

/// Data of the `sgdicesecond` action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SgdiceSecondData {
    pub req_id: u64,
    /// Base64 RSA signature of the event digest.
    pub sign: String,
}

impl Pack for SgdiceSecondData {
    fn pack(&self, enc: &mut Encoder) {
        self.req_id.pack(enc);
        self.sign.pack(enc);
    }
}

impl Unpack for SgdiceSecondData {
    fn unpack(dec: &mut Decoder<'_>) -> TypesResult<Self> {
        Ok(Self {
            req_id: u64::unpack(dec)?,
            sign: String::unpack(dec)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SignidicePayload {
    digest: Checksum256,
}

/// PKCS#1 v1.5 signature over a SHA-256 digest, base64 encoded.
pub fn rsa_sign(digest: &Checksum256, key: &RsaPrivateKey) -> OracleResult<String> {
    let signature = key
        .sign(Pkcs1v15Sign::new::<Sha256>(), digest.as_bytes())
        .map_err(|e| OracleError::SigningFailed(e.to_string()))?;
    Ok(BASE64.encode(signature))
}

pub struct SignidiceProcessor<P> {
    broadcaster: Arc<TransactionBroadcaster<P>>,
    chain_state: Arc<ChainStateCache<P>>,
    rsa_key: Arc<RsaPrivateKey>,
    signidice_account: Name,
    retry_policy: RetryPolicy,
    offset_store: OffsetStore,
    metrics: Arc<OracleMetrics>,
}

impl<P> SignidiceProcessor<P>
where
    P: ChainClientInner + 'static,
{
    pub fn new(
        broadcaster: Arc<TransactionBroadcaster<P>>,
        chain_state: Arc<ChainStateCache<P>>,
        rsa_key: Arc<RsaPrivateKey>,
        signidice_account: Name,
        offset_store: OffsetStore,
        metrics: Arc<OracleMetrics>,
    ) -> Self {
        let retry_policy = *broadcaster.retry_policy();
        Self {
            broadcaster,
            chain_state,
            rsa_key,
            signidice_account,
            retry_policy,
            offset_store,
            metrics,
        }
    }

    /// Consumes event messages until the channel closes or `cancel` fires.
    /// Tasks still in flight at exit are left running.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<EventMessage>,
        cancel: CancellationToken,
    ) {
        info!("Starting signidice processor");
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Signidice processor cancelled");
                    break;
                }
                message = events.recv() => message,
            };
            let Some(message) = message else {
                info!("Event channel closed, stopping signidice processor");
                break;
            };
            self.dispatch(message).await;
        }
    }

    /// Spawns one task per event, then commits `message.offset + 1`.
    pub async fn dispatch(self: &Arc<Self>, message: EventMessage) {
        if message.events.is_empty() {
            debug!("Empty event message at offset {}", message.offset);
            return;
        }
        debug!(
            "Dispatching {} events from message {}",
            message.events.len(),
            message.offset
        );
        for event in message.events {
            let processor = self.clone();
            tokio::spawn(async move { processor.handle_event(event).await });
        }

        let Some(next_offset) = message.offset.checked_add(1) else {
            warn!(
                "Message offset {} cannot advance, keeping the committed offset",
                message.offset
            );
            return;
        };
        match self.offset_store.write(next_offset).await {
            Ok(()) => self.metrics.last_committed_offset.set(next_offset as i64),
            Err(e) => error!("Failed to commit offset {}: {}", next_offset, e),
        }
    }

    async fn handle_event(&self, event: Event) {
        let started = Instant::now();
        self.answer_event(event).await;
        self.metrics
            .signidice_event_ms
            .observe(started.elapsed().as_millis() as f64);
    }

    async fn answer_event(&self, event: Event) {
        self.metrics.signidice_events_received.inc();
        let digest = match serde_json::from_value::<SignidicePayload>(event.data.clone()) {
            Ok(payload) => payload.digest,
            Err(e) => {
                warn!(
                    "Dropping event {} with garbled payload, req_id: {}, error: {}",
                    event.offset, event.request_id, e
                );
                self.metrics
                    .signidice_events_dropped
                    .with_label_values(&["garbled_payload"])
                    .inc();
                return;
            }
        };

        match self.process_event(&event, &digest).await {
            Ok(tx_id) => {
                self.metrics.signidice_broadcast_ok.inc();
                info!(
                    "Successfully sent signidice_part_2 txn, req_id: {}, txid: {}",
                    event.request_id, tx_id
                );
            }
            Err(e) => {
                self.metrics.signidice_broadcast_failed.inc();
                error!(
                    "Failed to send signidice_part_2 txn, req_id: {}, error: {}",
                    event.request_id, e
                );
            }
        }
    }

    /// Signs `digest` and pushes the answer to the contract that emitted
    /// `event`. Returns the id of the pushed transaction.
    pub async fn process_event(
        &self,
        event: &Event,
        digest: &Checksum256,
    ) -> OracleResult<Checksum256> {
        let sign = rsa_sign(digest, &self.rsa_key)?;
        debug!("Signed digest {} for req_id {}", digest, event.request_id);

        let chain_state = &self.chain_state;
        let opts = retry_with_timeout(&self.retry_policy, || chain_state.get_tx_options())
            .await
            .map_err(|e| OracleError::ChainStateUnavailable(e.to_string()))?;

        let action = Action::new(
            event.sender,
            SGDICE_SECOND,
            vec![PermissionLevel::new(
                self.signidice_account,
                SIGNIDICE_PERMISSION,
            )],
            &SgdiceSecondData {
                req_id: event.request_id,
                sign,
            },
        );
        self.broadcaster
            .sign_and_broadcast(vec![action], SigningRole::Signidice, &opts)
            .await
    }
}
