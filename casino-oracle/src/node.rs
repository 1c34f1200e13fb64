// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::bonus::BonusManager;
use crate::broadcaster::TransactionBroadcaster;
use crate::broker::{topic_name, EventListener, EventMessage, WsEventListener};
use crate::chain_client::ChainClientInner;
use crate::chain_state::ChainStateCache;
use crate::config::CasinoNodeConfig;
use crate::metrics::OracleMetrics;
use crate::server::{handler::CasinoRequestHandler, run_server};
use crate::signidice::SignidiceProcessor;
use anyhow::anyhow;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const EVENT_CHANNEL_SIZE: usize = 1000;

/// Validates the config, starts every component and returns a handle that
/// resolves once the node has shut down. Cancelling `cancel` stops the node,
/// and so does any component exiting on its own.
pub async fn run_casino_node(
    config: CasinoNodeConfig,
    prometheus_registry: prometheus::Registry,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
    let metrics = Arc::new(OracleMetrics::new(&prometheus_registry));
    let server_config = config.validate(metrics.clone()).await?;

    let broadcaster = Arc::new(TransactionBroadcaster::new(
        server_config.chain_client.clone(),
        server_config.keys,
        server_config.retry_policy,
        metrics.clone(),
    ));
    let chain_state = Arc::new(ChainStateCache::new(
        server_config.chain_client,
        metrics.clone(),
    ));
    let bonus = Arc::new(BonusManager::new(
        broadcaster.clone(),
        chain_state.clone(),
        server_config.casino_account,
        server_config.bonus_admin_account,
    ));
    let handler = CasinoRequestHandler::new(
        broadcaster.clone(),
        bonus,
        server_config.deposit_policy,
        metrics.clone(),
    );
    let processor = Arc::new(SignidiceProcessor::new(
        broadcaster,
        chain_state,
        server_config.rsa_key,
        server_config.signidice_account,
        server_config.offset_store,
        metrics.clone(),
    ));

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let listener = Arc::new(WsEventListener::new(server_config.broker, events_tx));

    let socket_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        server_config.server_port,
    );
    Ok(tokio::spawn(run_components(
        NodeComponents {
            handler,
            processor,
            listener,
            events: events_rx,
            topic: topic_name(server_config.topic_id),
            initial_offset: server_config.initial_offset,
            socket_address,
            metrics,
        },
        cancel,
    )))
}

pub(crate) struct NodeComponents<P, L> {
    pub handler: CasinoRequestHandler<P>,
    pub processor: Arc<SignidiceProcessor<P>>,
    pub listener: Arc<L>,
    pub events: mpsc::Receiver<EventMessage>,
    pub topic: String,
    pub initial_offset: u64,
    pub socket_address: SocketAddr,
    pub metrics: Arc<OracleMetrics>,
}

pub(crate) async fn run_components<P, L>(
    components: NodeComponents<P, L>,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    P: ChainClientInner + 'static,
    L: EventListener + 'static,
{
    let NodeComponents {
        handler,
        processor,
        listener,
        events,
        topic,
        initial_offset,
        socket_address,
        metrics,
    } = components;

    let listener_cancel = cancel.clone();
    let run_listener = listener.clone();
    let mut listener_handle =
        tokio::spawn(async move { run_listener.run(listener_cancel).await });
    let mut processor_handle = tokio::spawn(processor.run(events, cancel.clone()));
    let mut server_handle = run_server(&socket_address, handler, metrics, cancel.clone());

    match listener.subscribe(&topic, initial_offset).await {
        Ok(true) => info!("Subscribed to {} from offset {}", topic, initial_offset),
        Ok(false) => {
            cancel.cancel();
            return Err(anyhow!("Broker refused subscription to {}", topic));
        }
        Err(e) => {
            cancel.cancel();
            return Err(anyhow!("Failed to subscribe to {}: {}", topic, e));
        }
    }

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            info!("Shutdown requested");
            Ok(())
        }
        result = &mut listener_handle => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!("Broker listener stopped: {}", e)),
            Err(e) => Err(anyhow!("Broker listener panicked: {}", e)),
        },
        result = &mut processor_handle => match result {
            Ok(()) => Err(anyhow!("Signidice processor stopped")),
            Err(e) => Err(anyhow!("Signidice processor panicked: {}", e)),
        },
        result = &mut server_handle => match result {
            Ok(Ok(())) => Err(anyhow!("HTTP server stopped")),
            Ok(Err(e)) => Err(anyhow!("HTTP server failed: {}", e)),
            Err(e) => Err(anyhow!("HTTP server panicked: {}", e)),
        },
    };
    cancel.cancel();
    if let Err(e) = &result {
        error!("Stopping casino oracle: {}", e);
    }
    // let the processor finish committing its current message
    if !processor_handle.is_finished() {
        let _ = processor_handle.await;
    }
    if !server_handle.is_finished() {
        let _ = server_handle.await;
    }
    info!("Casino oracle stopped");
    result
}
