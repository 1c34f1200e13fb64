// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Client side of the platform event broker.

use async_trait::async_trait;
use daobet_types::Name;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use tokio_util::sync::CancellationToken;

pub mod ws_client;

pub use ws_client::{WsEventListener, WsListenerConfig};

/// Broker topic carrying events of the given type.
pub fn topic_name(topic_id: u32) -> String {
    format!("event_{}", topic_id)
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub offset: u64,
    /// Contract that emitted the event.
    pub sender: Name,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub casino_id: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub game_id: u64,
    #[serde(rename = "req_id")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub request_id: u64,
    pub event_type: u32,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Ordered batch of events delivered by the broker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub offset: u64,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("not connected to the broker")]
    NotConnected,
    #[error("connection closed")]
    Closed,
    #[error("request timed out")]
    Timeout,
    #[error("broker error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed broker message: {0}")]
    Protocol(String),
    #[error("event consumer is gone")]
    ConsumerClosed,
    #[error("gave up after {0} reconnection attempts")]
    ReconnectionFailed(u32),
}

/// Source of broker events. Messages are delivered in order on the channel
/// the listener was created with.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn subscribe(&self, topic: &str, offset: u64) -> Result<bool, BrokerError>;

    async fn unsubscribe(&self, topic: &str) -> Result<bool, BrokerError>;

    /// Maintains the broker connection until `cancel` fires or reconnection
    /// gives up.
    async fn run(&self, cancel: CancellationToken) -> Result<(), BrokerError>;
}
