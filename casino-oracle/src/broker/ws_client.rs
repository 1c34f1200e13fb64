// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! WebSocket implementation of [`EventListener`].
//!
//! Requests are JSON objects `{"id", "method", "params"}` answered by
//! `{"id", "result"}` or `{"id", "error"}`. Objects without an id are event
//! notifications whose `params` hold an [`EventMessage`].

use super::{topic_name, BrokerError, EventListener, EventMessage};
use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingReply = oneshot::Sender<Result<Value, BrokerError>>;

#[derive(Clone, Debug)]
pub struct WsListenerConfig {
    pub url: String,
    pub token: Option<String>,
    pub reconnection_attempts: u32,
    pub reconnection_delay: Duration,
}

#[derive(Debug, Serialize)]
struct WsRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct WsIncoming {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<WsRpcError>,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WsRpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Clone, Copy, Debug)]
struct Subscription {
    // offset to resume from after a reconnect
    next_offset: u64,
    confirmed: bool,
}

pub struct WsEventListener {
    config: WsListenerConfig,
    events_tx: Mutex<Option<mpsc::Sender<EventMessage>>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    request_id: AtomicU64,
    connected: watch::Sender<bool>,
}

impl WsEventListener {
    pub fn new(config: WsListenerConfig, events_tx: mpsc::Sender<EventMessage>) -> Self {
        Self {
            config,
            events_tx: Mutex::new(Some(events_tx)),
            outgoing: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            request_id: AtomicU64::new(1),
            connected: watch::channel(false).0,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn wait_connected(&self) -> Result<(), BrokerError> {
        let mut rx = self.connected.subscribe();
        let result =
            match tokio::time::timeout(REQUEST_TIMEOUT, rx.wait_for(|connected| *connected)).await
            {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(_)) => Err(BrokerError::Closed),
                Err(_) => Err(BrokerError::NotConnected),
            };
        result
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, BrokerError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let text = serde_json::to_string(&WsRequest { id, method, params })
            .map_err(|e| BrokerError::Protocol(e.to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let outgoing = self
                .outgoing
                .lock()
                .unwrap()
                .clone()
                .ok_or(BrokerError::NotConnected)?;
            self.pending.lock().unwrap().insert(id, reply_tx);
            if outgoing.send(Message::text(text)).is_err() {
                self.pending.lock().unwrap().remove(&id);
                return Err(BrokerError::Closed);
            }
        }
        debug!("Sent broker request {} ({})", id, method);

        match tokio::time::timeout(REQUEST_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrokerError::Closed),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(BrokerError::Timeout)
            }
        }
    }

    async fn send_subscribe(&self, topic: &str, offset: u64) -> Result<bool, BrokerError> {
        let result = self
            .request("subscribe", json!({ "topic": topic, "offset": offset }))
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    // Authenticates and restores the subscriptions of a previous connection.
    async fn setup_connection(&self) -> Result<(), BrokerError> {
        if let Some(token) = &self.config.token {
            let accepted = self.request("auth", json!({ "token": token })).await?;
            if accepted.as_bool() == Some(false) {
                return Err(BrokerError::Rpc {
                    code: 0,
                    message: "authentication rejected".to_string(),
                });
            }
        }
        let restore: Vec<(String, u64)> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, sub)| sub.confirmed)
            .map(|(topic, sub)| (topic.clone(), sub.next_offset))
            .collect();
        for (topic, offset) in restore {
            info!("Resubscribing to {} from offset {}", topic, offset);
            if !self.send_subscribe(&topic, offset).await? {
                warn!("Broker refused resubscription to {}", topic);
            }
        }
        Ok(())
    }

    fn handle_response(&self, id: u64, incoming: WsIncoming) {
        let Some(reply) = self.pending.lock().unwrap().remove(&id) else {
            debug!("Dropping broker response to unknown request {}", id);
            return;
        };
        let result = match incoming.error {
            Some(err) => Err(BrokerError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(incoming.result.unwrap_or(Value::Null)),
        };
        let _ = reply.send(result);
    }

    async fn handle_text(&self, text: &str) -> Result<(), BrokerError> {
        let incoming: WsIncoming =
            serde_json::from_str(text).map_err(|e| BrokerError::Protocol(e.to_string()))?;
        if let Some(id) = incoming.id {
            self.handle_response(id, incoming);
            return Ok(());
        }
        let Some(params) = incoming.params else {
            return Ok(());
        };
        let message: EventMessage = match serde_json::from_value(params) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping malformed broker notification: {}", e);
                return Ok(());
            }
        };
        match message.offset.checked_add(1) {
            Some(next_offset) => {
                let mut subscriptions = self.subscriptions.lock().unwrap();
                for event in &message.events {
                    if let Some(sub) = subscriptions.get_mut(&topic_name(event.event_type)) {
                        sub.next_offset = sub.next_offset.max(next_offset);
                    }
                }
            }
            None => warn!(
                "Event message offset {} cannot advance, keeping resume offsets",
                message.offset
            ),
        }
        debug!(
            "Received event message at offset {} with {} events",
            message.offset,
            message.events.len()
        );
        let events_tx = self
            .events_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or(BrokerError::ConsumerClosed)?;
        events_tx
            .send(message)
            .await
            .map_err(|_| BrokerError::ConsumerClosed)
    }

    async fn read_loop<S>(
        &self,
        stream: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), BrokerError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = self.handle_text(&text).await {
                        match e {
                            BrokerError::Protocol(_) => warn!("Broker sent garbage: {}", e),
                            e => return Err(e),
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Err(BrokerError::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(BrokerError::Connection(e.to_string())),
            }
        }
    }

    async fn serve_connection(
        &self,
        ws: WsStream,
        cancel: &CancellationToken,
    ) -> Result<(), BrokerError> {
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        *self.outgoing.lock().unwrap() = Some(out_tx);

        let writer = async move {
            while let Some(message) = out_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!("Failed to write to broker: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        };
        let reader = self.read_loop(&mut stream, cancel);
        let setup = self.setup_connection();
        tokio::pin!(writer, reader, setup);

        let mut setup_done = false;
        let result = loop {
            tokio::select! {
                result = &mut reader => break result,
                _ = &mut writer => break Err(BrokerError::Closed),
                outcome = &mut setup, if !setup_done => {
                    setup_done = true;
                    if let Err(e) = outcome {
                        break Err(e);
                    }
                    self.connected.send_replace(true);
                    info!("Connected to broker at {}", self.config.url);
                }
            }
        };

        self.connected.send_replace(false);
        *self.outgoing.lock().unwrap() = None;
        for (_, reply) in self.pending.lock().unwrap().drain() {
            let _ = reply.send(Err(BrokerError::Closed));
        }
        result
    }
}

#[async_trait]
impl EventListener for WsEventListener {
    async fn subscribe(&self, topic: &str, offset: u64) -> Result<bool, BrokerError> {
        self.subscriptions.lock().unwrap().insert(
            topic.to_string(),
            Subscription {
                next_offset: offset,
                confirmed: false,
            },
        );
        self.wait_connected().await?;
        let accepted = self.send_subscribe(topic, offset).await?;
        if accepted {
            if let Some(sub) = self.subscriptions.lock().unwrap().get_mut(topic) {
                sub.confirmed = true;
            }
            info!("Subscribed to {} from offset {}", topic, offset);
        }
        Ok(accepted)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<bool, BrokerError> {
        self.subscriptions.lock().unwrap().remove(topic);
        if !self.is_connected() {
            return Ok(true);
        }
        let result = self
            .request("unsubscribe", json!({ "topic": topic }))
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), BrokerError> {
        let mut failures = 0u32;
        let result = loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                connected = connect_async(self.config.url.as_str()) => connected,
            };
            match connected {
                Ok((ws, _)) => {
                    failures = 0;
                    match self.serve_connection(ws, &cancel).await {
                        Ok(()) => break Ok(()),
                        Err(BrokerError::ConsumerClosed) => break Err(BrokerError::ConsumerClosed),
                        Err(e) => warn!("Lost broker connection: {}", e),
                    }
                }
                Err(e) => warn!("Failed to connect to broker {}: {}", self.config.url, e),
            }

            failures += 1;
            if failures > self.config.reconnection_attempts {
                error!("Giving up on broker after {} attempts", failures);
                break Err(BrokerError::ReconnectionFailed(self.config.reconnection_attempts));
            }
            info!(
                "Reconnecting to broker in {:?} (attempt {})",
                self.config.reconnection_delay, failures
            );
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = tokio::time::sleep(self.config.reconnection_delay) => {}
            }
        };
        // closes the consumer's channel
        self.events_tx.lock().unwrap().take();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casino_oracle_config::local_ip_utils::{get_available_port, localhost_for_testing};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    type ServerStream = WebSocketStream<TcpStream>;

    async fn start_fake_broker() -> (TcpListener, String) {
        let host = localhost_for_testing();
        let port = get_available_port(&host);
        let listener = TcpListener::bind(format!("{}:{}", host, port)).await.unwrap();
        (listener, format!("ws://{}:{}", host, port))
    }

    async fn accept(listener: &TcpListener) -> ServerStream {
        let (tcp, _) = listener.accept().await.unwrap();
        accept_async(tcp).await.unwrap()
    }

    async fn next_request(ws: &mut ServerStream) -> Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    async fn reply(ws: &mut ServerStream, id: &Value, result: Value) {
        let body = json!({ "id": id, "result": result }).to_string();
        ws.send(Message::text(body)).await.unwrap();
    }

    async fn notify(ws: &mut ServerStream, offset: u64) {
        let body = json!({
            "method": "event",
            "params": {
                "offset": offset,
                "events": [{
                    "offset": offset,
                    "sender": "dicegame1111",
                    "casino_id": "1",
                    "game_id": "2",
                    "req_id": "77",
                    "event_type": 0,
                    "data": {"digest": "00"}
                }]
            }
        })
        .to_string();
        ws.send(Message::text(body)).await.unwrap();
    }

    fn listener_for(
        url: String,
        attempts: u32,
    ) -> (Arc<WsEventListener>, mpsc::Receiver<EventMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let config = WsListenerConfig {
            url,
            token: Some("secret".to_string()),
            reconnection_attempts: attempts,
            reconnection_delay: Duration::from_millis(50),
        };
        (Arc::new(WsEventListener::new(config, tx)), rx)
    }

    #[tokio::test]
    async fn test_subscribe_and_receive_events() {
        let (server, url) = start_fake_broker().await;
        let (listener, mut events) = listener_for(url, 0);
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let listener = listener.clone();
            let cancel = cancel.clone();
            async move { listener.run(cancel).await }
        });

        let broker = tokio::spawn(async move {
            let mut ws = accept(&server).await;
            let auth = next_request(&mut ws).await;
            assert_eq!(auth["method"], "auth");
            assert_eq!(auth["params"]["token"], "secret");
            reply(&mut ws, &auth["id"], json!(true)).await;

            let subscribe = next_request(&mut ws).await;
            assert_eq!(subscribe["method"], "subscribe");
            assert_eq!(subscribe["params"], json!({"topic": "event_0", "offset": 5}));
            reply(&mut ws, &subscribe["id"], json!(true)).await;
            notify(&mut ws, 5).await;
            ws
        });

        assert!(listener.subscribe(&topic_name(0), 5).await.unwrap());
        let message = events.recv().await.unwrap();
        assert_eq!(message.offset, 5);
        assert_eq!(message.events[0].request_id, 77);

        let _ws = broker.await.unwrap();
        cancel.cancel();
        assert_eq!(run.await.unwrap(), Ok(()));
        // the listener drops its sender on exit
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_resubscribes_after_reconnect() {
        let (server, url) = start_fake_broker().await;
        let (listener, mut events) = listener_for(url, 3);
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let listener = listener.clone();
            let cancel = cancel.clone();
            async move { listener.run(cancel).await }
        });

        let broker = tokio::spawn(async move {
            let mut ws = accept(&server).await;
            let auth = next_request(&mut ws).await;
            reply(&mut ws, &auth["id"], json!(true)).await;
            let subscribe = next_request(&mut ws).await;
            reply(&mut ws, &subscribe["id"], json!(true)).await;
            notify(&mut ws, 8).await;
            ws.close(None).await.unwrap();
            drop(ws);

            let mut ws = accept(&server).await;
            let auth = next_request(&mut ws).await;
            reply(&mut ws, &auth["id"], json!(true)).await;
            let resubscribe = next_request(&mut ws).await;
            reply(&mut ws, &resubscribe["id"], json!(true)).await;
            (resubscribe, ws)
        });

        assert!(listener.subscribe("event_0", 8).await.unwrap());
        assert_eq!(events.recv().await.unwrap().offset, 8);

        let (resubscribe, _ws) = broker.await.unwrap();
        assert_eq!(resubscribe["method"], "subscribe");
        assert_eq!(resubscribe["params"], json!({"topic": "event_0", "offset": 9}));

        cancel.cancel();
        assert_eq!(run.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_gives_up_when_broker_is_unreachable() {
        let host = localhost_for_testing();
        let port = get_available_port(&host);
        let (listener, mut events) = listener_for(format!("ws://{}:{}", host, port), 2);

        let result = listener.run(CancellationToken::new()).await;
        assert_eq!(result, Err(BrokerError::ReconnectionFailed(2)));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_without_connection_times_out() {
        tokio::time::pause();
        let (listener, _events) = listener_for("ws://127.0.0.1:1".to_string(), 0);
        let err = listener.subscribe("event_0", 0).await.unwrap_err();
        assert_eq!(err, BrokerError::NotConnected);
    }

    #[tokio::test]
    async fn test_last_possible_offset_keeps_resume_offset() {
        let (listener, mut events) = listener_for("ws://127.0.0.1:1".to_string(), 0);
        listener.subscriptions.lock().unwrap().insert(
            "event_0".to_string(),
            Subscription {
                next_offset: 40,
                confirmed: true,
            },
        );
        let body = json!({
            "method": "event",
            "params": {
                "offset": u64::MAX,
                "events": [{
                    "offset": u64::MAX,
                    "sender": "dicegame1111",
                    "casino_id": 1,
                    "game_id": 2,
                    "req_id": 3,
                    "event_type": 0
                }]
            }
        })
        .to_string();

        listener.handle_text(&body).await.unwrap();

        assert_eq!(events.recv().await.unwrap().offset, u64::MAX);
        assert_eq!(
            listener.subscriptions.lock().unwrap()["event_0"].next_offset,
            40
        );
    }
}
