//! WebSocket JSON-RPC transport to the chain server.
//!
//! # Responsibilities
//! - Dial `ws://` endpoints with a connect timeout
//! - Authenticate with the `authenticate` method
//! - Multiplex concurrent calls over one socket by request id
//! - Report session end through `wait_for_shutdown`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::chain::client::{ChainCallError, ChainClient, ChainCredentials, ChainTransport, DialError};
use crate::rpc::types::{RpcRequest, RpcResponse};

type Pending = Arc<DashMap<u64, oneshot::Sender<Result<Value, ChainCallError>>>>;
type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials [`WsChainClient`] sessions.
pub struct WsTransport {
    connect_timeout: Duration,
    request_timeout: Duration,
    next_session: AtomicU64,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
            next_session: AtomicU64::new(0),
        }
    }
}

/// Check that `address` is a WebSocket URL.
pub fn parse_address(address: &str) -> Result<Url, DialError> {
    let url = Url::parse(address).map_err(|e| DialError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" => Ok(url),
        other => Err(DialError::InvalidAddress {
            address: address.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn classify_connect_error(address: &str, username: &str, error: tungstenite::Error) -> DialError {
    if let tungstenite::Error::Http(response) = &error {
        if response.status() == 401 || response.status() == 403 {
            return DialError::Auth(username.to_string());
        }
    }
    DialError::Connect {
        address: address.to_string(),
        reason: error.to_string(),
    }
}

#[async_trait]
impl ChainTransport for WsTransport {
    async fn dial(
        &self,
        address: &str,
        credentials: &ChainCredentials,
    ) -> Result<Arc<dyn ChainClient>, DialError> {
        let url = parse_address(address)?;

        tracing::debug!(address, "Dialing chain server");
        let socket = match timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Err(_) => return Err(DialError::Timeout(self.connect_timeout)),
            Ok(Err(e)) => return Err(classify_connect_error(address, &credentials.username, e)),
            Ok(Ok((socket, _response))) => socket,
        };

        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let client = WsChainClient::spawn(id, address.to_string(), socket, self.request_timeout);

        if !credentials.username.is_empty() {
            let params = vec![json!(credentials.username), json!(credentials.password)];
            match client.call("authenticate", params).await {
                Ok(_) => {}
                Err(ChainCallError::Rpc { .. }) => {
                    client.disconnect();
                    return Err(DialError::Auth(credentials.username.clone()));
                }
                Err(e) => {
                    client.disconnect();
                    return Err(DialError::Connect {
                        address: address.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(address, session = id, "Chain server session established");
        Ok(client)
    }
}

/// A multiplexed JSON-RPC session over one WebSocket.
pub struct WsChainClient {
    id: u64,
    address: String,
    outbound: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_request: AtomicU64,
    connected: Arc<AtomicBool>,
    closed: watch::Receiver<bool>,
    stop: watch::Sender<bool>,
    request_timeout: Duration,
}

impl WsChainClient {
    fn spawn(id: u64, address: String, socket: Socket, request_timeout: Duration) -> Arc<Self> {
        let (mut sink, mut source) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (closed_tx, closed) = watch::channel(false);
        let (stop, mut stop_rx) = watch::channel(false);
        let pending: Pending = Arc::new(DashMap::new());
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::debug!(session = id, error = %e, "Chain server write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_pending = pending.clone();
        let reader_connected = connected.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = source.next() => frame,
                    _ = stop_rx.changed() => break,
                };
                match frame {
                    Some(Ok(Message::Text(text))) => dispatch(&reader_pending, text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => dispatch(&reader_pending, text),
                        Err(_) => tracing::debug!(session = id, "Ignoring non-UTF-8 frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(session = id, error = %e, "Chain server read failed");
                        break;
                    }
                }
            }

            reader_connected.store(false, Ordering::SeqCst);
            fail_pending(&reader_pending);
            let _ = closed_tx.send(true);
            tracing::debug!(session = id, "Chain server session closed");
        });

        Arc::new(Self {
            id,
            address,
            outbound,
            pending,
            next_request: AtomicU64::new(0),
            connected,
            closed,
            stop,
            request_timeout,
        })
    }
}

fn dispatch(pending: &Pending, text: &str) {
    let response: RpcResponse = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed chain server message");
            return;
        }
    };

    let Some(id) = response.id.as_u64() else {
        tracing::trace!("Chain server notification");
        return;
    };
    if let Some((_, waiter)) = pending.remove(&id) {
        let result = response.into_result().map_err(|e| ChainCallError::Rpc {
            code: e.code,
            message: e.message,
        });
        let _ = waiter.send(result);
    }
}

fn fail_pending(pending: &Pending) {
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, waiter)) = pending.remove(&id) {
            let _ = waiter.send(Err(ChainCallError::Disconnected));
        }
    }
}

#[async_trait]
impl ChainClient for WsChainClient {
    fn id(&self) -> u64 {
        self.id
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ChainCallError> {
        if !self.is_connected() {
            return Err(ChainCallError::Disconnected);
        }

        let id = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        let text = serde_json::to_string(&RpcRequest::new(id, method, params))
            .map_err(|e| ChainCallError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        // The reader may have drained `pending` just before the insert.
        if !self.is_connected() || self.outbound.send(Message::text(text)).is_err() {
            self.pending.remove(&id);
            return Err(ChainCallError::Disconnected);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ChainCallError::Disconnected),
            Err(_) => {
                self.pending.remove(&id);
                Err(ChainCallError::Timeout(self.request_timeout))
            }
        }
    }

    fn disconnect(&self) {
        self.stop.send_replace(true);
        let _ = self.outbound.send(Message::Close(None));
    }

    async fn wait_for_shutdown(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|c| *c).await;
    }
}

impl Drop for WsChainClient {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}
