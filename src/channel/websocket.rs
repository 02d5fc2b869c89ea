//! ShareDB subscription channel over a WebSocket.
//!
//! One reader task dispatches snapshot replies to pending subscriptions; one
//! writer task owns the sink. Both stop when the connection drops or the
//! channel is closed, and every pending subscription then fails with
//! [`ChannelError::Disconnected`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{ClientMessage, ServerMessage, Snapshot};
use super::{Collection, SubscriptionChannel};
use crate::config::Config;
use crate::credential::{Credential, cookie_value};
use crate::error::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Key = (Collection, String);
type Waiter = oneshot::Sender<Result<Snapshot, ChannelError>>;

/// Connection state published by the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, subscriptions are served
    Connected,
    /// Socket closed, the channel is unusable
    Disconnected,
}

/// Pending and loaded subscriptions
#[derive(Default)]
struct Registry {
    pending: HashMap<Key, Vec<Waiter>>,
    loaded: HashMap<Key, Snapshot>,
    closed: bool,
}

impl Registry {
    fn complete(&mut self, key: Key, outcome: Result<Snapshot, ChannelError>) {
        let waiters = self.pending.remove(&key).unwrap_or_default();
        if let Ok(snapshot) = &outcome {
            self.loaded.insert(key, snapshot.clone());
        }
        for waiter in waiters {
            // The subscriber may have given up (timeout); nothing to do then.
            let _ = waiter.send(outcome.clone());
        }
    }

    fn fail_all(&mut self) {
        self.closed = true;
        for (_, waiters) in self.pending.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(ChannelError::Disconnected));
            }
        }
    }
}

/// Subscription channel backed by a ShareDB WebSocket connection
pub struct WebSocketChannel {
    outgoing: mpsc::UnboundedSender<Message>,
    registry: Arc<Mutex<Registry>>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl WebSocketChannel {
    /// Connect to `endpoints.sync_url`, authenticated with `credential`
    pub async fn connect(config: &Config, credential: &Credential) -> Result<Self, ChannelError> {
        let cookie = cookie_value(&config.workspace.app_id, credential);
        Self::connect_with(&config.endpoints.sync_url, &cookie, &config.endpoints.origin).await
    }

    /// Connect to `url` sending the given `Cookie` and `Origin` headers
    pub async fn connect_with(url: &str, cookie: &str, origin: &str) -> Result<Self, ChannelError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(cookie)
                .map_err(|e| ChannelError::ConnectionFailed(format!("invalid cookie: {}", e)))?,
        );
        headers.insert(
            header::ORIGIN,
            HeaderValue::from_str(origin)
                .map_err(|e| ChannelError::ConnectionFailed(format!("invalid origin: {}", e)))?,
        );

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        info!(%url, "sync channel connected");

        let (sink, stream) = ws_stream.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Connected);
        let registry = Arc::new(Mutex::new(Registry::default()));
        let cancel = CancellationToken::new();

        tokio::spawn(write_loop(sink, outgoing_rx, cancel.clone()));
        tokio::spawn(read_loop(stream, registry.clone(), state_tx, cancel.clone()));

        let hello = ClientMessage::Handshake { id: None }
            .to_json()
            .map_err(|e| ChannelError::Protocol(e.to_string()))?;
        outgoing
            .send(Message::Text(hello.into()))
            .map_err(|_| ChannelError::Disconnected)?;

        Ok(Self {
            outgoing,
            registry,
            state,
            cancel,
        })
    }

    /// Watch the connection state
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the connection has dropped
    pub async fn disconnected(&self) {
        let mut state = self.state.clone();
        // A dropped sender also means the reader is gone.
        let _ = state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await;
    }

    /// Close the connection; pending subscriptions fail with `Disconnected`
    pub fn close(&self) {
        self.cancel.cancel();
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send_subscribe(&self, collection: Collection, id: &str) -> Result<(), ChannelError> {
        let json = ClientMessage::subscribe(collection.as_str(), id)
            .to_json()
            .map_err(|e| ChannelError::Protocol(e.to_string()))?;
        self.outgoing
            .send(Message::Text(json.into()))
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl SubscriptionChannel for WebSocketChannel {
    async fn subscribe(&self, collection: Collection, id: &str) -> Result<Snapshot, ChannelError> {
        let key = (collection, id.to_string());
        let (tx, rx) = oneshot::channel();

        let first = {
            let mut registry = self.registry();
            if registry.closed {
                return Err(ChannelError::Disconnected);
            }
            if let Some(snapshot) = registry.loaded.get(&key) {
                return Ok(snapshot.clone());
            }
            let waiters = registry.pending.entry(key.clone()).or_default();
            waiters.push(tx);
            waiters.len() == 1
        };

        if first {
            debug!(%collection, %id, "subscribing");
            if let Err(e) = self.send_subscribe(collection, id) {
                // Later callers joined this request; fail them too.
                self.registry().complete(key, Err(e));
            }
        }

        rx.await.map_err(|_| ChannelError::Disconnected)?
    }
}


async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            msg = outgoing.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = sink.send(msg).await {
                        warn!(error = %e, "sync channel write failed");
                        cancel.cancel();
                        break;
                    }
                }
                None => break,
            }
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    registry: Arc<Mutex<Registry>>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                    Ok(msg) => dispatch(&registry, msg),
                    Err(e) => warn!(error = %e, "ignoring unparseable frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("sync channel closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "sync channel read failed");
                    break;
                }
            }
        }
    }

    cancel.cancel();
    registry
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .fail_all();
    let _ = state.send(ConnectionState::Disconnected);
}

fn dispatch(registry: &Mutex<Registry>, msg: ServerMessage) {
    match msg {
        ServerMessage::Init { protocol, id } => {
            debug!(?protocol, ?id, "server greeting");
        }
        ServerMessage::Handshake { id, error } => match error {
            Some(e) => warn!(code = %e.code, message = %e.message, "handshake refused"),
            None => debug!(?id, "handshake complete"),
        },
        ServerMessage::Subscribe { c, d, data, error } => {
            let collection = match c.as_str() {
                "ot_brain" => Collection::Brain,
                "ot_cell" => Collection::Cell,
                other => {
                    debug!(collection = other, "reply for unknown collection");
                    return;
                }
            };
            let outcome = match (error, data) {
                (Some(e), _) => Err(e.into_channel_error()),
                (None, Some(snapshot)) => Ok(snapshot),
                (None, None) => Ok(Snapshot {
                    v: 0,
                    doc_type: None,
                    data: None,
                }),
            };
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .complete((collection, d), outcome);
        }
        ServerMessage::Other => {}
    }
}
