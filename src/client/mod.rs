//! Async client for the Redos server.
//!
//! A [`Client`] owns one TCP connection. Responses carry no request id, so they are matched to
//! requests strictly in the order the requests were written; pub/sub pushes are routed to the
//! listeners registered for their channel instead. [`ClientPool`] keeps a fixed number of
//! clients and moves subscriptions off connections that fail.

pub mod commands;
pub mod pool;
pub mod transaction;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use thiserror::Error as ThisError;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::{RequestCodec, ResponseCodec};
use crate::frame::{self, Request, Response};

pub use commands::Commands;
pub use pool::{ClientPool, PoolConfig, PoolEvent, PoolTransaction, Subscription};
pub use transaction::Transaction;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, ThisError)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The server answered with `success: false`.
    #[error("{0}")]
    Server(String),
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    #[error("Not connected to RedosServer")]
    NotConnected,
    #[error("client pool is closed")]
    PoolClosed,
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether the connection that produced this error is unusable. Server side command
    /// errors leave the connection healthy.
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, ClientError::Server(_) | ClientError::PoolClosed)
    }
}

impl From<frame::Error> for ClientError {
    fn from(err: frame::Error) -> Self {
        match err {
            frame::Error::Io(err) => ClientError::Io(err),
            err => ClientError::Protocol(err.to_string()),
        }
    }
}

/// Lifecycle notifications, used by the pool to notice failed connections.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Error { id: Uuid, message: String },
    Closed { id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A single connection to the server. Cloning is cheap and every clone shares the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    id: Uuid,
    writer: AsyncMutex<FramedWrite<OwnedWriteHalf, RequestCodec>>,
    shared: Arc<Mutex<Shared>>,
    reader: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

struct Shared {
    connected: bool,
    pending: VecDeque<oneshot::Sender<ClientResult<Value>>>,
    listeners: HashMap<String, Vec<(ListenerId, UnboundedSender<Value>)>>,
    next_listener: u64,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> ClientResult<Client> {
        Client::connect_inner(addr, None).await
    }

    /// Connects and reports errors and the end of the connection on `events`.
    pub async fn connect_with_events(
        addr: impl ToSocketAddrs,
        events: UnboundedSender<ClientEvent>,
    ) -> ClientResult<Client> {
        Client::connect_inner(addr, Some(events)).await
    }

    async fn connect_inner(
        addr: impl ToSocketAddrs,
        events: Option<UnboundedSender<ClientEvent>>,
    ) -> ClientResult<Client> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let id = Uuid::new_v4();
        let shared = Arc::new(Mutex::new(Shared {
            connected: true,
            pending: VecDeque::new(),
            listeners: HashMap::new(),
            next_listener: 0,
        }));

        let reader = tokio::spawn(read_responses(
            id,
            FramedRead::new(reader, ResponseCodec::default()),
            shared.clone(),
            events,
        ));

        debug!(client_id = %id, "connected");

        Ok(Client {
            inner: Arc::new(Inner {
                id,
                writer: AsyncMutex::new(FramedWrite::new(writer, RequestCodec::default())),
                shared,
                reader,
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_connected(&self) -> bool {
        self.inner.shared.lock().unwrap().connected
    }

    /// Sends a request and waits for its response.
    pub async fn send_command(&self, method: &str, args: Vec<Value>) -> ClientResult<Value> {
        let (tx, rx) = oneshot::channel();
        {
            // The writer lock is held from registering the callback until the request is
            // written, so callbacks are queued in the same order as requests on the wire.
            let mut writer = self.inner.writer.lock().await;
            {
                let mut shared = self.inner.shared.lock().unwrap();
                if !shared.connected {
                    return Err(ClientError::NotConnected);
                }
                shared.pending.push_back(tx);
            }

            if let Err(err) = writer.send(Request::new(method, args)).await {
                warn!(client_id = %self.inner.id, "failed to send request: {}", err);
                self.disconnect();
                return Err(err.into());
            }
        }

        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Registers `listener` for messages published on `channel`. The first listener of a
    /// channel subscribes the connection.
    pub async fn subscribe(
        &self,
        channel: &str,
        listener: UnboundedSender<Value>,
    ) -> ClientResult<ListenerId> {
        let (id, first) = {
            let mut shared = self.inner.shared.lock().unwrap();
            let id = ListenerId(shared.next_listener);
            shared.next_listener += 1;

            let listeners = shared.listeners.entry(channel.to_string()).or_default();
            listeners.push((id, listener));
            (id, listeners.len() == 1)
        };

        if first {
            if let Err(err) = self.send_command("subscribe", vec![channel.into()]).await {
                self.remove_listener(channel, id);
                return Err(err);
            }
        }
        Ok(id)
    }

    /// Removes one listener. Removing the last listener of a channel unsubscribes the
    /// connection.
    pub async fn unsubscribe(&self, channel: &str, id: ListenerId) -> ClientResult<()> {
        if self.remove_listener(channel, id) {
            self.send_command("unsubscribe", vec![channel.into()])
                .await?;
        }
        Ok(())
    }

    /// Drops every listener of `channel` and unsubscribes the connection.
    pub async fn unsubscribe_all(&self, channel: &str) -> ClientResult<()> {
        let subscribed = self
            .inner
            .shared
            .lock()
            .unwrap()
            .listeners
            .remove(channel)
            .is_some();

        if subscribed {
            self.send_command("unsubscribe", vec![channel.into()])
                .await?;
        }
        Ok(())
    }

    // Returns true when `channel` has no listeners left.
    fn remove_listener(&self, channel: &str, id: ListenerId) -> bool {
        let mut shared = self.inner.shared.lock().unwrap();
        let Some(listeners) = shared.listeners.get_mut(channel) else {
            return false;
        };

        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        let removed = listeners.len() < before;

        if removed && listeners.is_empty() {
            shared.listeners.remove(channel);
            return true;
        }
        false
    }

    /// Opens a transaction on the server. Commands are buffered locally until
    /// [`Transaction::execute`].
    pub async fn multi(&self) -> ClientResult<Transaction> {
        self.send_command("multi", vec![]).await?;
        Ok(Transaction::new(self.clone()))
    }

    pub async fn watch(&self, keys: &[&str]) -> ClientResult<Value> {
        let keys = keys.iter().map(|key| Value::from(*key)).collect();
        self.send_command("watch", keys).await
    }

    /// Closes the connection. Requests still waiting for a response fail with
    /// [`ClientError::ConnectionClosed`].
    pub async fn close(&self) {
        self.disconnect();
        let mut writer = self.inner.writer.lock().await;
        if let Err(err) = writer.get_mut().shutdown().await {
            debug!(client_id = %self.inner.id, "error shutting down connection: {}", err);
        }
    }

    fn disconnect(&self) {
        let mut shared = self.inner.shared.lock().unwrap();
        shared.connected = false;
        shared.listeners.clear();
        for callback in shared.pending.drain(..) {
            let _ = callback.send(Err(ClientError::ConnectionClosed));
        }
    }
}

async fn read_responses(
    id: Uuid,
    mut reader: FramedRead<OwnedReadHalf, ResponseCodec>,
    shared: Arc<Mutex<Shared>>,
    events: Option<UnboundedSender<ClientEvent>>,
) {
    let emit = |event: ClientEvent| {
        if let Some(events) = &events {
            let _ = events.send(event);
        }
    };

    while let Some(response) = reader.next().await {
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(client_id = %id, "connection error: {}", err);
                emit(ClientEvent::Error {
                    id,
                    message: err.to_string(),
                });
                break;
            }
        };

        let mut shared = shared.lock().unwrap();
        match response {
            Response::Message { channel, message } => {
                if let Some(listeners) = shared.listeners.get_mut(&channel) {
                    listeners.retain(|(_, listener)| listener.send(message.clone()).is_ok());
                }
            }
            Response::Ok(result) => match shared.pending.pop_front() {
                Some(callback) => {
                    let _ = callback.send(Ok(result));
                }
                None => warn!(client_id = %id, "response without a pending request"),
            },
            Response::Error(error) => match shared.pending.pop_front() {
                Some(callback) => {
                    let _ = callback.send(Err(ClientError::Server(error)));
                }
                None => warn!(client_id = %id, "error without a pending request: {}", error),
            },
        }
    }

    info!(client_id = %id, "Connection closed");
    {
        let mut shared = shared.lock().unwrap();
        shared.connected = false;
        shared.listeners.clear();
        for callback in shared.pending.drain(..) {
            let _ = callback.send(Err(ClientError::ConnectionClosed));
        }
    }
    emit(ClientEvent::Closed { id });
}
