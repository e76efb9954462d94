use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::commands::Commands;
use crate::client::transaction::Transaction;
use crate::client::{Client, ClientError, ClientEvent, ClientResult, ListenerId};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Number of connections the pool keeps open.
    pub pool_size: usize,
    /// Delay before a failed connection is replaced.
    pub retry_interval: Duration,
    /// Reconnection attempts allowed in a row before the pool gives up. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            addr: "127.0.0.1:6379".to_string(),
            pool_size: 5,
            retry_interval: Duration::from_secs(5),
            max_retries: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    ClientAdded(Uuid),
    ClientRemoved(Uuid),
    /// Reconnection stopped. Callers waiting for a connection will wait forever.
    MaxRetriesReached,
}

/// A fixed set of [`Client`]s.
///
/// Connections are handed out oldest idle first; when none is idle the caller waits in line and
/// a released connection goes straight to the longest waiting caller. A connection that fails is
/// dropped from the pool and replaced after `retry_interval`. Subscriptions made through the
/// pool each hold a connection and are moved to a fresh one when theirs fails.
#[derive(Clone)]
pub struct ClientPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    events: broadcast::Sender<PoolEvent>,
    client_events: mpsc::UnboundedSender<ClientEvent>,
}

struct PoolState {
    idle: VecDeque<Client>,
    waiters: VecDeque<oneshot::Sender<Client>>,
    members: HashMap<Uuid, Client>,
    retry_count: u32,
    subscriptions: HashMap<u64, SubscriptionEntry>,
    next_subscription: u64,
    closed: bool,
}

struct SubscriptionEntry {
    channel: String,
    listener: mpsc::UnboundedSender<Value>,
    // The connection currently serving the subscription, `None` while it is being moved.
    serving: Option<(Client, ListenerId)>,
}

impl ClientPool {
    /// A pool with no connections yet. See [`ClientPool::init`].
    pub fn new(config: PoolConfig) -> ClientPool {
        let (events, _) = broadcast::channel(64);
        let (client_events, client_events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(PoolInner {
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                members: HashMap::new(),
                retry_count: 0,
                subscriptions: HashMap::new(),
                next_subscription: 0,
                closed: false,
            }),
            events,
            client_events,
        });

        tokio::spawn(monitor(Arc::downgrade(&inner), client_events_rx));

        ClientPool { inner }
    }

    /// Creates the pool and opens its connections.
    pub async fn connect(config: PoolConfig) -> ClientPool {
        let pool = ClientPool::new(config);
        pool.init().await;
        pool
    }

    /// Opens `pool_size` connections. Connections that fail to open are retried in the
    /// background.
    pub async fn init(&self) {
        for _ in 0..self.inner.config.pool_size {
            let _ = self.add_client().await;
        }
    }

    pub fn events(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }

    /// Number of open connections, idle or not.
    pub fn size(&self) -> usize {
        self.inner.state.lock().unwrap().members.len()
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().unwrap().idle.len()
    }

    /// Takes a connection out of the pool, waiting for one to be released if none is idle.
    /// There is no timeout.
    pub async fn acquire(&self) -> ClientResult<Client> {
        let waiter = {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                return Err(ClientError::PoolClosed);
            }

            while let Some(client) = state.idle.pop_front() {
                // A dead connection is about to be removed by the monitor.
                if client.is_connected() {
                    return Ok(client);
                }
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        waiter.await.map_err(|_| ClientError::PoolClosed)
    }

    /// Returns a connection to the pool, handing it to the oldest waiter if there is one.
    pub fn release(&self, client: Client) {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed || !state.members.contains_key(&client.id()) {
            return;
        }
        hand_off(&mut state, client);
    }

    /// Releases `client` after an operation, or removes it when the operation failed because of
    /// the connection.
    fn finish<T>(&self, client: Client, result: &ClientResult<T>) {
        self.settle(client, result.as_ref().err());
    }

    fn settle(&self, client: Client, error: Option<&ClientError>) {
        match error {
            Some(err) if err.is_connection_error() => {
                self.remove_client(client.id(), &err.to_string())
            }
            _ => self.release(client),
        }
    }

    pub async fn execute_command(&self, method: &str, args: Vec<Value>) -> ClientResult<Value> {
        let client = self.acquire().await?;
        let result = client.send_command(method, args).await;
        self.finish(client, &result);
        result
    }

    /// Subscribes to `channel` on a connection dedicated to this subscription until it is
    /// unsubscribed.
    pub async fn subscribe(&self, channel: &str) -> ClientResult<Subscription> {
        let client = self.acquire().await?;
        let (listener, receiver) = mpsc::unbounded_channel();

        let listener_id = match client.subscribe(channel, listener.clone()).await {
            Ok(listener_id) => listener_id,
            Err(err) => {
                self.settle(client, Some(&err));
                return Err(err);
            }
        };

        let id = {
            let mut state = self.inner.state.lock().unwrap();
            let id = state.next_subscription;
            state.next_subscription += 1;
            state.subscriptions.insert(
                id,
                SubscriptionEntry {
                    channel: channel.to_string(),
                    listener,
                    serving: Some((client, listener_id)),
                },
            );
            id
        };

        Ok(Subscription {
            id,
            channel: channel.to_string(),
            receiver,
            pool: self.clone(),
        })
    }

    async fn unsubscribe(&self, id: u64) -> ClientResult<()> {
        let entry = self.inner.state.lock().unwrap().subscriptions.remove(&id);
        match entry {
            Some(entry) => self.drop_subscription(entry).await,
            None => Ok(()),
        }
    }

    /// Ends every subscription to `channel` made through this pool.
    pub async fn unsubscribe_all(&self, channel: &str) -> ClientResult<()> {
        let entries: Vec<SubscriptionEntry> = {
            let mut state = self.inner.state.lock().unwrap();
            let ids: Vec<u64> = state
                .subscriptions
                .iter()
                .filter(|(_, entry)| entry.channel == channel)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| state.subscriptions.remove(id))
                .collect()
        };

        let mut result = Ok(());
        for entry in entries {
            if let Err(err) = self.drop_subscription(entry).await {
                result = Err(err);
            }
        }
        result
    }

    async fn drop_subscription(&self, entry: SubscriptionEntry) -> ClientResult<()> {
        let Some((client, listener_id)) = entry.serving else {
            return Ok(());
        };

        let result = client.unsubscribe(&entry.channel, listener_id).await;
        self.finish(client, &result);
        result
    }

    /// Opens a transaction on a connection that stays checked out until the transaction is
    /// executed or discarded.
    pub async fn multi(&self) -> ClientResult<PoolTransaction> {
        let client = self.acquire().await?;
        match client.multi().await {
            Ok(transaction) => Ok(PoolTransaction::new(self.clone(), client, transaction)),
            Err(err) => {
                self.settle(client, Some(&err));
                Err(err)
            }
        }
    }

    /// Watches `keys` and opens a transaction on the same connection.
    pub async fn watch(&self, keys: &[&str]) -> ClientResult<PoolTransaction> {
        let client = self.acquire().await?;

        let transaction = match client.watch(keys).await {
            Ok(_) => client.multi().await,
            Err(err) => Err(err),
        };

        match transaction {
            Ok(transaction) => Ok(PoolTransaction::new(self.clone(), client, transaction)),
            Err(err) => {
                self.settle(client, Some(&err));
                Err(err)
            }
        }
    }

    /// Ends all subscriptions, closes every connection and fails pending `acquire` calls with
    /// [`ClientError::PoolClosed`].
    pub async fn close(&self) {
        let (subscriptions, members) = {
            let mut state = self.inner.state.lock().unwrap();
            state.closed = true;
            state.idle.clear();
            state.waiters.clear();
            let subscriptions: Vec<SubscriptionEntry> =
                state.subscriptions.drain().map(|(_, entry)| entry).collect();
            let members: Vec<Client> = state.members.drain().map(|(_, client)| client).collect();
            (subscriptions, members)
        };

        for entry in subscriptions {
            if let Some((client, listener_id)) = entry.serving {
                let _ = client.unsubscribe(&entry.channel, listener_id).await;
            }
        }

        for client in members {
            client.close().await;
        }
        info!("Client pool closed");
    }

    async fn add_client(&self) -> ClientResult<()> {
        let config = &self.inner.config;
        let client =
            match Client::connect_with_events(&config.addr, self.inner.client_events.clone()).await {
                Ok(client) => client,
                Err(err) => {
                    warn!("Failed to connect to {}: {}", config.addr, err);
                    self.schedule_replacement();
                    return Err(err);
                }
            };

        let id = client.id();
        let rejected = {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                Some(client)
            } else {
                state.members.insert(id, client.clone());
                state.retry_count = 0;
                hand_off(&mut state, client);
                None
            }
        };

        if let Some(client) = rejected {
            client.close().await;
            return Err(ClientError::PoolClosed);
        }

        debug!(client_id = %id, "client added to pool");
        let _ = self.inner.events.send(PoolEvent::ClientAdded(id));
        Ok(())
    }

    /// Drops a failed connection and schedules its replacement. Subscriptions it served are
    /// moved to other connections. Removing a connection that is no longer in the pool does
    /// nothing.
    fn remove_client(&self, id: Uuid, reason: &str) {
        let (client, orphaned) = {
            let mut state = self.inner.state.lock().unwrap();
            let Some(client) = state.members.remove(&id) else {
                return;
            };
            state.idle.retain(|idle| idle.id() != id);

            let mut orphaned = vec![];
            for (sub_id, entry) in state.subscriptions.iter_mut() {
                if matches!(&entry.serving, Some((serving, _)) if serving.id() == id) {
                    entry.serving = None;
                    orphaned.push(*sub_id);
                }
            }
            (client, orphaned)
        };

        warn!(client_id = %id, "removing client from pool: {}", reason);
        let _ = self.inner.events.send(PoolEvent::ClientRemoved(id));

        tokio::spawn(async move { client.close().await });
        self.schedule_replacement();

        for sub_id in orphaned {
            let pool = self.clone();
            tokio::spawn(async move { pool.rehome(sub_id).await });
        }
    }

    fn schedule_replacement(&self) {
        let attempt = {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                return;
            }

            let exhausted = self
                .inner
                .config
                .max_retries
                .is_some_and(|max_retries| state.retry_count >= max_retries);
            if exhausted {
                None
            } else {
                state.retry_count += 1;
                Some(state.retry_count)
            }
        };

        let Some(attempt) = attempt else {
            warn!("Max retries reached. Stopping reconnection attempts.");
            let _ = self.inner.events.send(PoolEvent::MaxRetriesReached);
            return;
        };

        let interval = self.inner.config.retry_interval;
        info!("Retrying connection in {:?} (attempt {})", interval, attempt);

        let pool = self.clone();
        tokio::spawn(async move {
            sleep(interval).await;
            let _ = pool.add_client().await;
        });
    }

    // Boxed because a failed attempt spawns another one.
    fn rehome(&self, sub_id: u64) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let Some((channel, listener)) = self.orphan(sub_id) else {
                return;
            };

            let client = match self.acquire().await {
                Ok(client) => client,
                Err(_) => return,
            };

            match client.subscribe(&channel, listener).await {
                Ok(listener_id) => {
                    let adopted = {
                        let mut state = self.inner.state.lock().unwrap();
                        match state.subscriptions.get_mut(&sub_id) {
                            Some(entry) if entry.serving.is_none() => {
                                entry.serving = Some((client.clone(), listener_id));
                                true
                            }
                            _ => false,
                        }
                    };

                    if adopted {
                        info!(client_id = %client.id(), %channel, "subscription moved to a new connection");
                    } else {
                        // Unsubscribed while moving.
                        let result = client.unsubscribe(&channel, listener_id).await;
                        self.finish(client, &result);
                    }
                }
                Err(err) if err.is_connection_error() => {
                    self.remove_client(client.id(), &err.to_string());
                    self.rehome(sub_id).await;
                }
                Err(err) => {
                    warn!(%channel, "failed to move subscription: {}", err);
                    self.release(client);
                }
            }
        })
    }

    // The channel and listener of a subscription waiting for a connection.
    fn orphan(&self, sub_id: u64) -> Option<(String, mpsc::UnboundedSender<Value>)> {
        let state = self.inner.state.lock().unwrap();
        state
            .subscriptions
            .get(&sub_id)
            .filter(|entry| entry.serving.is_none())
            .map(|entry| (entry.channel.clone(), entry.listener.clone()))
    }
}

fn hand_off(state: &mut PoolState, mut client: Client) {
    while let Some(waiter) = state.waiters.pop_front() {
        match waiter.send(client) {
            Ok(()) => return,
            // The waiter gave up.
            Err(returned) => client = returned,
        }
    }
    state.idle.push_back(client);
}

async fn monitor(pool: Weak<PoolInner>, mut events: mpsc::UnboundedReceiver<ClientEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = pool.upgrade() else {
            break;
        };
        let pool = ClientPool { inner };

        match event {
            ClientEvent::Error { id, message } => pool.remove_client(id, &message),
            ClientEvent::Closed { id } => pool.remove_client(id, "connection closed"),
        }
    }
}

impl Commands for ClientPool {
    fn send_command(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = ClientResult<Value>> + Send {
        self.execute_command(method, args)
    }
}

/// A subscription made through [`ClientPool::subscribe`]. Messages keep arriving on the same
/// receiver when the subscription is moved to another connection.
pub struct Subscription {
    id: u64,
    channel: String,
    receiver: mpsc::UnboundedReceiver<Value>,
    pool: ClientPool,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The next message, or `None` once the subscription ended.
    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    pub async fn unsubscribe(self) -> ClientResult<()> {
        self.pool.unsubscribe(self.id).await
    }
}

/// A transaction holding a pooled connection. The connection goes back to the pool after
/// [`execute`](PoolTransaction::execute) or [`discard`](PoolTransaction::discard). Dropping an
/// unfinished transaction discards it in the background.
pub struct PoolTransaction {
    pool: ClientPool,
    client: Option<Client>,
    transaction: Option<Transaction>,
}

impl PoolTransaction {
    fn new(pool: ClientPool, client: Client, transaction: Transaction) -> PoolTransaction {
        PoolTransaction {
            pool,
            client: Some(client),
            transaction: Some(transaction),
        }
    }

    pub fn exec(&mut self, method: &str, args: Vec<Value>) -> &mut Self {
        if let Some(transaction) = self.transaction.as_mut() {
            transaction.exec(method, args);
        }
        self
    }

    pub async fn execute(mut self) -> ClientResult<Value> {
        let (Some(client), Some(transaction)) = (self.client.take(), self.transaction.take()) else {
            return Err(ClientError::NotConnected);
        };

        let result = transaction.execute().await;
        self.pool.finish(client, &result);
        result
    }

    pub async fn discard(mut self) -> ClientResult<Value> {
        let (Some(client), Some(transaction)) = (self.client.take(), self.transaction.take()) else {
            return Err(ClientError::NotConnected);
        };

        let result = transaction.discard().await;
        self.pool.finish(client, &result);
        result
    }
}

impl Drop for PoolTransaction {
    fn drop(&mut self) {
        let (Some(client), Some(transaction)) = (self.client.take(), self.transaction.take()) else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let pool = self.pool.clone();
        runtime.spawn(async move {
            let result = transaction.discard().await;
            pool.finish(client, &result);
        });
    }
}
