use serde_json::Value;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;
use strum_macros::EnumString;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::commands::Command;
use crate::config::Config;
use crate::connection::Connection;
use crate::frame::{Frame, Request, Response};
use crate::queue::EventQueue;
use crate::store::pubsub::Message;
use crate::store::{persist, Store};
use crate::transaction::Transaction;
use crate::Error;

/// Binds the configured address and serves until Ctrl-C. When persistence is enabled the
/// snapshot is loaded first, rewritten periodically and written one last time on shutdown.
pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind(config.bind_address()).await?;
    let store = Store::new();

    if let Some(path) = config.persistence_path() {
        persist::restore(&store, path).await;
        persist::spawn(store.clone(), path.clone(), config.persistence_interval());
    }

    tokio::select! {
        res = serve(listener, store.clone(), config.clone()) => res,
        _ = signal::ctrl_c() => {
            info!("Shutting down Redos server");
            if let Some(path) = config.persistence_path() {
                persist::persist(&store, path).await?;
            }
            Ok(())
        }
    }
}

/// Accepts connections on `listener` until accepting fails or the event queue stops.
pub async fn serve(listener: TcpListener, store: Store, config: Config) -> Result<(), Error> {
    let (queue, mut drain) = EventQueue::spawn(store.clone());

    info!("Redos server listening on {}", listener.local_addr()?);

    loop {
        let (socket, client_address) = tokio::select! {
            res = listener.accept() => res?,
            res = &mut drain => {
                error!("Event queue stopped, shutting down");
                return Err(match res {
                    Ok(()) => Error::from("event queue stopped"),
                    Err(e) => Error::from(e),
                });
            }
        };
        let store = store.clone();
        let queue = queue.clone();
        let max_frame_size = config.max_frame_size;
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(socket, client_address, store, queue, max_frame_size).await
            {
                error!("Connection error: {}", e);
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, store, queue, max_frame_size),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    store: Store,
    queue: EventQueue,
    max_frame_size: usize,
) -> Result<(), Error> {
    let mut conn = Connection::new(stream, client_address, max_frame_size);

    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", client_address.to_string());

    let (messages_tx, mut messages) = mpsc::unbounded_channel();
    let mut session = Session::new(conn.id, store, queue, messages_tx);

    loop {
        tokio::select! {
            frame = conn.read_frame() => {
                let Some(frame) = frame? else {
                    break;
                };
                debug!("Received frame from client: {:?}", frame);
                let res = session.handle(frame).await;
                debug!("Sending response to client: {:?}", res);
                conn.write_response(res).await?;
            }
            Some(message) = messages.recv() => {
                let Message { channel, payload } = message;
                conn.write_response(Response::Message { channel, message: payload }).await?;
            }
        }
    }

    info!("Connection closed");
    Ok(())
}

/// Methods answered by the connection itself instead of the event queue.
#[derive(Debug, PartialEq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum Intercept {
    Multi,
    Exec,
    Discard,
    Watch,
    Subscribe,
    Unsubscribe,
}

/// Per connection state: the open transaction, if any, and the channels subscribed to.
/// Dropping the session unsubscribes from every channel and discards the transaction.
struct Session {
    id: Uuid,
    store: Store,
    queue: EventQueue,
    transaction: Option<Transaction>,
    channels: HashSet<String>,
    messages: UnboundedSender<Message>,
}

impl Session {
    fn new(id: Uuid, store: Store, queue: EventQueue, messages: UnboundedSender<Message>) -> Session {
        Session {
            id,
            store,
            queue,
            transaction: None,
            channels: HashSet::new(),
            messages,
        }
    }

    async fn handle(&mut self, frame: Frame) -> Response {
        let request = match frame {
            Frame::Request(request) => request,
            Frame::Malformed(err) => {
                debug!("Error parsing request: {}", err);
                return Response::error("Invalid command format");
            }
        };

        match Intercept::from_str(&request.method) {
            Ok(Intercept::Multi) => self.multi(),
            Ok(Intercept::Exec) => self.exec().await,
            Ok(Intercept::Discard) => self.discard(),
            Ok(Intercept::Watch) => self.watch(&request.args),
            Ok(Intercept::Subscribe) => self.subscribe(&request.args),
            Ok(Intercept::Unsubscribe) => self.unsubscribe(&request.args),
            Err(_) => match self.transaction.as_mut() {
                Some(transaction) => match transaction.queue(request) {
                    Ok(()) => Response::ok("QUEUED"),
                    Err(err) => Response::error(err),
                },
                None => self.submit(request).await,
            },
        }
    }

    async fn submit(&self, request: Request) -> Response {
        let command = match Command::try_from(request) {
            Ok(command) => command,
            Err(err) => return Response::error(err),
        };

        match self.queue.submit(command).await {
            Ok(result) => Response::Ok(result),
            Err(err) => Response::error(err),
        }
    }

    fn multi(&mut self) -> Response {
        match self.transaction.as_mut() {
            Some(transaction) => {
                if let Err(err) = transaction.begin() {
                    return Response::error(err);
                }
            }
            None => self.transaction = Some(self.store.lock().multi()),
        }
        Response::ok("OK")
    }

    async fn exec(&mut self) -> Response {
        // The transaction is consumed whether or not it succeeds.
        let Some(mut transaction) = self.transaction.take() else {
            return Response::error("EXEC without MULTI");
        };

        match transaction.execute(&self.store).await {
            Ok(Some(results)) => Response::ok(results),
            Ok(None) => Response::ok(Value::Null),
            Err(err) => {
                warn!("Transaction failed: {}", err);
                Response::error(err)
            }
        }
    }

    fn discard(&mut self) -> Response {
        match self.transaction.take() {
            Some(mut transaction) => {
                transaction.discard();
                Response::ok("OK")
            }
            None => Response::error("DISCARD without MULTI"),
        }
    }

    fn watch(&mut self, args: &[Value]) -> Response {
        let keys: Vec<String> = args.iter().map(as_key).collect();

        match self.transaction.as_mut() {
            Some(transaction) => {
                let store = self.store.lock();
                transaction.watch(&store, &keys);
            }
            None => self.transaction = Some(self.store.lock().watch(&keys)),
        }
        Response::ok("OK")
    }

    fn subscribe(&mut self, args: &[Value]) -> Response {
        let Some(channel) = args.first().map(as_key) else {
            return Response::error("wrong number of arguments for subscribe");
        };

        if self.channels.insert(channel.clone()) {
            self.store
                .lock()
                .subscribe(&channel, self.id, self.messages.clone());
        }
        Response::ok("subscribed")
    }

    fn unsubscribe(&mut self, args: &[Value]) -> Response {
        let Some(channel) = args.first().map(as_key) else {
            return Response::error("wrong number of arguments for unsubscribe");
        };

        if self.channels.remove(&channel) {
            self.store.lock().unsubscribe(&channel, self.id);
        }
        Response::ok("unsubscribed")
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.channels.is_empty() {
            return;
        }

        let mut store = self.store.lock();
        for channel in self.channels.drain() {
            store.unsubscribe(&channel, self.id);
        }
    }
}

fn as_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        value => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> (Session, mpsc::UnboundedReceiver<Message>) {
        let store = Store::new();
        let (queue, _) = EventQueue::spawn(store.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(Uuid::new_v4(), store, queue, tx), rx)
    }

    fn frame(method: &str, args: Vec<Value>) -> Frame {
        Frame::Request(Request::new(method, args))
    }

    #[test]
    fn intercepted_methods() {
        assert_eq!(Intercept::from_str("multi"), Ok(Intercept::Multi));
        assert_eq!(Intercept::from_str("EXEC"), Ok(Intercept::Exec));
        assert!(Intercept::from_str("get").is_err());
    }

    #[tokio::test]
    async fn single_commands() {
        let (mut session, _) = session();

        let res = session.handle(frame("set", vec![json!("k"), json!(1)])).await;
        assert_eq!(res, Response::ok("OK"));

        let res = session.handle(frame("get", vec![json!("k")])).await;
        assert_eq!(res, Response::ok(1));

        let res = session.handle(frame("nope", vec![])).await;
        assert_eq!(res, Response::error("Invalid command: nope"));
    }

    #[tokio::test]
    async fn malformed_request() {
        let (mut session, _) = session();
        let err = serde_json::from_str::<Request>("{nope}").unwrap_err();

        let res = session.handle(Frame::Malformed(err)).await;
        assert_eq!(res, Response::error("Invalid command format"));
    }

    #[tokio::test]
    async fn transaction_lifecycle() {
        let (mut session, _) = session();

        assert_eq!(
            session.handle(frame("exec", vec![])).await,
            Response::error("EXEC without MULTI")
        );

        assert_eq!(session.handle(frame("multi", vec![])).await, Response::ok("OK"));
        assert_eq!(
            session.handle(frame("set", vec![json!("k"), json!("v")])).await,
            Response::ok("QUEUED")
        );
        assert_eq!(session.store.lock().get("k"), Value::Null);

        assert_eq!(
            session.handle(frame("exec", vec![])).await,
            Response::ok(json!(["OK"]))
        );
        assert!(session.transaction.is_none());
        assert_eq!(session.store.lock().get("k"), json!("v"));
    }

    #[tokio::test]
    async fn watch_then_multi_keeps_watch_set() {
        let (mut session, _) = session();

        session.handle(frame("watch", vec![json!("k")])).await;
        session.handle(frame("multi", vec![])).await;
        session.handle(frame("set", vec![json!("other"), json!(1)])).await;

        session.store.lock().set("k", &json!("changed"));

        assert_eq!(
            session.handle(frame("exec", vec![])).await,
            Response::ok(Value::Null)
        );
        assert_eq!(session.store.lock().get("other"), Value::Null);
    }

    #[tokio::test]
    async fn discard() {
        let (mut session, _) = session();

        assert_eq!(
            session.handle(frame("discard", vec![])).await,
            Response::error("DISCARD without MULTI")
        );

        session.handle(frame("multi", vec![])).await;
        session.handle(frame("set", vec![json!("k"), json!(1)])).await;
        assert_eq!(session.handle(frame("discard", vec![])).await, Response::ok("OK"));

        assert_eq!(session.store.lock().get("k"), Value::Null);
        assert!(session.transaction.is_none());
    }

    #[tokio::test]
    async fn failed_exec_consumes_transaction() {
        let (mut session, _) = session();

        session.handle(frame("multi", vec![])).await;
        session.handle(frame("bogus", vec![])).await;

        assert_eq!(
            session.handle(frame("exec", vec![])).await,
            Response::error("Invalid command: bogus")
        );
        assert!(session.transaction.is_none());
    }

    #[tokio::test]
    async fn subscriptions() {
        let (mut session, mut messages) = session();
        let store = session.store.clone();

        assert_eq!(
            session.handle(frame("subscribe", vec![json!("news")])).await,
            Response::ok("subscribed")
        );
        session.handle(frame("subscribe", vec![json!("news")])).await;
        assert_eq!(store.lock().subscriber_count("news"), 1);

        store.lock().publish("news", &json!("hello"));
        let message = messages.recv().await.unwrap();
        assert_eq!(message.payload, json!("hello"));

        assert_eq!(
            session.handle(frame("unsubscribe", vec![json!("news")])).await,
            Response::ok("unsubscribed")
        );
        assert_eq!(store.lock().subscriber_count("news"), 0);
    }

    #[tokio::test]
    async fn dropping_session_unsubscribes() {
        let (mut session, _messages) = session();
        let store = session.store.clone();

        session.handle(frame("subscribe", vec![json!("a")])).await;
        session.handle(frame("subscribe", vec![json!("b")])).await;
        drop(session);

        assert_eq!(store.lock().subscriber_count("a"), 0);
        assert_eq!(store.lock().subscriber_count("b"), 0);
    }
}
