use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::store::Store;
use crate::Error;

pub struct Event {
    command: Command,
    reply: oneshot::Sender<Result<Value, Error>>,
}

/// The global FIFO through which every non-transactional command of every connection is
/// applied to the store. A single task drains it, finishing one command before taking the next,
/// so the order in which commands were submitted is the order in which they take effect.
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventQueue {
    /// Creates the queue and spawns its drain task.
    pub fn spawn(store: Store) -> (EventQueue, JoinHandle<()>) {
        let (queue, events) = EventQueue::channel();
        let handle = tokio::spawn(drain(store, events));
        (queue, handle)
    }

    /// A queue whose events are drained by the caller.
    pub fn channel() -> (EventQueue, mpsc::UnboundedReceiver<Event>) {
        let (sender, events) = mpsc::unbounded_channel();
        (EventQueue { sender }, events)
    }

    /// Appends `command` to the queue and waits until it has been applied.
    pub async fn submit(&self, command: Command) -> Result<Value, Error> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Event { command, reply })
            .map_err(|_| "event queue is closed")?;

        response.await.map_err(|_| "event queue is closed")?
    }
}

pub async fn drain(store: Store, mut events: mpsc::UnboundedReceiver<Event>) {
    while let Some(Event { command, reply }) = events.recv().await {
        let result = command.exec(&store);

        // The submitter may have gone away, e.g. its connection was dropped.
        if reply.send(result).is_err() {
            debug!("dropping reply for a closed connection");
        }

        tokio::task::yield_now().await;
    }
    debug!("event queue drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Request;
    use crate::transaction::Transaction;
    use serde_json::json;

    fn command(method: &str, args: Vec<Value>) -> Command {
        Command::try_from(Request::new(method, args)).unwrap()
    }

    #[tokio::test]
    async fn applies_in_submission_order() {
        let store = Store::new();
        let (queue, _handle) = EventQueue::spawn(store.clone());

        let pushes = (0..10).map(|i| {
            let queue = queue.clone();
            async move { queue.submit(command("rpush", vec![json!("l"), json!(i)])).await }
        });
        let lengths: Vec<Value> = futures::future::join_all(pushes)
            .await
            .into_iter()
            .map(|res| res.unwrap())
            .collect();

        assert_eq!(lengths, (1..=10).map(Value::from).collect::<Vec<_>>());
        assert_eq!(
            store.lock().get("l"),
            Value::Array((0..10).map(Value::from).collect())
        );
    }

    #[tokio::test]
    async fn nothing_runs_until_drained() {
        let store = Store::new();
        let (queue, events) = EventQueue::channel();

        let pending = tokio::spawn({
            let queue = queue.clone();
            async move { queue.submit(command("set", vec![json!("k"), json!(1)])).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(store.lock().get("k"), Value::Null);

        tokio::spawn(drain(store.clone(), events));
        assert_eq!(pending.await.unwrap().unwrap(), json!("OK"));
        assert_eq!(store.lock().get("k"), json!(1));
    }

    #[tokio::test]
    async fn transactions_do_not_wait_for_the_queue() {
        let store = Store::new();
        let (queue, events) = EventQueue::channel();

        let pending = tokio::spawn({
            let queue = queue.clone();
            async move { queue.submit(command("set", vec![json!("k"), json!("queued")])).await }
        });
        tokio::task::yield_now().await;

        let mut tx = Transaction::new();
        tx.queue(Request::new("set", vec![json!("k"), json!("tx")]))
            .unwrap();
        assert_eq!(tx.execute(&store).await.unwrap(), Some(vec![json!("OK")]));
        assert_eq!(store.lock().get("k"), json!("tx"));

        tokio::spawn(drain(store.clone(), events));
        pending.await.unwrap().unwrap();
        assert_eq!(store.lock().get("k"), json!("queued"));
    }

    #[tokio::test]
    async fn closed_queue() {
        let (queue, events) = EventQueue::channel();
        drop(events);

        let err = queue
            .submit(command("get", vec![json!("k")]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "event queue is closed");
    }
}
