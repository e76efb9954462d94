use serde_json::Value;
use strum_macros::Display;
use thiserror::Error as ThisError;
use tracing::debug;

use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::frame::Request;
use crate::store::{InnerStoreLocked, Store};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum State {
    Watching,
    Queuing,
    Committed,
    Aborted,
    Discarded,
}

impl State {
    fn is_finished(self) -> bool {
        matches!(self, State::Committed | State::Aborted | State::Discarded)
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum TransactionError {
    #[error("transaction already {0}")]
    Finished(State),
}

/// A batch of commands guarded by optimistic locking.
///
/// `watch` snapshots the decoded value of each key. When the transaction is executed every
/// watched key is compared with its snapshot; if any of them changed nothing runs and the
/// result is `None`. Otherwise the queued commands are applied in order directly against the
/// store, outside of the server's event queue, so single commands from other connections may
/// interleave between them.
#[derive(Debug)]
pub struct Transaction {
    state: State,
    watched: Vec<(String, Value)>,
    commands: Vec<Request>,
}

impl Transaction {
    pub fn new() -> Transaction {
        Transaction {
            state: State::Queuing,
            watched: vec![],
            commands: vec![],
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Adds `keys` to the watch set. A key that is already watched keeps its first snapshot.
    pub fn watch(&mut self, store: &InnerStoreLocked, keys: &[String]) {
        for key in keys {
            if self.watched.iter().any(|(watched, _)| watched == key) {
                continue;
            }
            self.watched.push((key.clone(), store.get(key)));
        }

        if self.state == State::Queuing && self.commands.is_empty() {
            self.state = State::Watching;
        }
    }

    /// Starts queuing, keeping whatever is already watched.
    pub fn begin(&mut self) -> Result<(), TransactionError> {
        self.ensure_open()?;
        self.state = State::Queuing;
        Ok(())
    }

    pub fn queue(&mut self, request: Request) -> Result<(), TransactionError> {
        self.ensure_open()?;
        self.state = State::Queuing;
        self.commands.push(request);
        Ok(())
    }

    /// Runs the queued commands. Returns `Ok(None)` when a watched key changed since it was
    /// watched. An unknown or malformed command stops the batch with an error; commands applied
    /// before it are not rolled back.
    pub async fn execute(&mut self, store: &Store) -> Result<Option<Vec<Value>>, Error> {
        self.ensure_open()?;

        let changed = {
            let store = store.lock();
            let changed = self
                .watched
                .iter()
                .find(|(key, snapshot)| store.get(key) != *snapshot)
                .map(|(key, _)| key.clone());
            changed
        };

        if let Some(key) = changed {
            debug!(%key, "watched key changed, aborting transaction");
            self.abort();
            return Ok(None);
        }

        let commands = std::mem::take(&mut self.commands);
        let mut results = Vec::with_capacity(commands.len());

        for request in commands {
            let result = Command::try_from(request).and_then(|cmd| cmd.exec(store));
            match result {
                Ok(value) => results.push(value),
                Err(err) => {
                    self.abort();
                    return Err(err);
                }
            }

            // Each command takes the store lock on its own, so other connections may run
            // between two commands of the same batch.
            tokio::task::yield_now().await;
        }

        self.state = State::Committed;
        self.watched.clear();
        Ok(Some(results))
    }

    pub fn discard(&mut self) {
        self.commands.clear();
        self.watched.clear();
        self.state = State::Discarded;
    }

    fn abort(&mut self) {
        self.commands.clear();
        self.watched.clear();
        self.state = State::Aborted;
    }

    fn ensure_open(&self) -> Result<(), TransactionError> {
        if self.state.is_finished() {
            return Err(TransactionError::Finished(self.state));
        }
        Ok(())
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
