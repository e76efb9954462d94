use serde_json::Value;

use crate::client::{Client, ClientResult};
use crate::frame::Request;

/// Commands buffered for a transaction opened with [`Client::multi`]. Nothing is sent until
/// [`Transaction::execute`], which sends every command and then `exec`.
pub struct Transaction {
    client: Client,
    commands: Vec<Request>,
}

impl Transaction {
    pub(crate) fn new(client: Client) -> Transaction {
        Transaction {
            client,
            commands: vec![],
        }
    }

    /// Queues `method` with `args`.
    pub fn exec(&mut self, method: &str, args: Vec<Value>) -> &mut Self {
        self.commands.push(Request::new(method, args));
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Sends the queued commands followed by `exec`. Resolves to the array of results, or null
    /// when a watched key changed.
    pub async fn execute(self) -> ClientResult<Value> {
        for Request { method, args } in self.commands {
            self.client.send_command(&method, args).await?;
        }
        self.client.send_command("exec", vec![]).await
    }

    pub async fn discard(self) -> ClientResult<Value> {
        self.client.send_command("discard", vec![]).await
    }
}
