use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Delivers `message` to every current subscriber of `channel` and returns how many there
/// were. Messages are not retained.
#[derive(Debug, PartialEq)]
pub struct Publish {
    pub channel: String,
    pub message: Value,
}

impl Executable for Publish {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let store = store.lock();
        Ok(Value::from(store.publish(&self.channel, &self.message)))
    }
}

impl TryFrom<&mut CommandParser> for Publish {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let channel = parser.next_string()?;
        let message = parser.next_value()?;

        Ok(Self { channel, message })
    }
}
