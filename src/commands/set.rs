use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Stores `value` at `key`, replacing whatever the key held before regardless of its type.
/// A pending expiration on the key is left in place.
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: String,
    pub value: Value,
}

impl Executable for Set {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(store.set(&self.key, &self.value))
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let value = parser.next_value()?;

        Ok(Self { key, value })
    }
}
