use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Removes members from the set and returns how many were removed.
#[derive(Debug, PartialEq)]
pub struct Srem {
    pub key: String,
    pub members: Vec<Value>,
}

impl Executable for Srem {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(Value::from(store.srem(&self.key, &self.members)))
    }
}

impl TryFrom<&mut CommandParser> for Srem {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let members = parser.rest();

        Ok(Self { key, members })
    }
}
