use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Adds members to the set and returns how many were not already present. Membership uses
/// strict equality, so arrays and objects are always added.
#[derive(Debug, PartialEq)]
pub struct Sadd {
    pub key: String,
    pub members: Vec<Value>,
}

impl Executable for Sadd {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(Value::from(store.sadd(&self.key, &self.members)))
    }
}

impl TryFrom<&mut CommandParser> for Sadd {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let members = parser.rest();

        Ok(Self { key, members })
    }
}
