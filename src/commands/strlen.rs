use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Returns the byte length of the string or bitmap stored at key, and 0 for missing keys or
/// any other type.
#[derive(Debug, PartialEq)]
pub struct Strlen {
    pub key: String,
}

impl Executable for Strlen {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let store = store.lock();
        Ok(Value::from(store.strlen(&self.key)))
    }
}

impl TryFrom<&mut CommandParser> for Strlen {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
