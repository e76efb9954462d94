use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::store::Store;
use crate::Error;

/// Removes the given keys and returns how many of them existed.
#[derive(Debug, PartialEq)]
pub struct Del {
    pub keys: Vec<String>,
}

impl Executable for Del {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        let count: i64 = self.keys.iter().map(|key| store.del(key)).sum();
        Ok(Value::from(count))
    }
}

impl TryFrom<&mut CommandParser> for Del {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let mut keys = vec![];

        loop {
            match parser.next_string() {
                Ok(key) => keys.push(key),
                Err(CommandParserError::EndOfStream { .. }) if !keys.is_empty() => {
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Self { keys })
    }
}
