use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Sets the score of `member`. Returns 1 for a new member and 0 for an update. The score is
/// stored as given and only interpreted as a number when the set is ranged.
#[derive(Debug, PartialEq)]
pub struct Zadd {
    pub key: String,
    pub score: Value,
    pub member: String,
}

impl Executable for Zadd {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(Value::from(store.zadd(&self.key, &self.score, &self.member)))
    }
}

impl TryFrom<&mut CommandParser> for Zadd {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let score = parser.next_value()?;
        let member = parser.next_string()?;

        Ok(Self { key, score, member })
    }
}
