use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Members ranked by ascending score between `start` and `stop`, both inclusive. With
/// `with_scores` the reply interleaves each member with its score.
#[derive(Debug, PartialEq)]
pub struct Zrange {
    pub key: String,
    pub start: i64,
    pub stop: i64,
    pub with_scores: bool,
}

impl Executable for Zrange {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let store = store.lock();
        Ok(store.zrange(&self.key, self.start, self.stop, self.with_scores))
    }
}

impl TryFrom<&mut CommandParser> for Zrange {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let start = parser.next_integer()?;
        let stop = parser.next_integer()?;

        // Accepts both `true` and the Redis style `"WITHSCORES"` flag.
        let with_scores = if parser.has_next() {
            match parser.next_value()? {
                Value::Bool(b) => b,
                Value::String(s) => s.eq_ignore_ascii_case("withscores"),
                _ => false,
            }
        } else {
            false
        };

        Ok(Self {
            key,
            start,
            stop,
            with_scores,
        })
    }
}
