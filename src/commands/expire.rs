use serde_json::Value;
use tokio::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::store::Store;
use crate::Error;

// Roughly 136 years.
const MAX_SECONDS: f64 = u32::MAX as f64;

/// Schedules `key` for deletion after `seconds`. Returns 1 when the key exists, 0 otherwise.
/// A later expire on the same key replaces the earlier deadline.
#[derive(Debug, PartialEq)]
pub struct Expire {
    pub key: String,
    pub ttl: Duration,
}

impl Executable for Expire {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(Value::from(store.expire(&self.key, self.ttl)))
    }
}

impl TryFrom<&mut CommandParser> for Expire {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let seconds = parser.next_f64()?;

        if seconds > MAX_SECONDS {
            return Err(parser.invalid("seconds within range", Value::from(seconds)).into());
        }

        // Negative timeouts expire right away.
        let ttl = Duration::try_from_secs_f64(seconds.max(0.0)).map_err(|_| {
            CommandParserError::InvalidArgument {
                command: "expire".to_string(),
                expected: "a finite number of seconds".to_string(),
                actual: Value::from(seconds),
            }
        })?;

        Ok(Self { key, ttl })
    }
}
