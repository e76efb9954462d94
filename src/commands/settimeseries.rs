use serde_json::{Number, Value};

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Adds a `(timestamp, value)` point to the series, keeping it sorted by timestamp.
#[derive(Debug, PartialEq)]
pub struct SetTimeSeries {
    pub key: String,
    pub timestamp: Number,
    pub value: Value,
}

impl Executable for SetTimeSeries {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(store.set_time_series(&self.key, self.timestamp, &self.value))
    }
}

impl TryFrom<&mut CommandParser> for SetTimeSeries {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let timestamp = parser.next_number()?;
        let value = parser.next_value()?;

        Ok(Self {
            key,
            timestamp,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::frame::Request;
    use serde_json::json;

    #[tokio::test]
    async fn points_are_sorted() {
        let store = Store::new();

        for (ts, value) in [(30, "c"), (10, "a"), (20, "b")] {
            let cmd = Command::try_from(Request::new(
                "setTimeSeries",
                vec![json!("t"), json!(ts), json!(value)],
            ))
            .unwrap();
            assert_eq!(cmd.exec(&store).unwrap(), json!("OK"));
        }

        assert_eq!(
            store.lock().get("t"),
            json!([[10, "a"], [20, "b"], [30, "c"]])
        );
    }

    #[test]
    fn timestamp_must_be_numeric() {
        let err = Command::try_from(Request::new(
            "setTimeSeries",
            vec![json!("t"), json!("yesterday"), json!(1)],
        ))
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid argument for settimeseries"));
    }
}
