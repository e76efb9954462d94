use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Trims the list so it only contains the elements between `start` and `stop`, both inclusive.
/// Negative indexes count from the tail.
#[derive(Debug, PartialEq)]
pub struct Ltrim {
    pub key: String,
    pub start: i64,
    pub stop: i64,
}

impl Executable for Ltrim {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(store.ltrim(&self.key, self.start, self.stop))
    }
}

impl TryFrom<&mut CommandParser> for Ltrim {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let start = parser.next_integer()?;
        let stop = parser.next_integer()?;

        Ok(Self { key, start, stop })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::frame::Request;
    use serde_json::json;

    #[tokio::test]
    async fn keep_range() {
        let store = Store::new();
        store
            .lock()
            .rpush("l", &[json!("a"), json!("b"), json!("c"), json!("d")]);

        let cmd = Command::try_from(Request::new(
            "ltrim",
            vec![json!("l"), json!(1), json!(-2)],
        ))
        .unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!("OK"));

        assert_eq!(store.lock().get("l"), json!(["b", "c"]));
    }

    #[tokio::test]
    async fn empty_range_clears() {
        let store = Store::new();
        store.lock().rpush("l", &[json!("a")]);

        let cmd = Command::try_from(Request::new(
            "ltrim",
            vec![json!("l"), json!(3), json!(5)],
        ))
        .unwrap();
        cmd.exec(&store).unwrap();

        assert_eq!(store.lock().get("l"), json!([]));
    }

    #[test]
    fn non_integer_index() {
        let err = Command::try_from(Request::new(
            "ltrim",
            vec![json!("l"), json!(0.5), json!(1)],
        ))
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid argument for ltrim"));
    }
}
