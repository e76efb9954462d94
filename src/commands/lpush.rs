use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Inserts each value at the head of the list, one after another, so the last value ends up
/// first. Returns the length of the list.
#[derive(Debug, PartialEq)]
pub struct Lpush {
    pub key: String,
    pub values: Vec<Value>,
}

impl Executable for Lpush {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(Value::from(store.lpush(&self.key, &self.values)))
    }
}

impl TryFrom<&mut CommandParser> for Lpush {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let values = parser.rest();

        Ok(Self { key, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::frame::Request;
    use serde_json::json;

    #[tokio::test]
    async fn push_order() {
        let store = Store::new();

        let cmd = Command::try_from(Request::new(
            "lpush",
            vec![json!("l"), json!("a"), json!("b")],
        ))
        .unwrap();
        assert_eq!(
            cmd,
            Command::Lpush(Lpush {
                key: "l".to_string(),
                values: vec![json!("a"), json!("b")],
            })
        );
        assert_eq!(cmd.exec(&store).unwrap(), json!(2));

        assert_eq!(store.lock().get("l"), json!(["b", "a"]));
    }

    #[tokio::test]
    async fn no_values() {
        let store = Store::new();

        let cmd = Command::try_from(Request::new("lpush", vec![json!("l")])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!(0));
    }
}
