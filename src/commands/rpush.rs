use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Appends the values to the tail of the list and returns its length.
#[derive(Debug, PartialEq)]
pub struct Rpush {
    pub key: String,
    pub values: Vec<Value>,
}

impl Executable for Rpush {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(Value::from(store.rpush(&self.key, &self.values)))
    }
}

impl TryFrom<&mut CommandParser> for Rpush {
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
    async fn append_values() {
        let store = Store::new();
        store.lock().rpush("l", &[json!(1)]);

        let cmd = Command::try_from(Request::new(
            "rpush",
            vec![json!("l"), json!(2), json!({"three": 3})],
        ))
        .unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!(3));

        assert_eq!(store.lock().get("l"), json!([1, 2, {"three": 3}]));
    }
}
