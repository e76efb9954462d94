use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Returns the value at `key`, or null when the key does not exist.
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: String,
}

impl Executable for Get {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let store = store.lock();
        Ok(store.get(&self.key))
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::frame::Request;
    use serde_json::json;

    #[tokio::test]
    async fn existing_key() {
        let store = Store::new();
        store.lock().set("key1", &json!("Hello world"));

        let cmd = Command::try_from(Request::new("get", vec![json!("key1")])).unwrap();
        let res = cmd.exec(&store).unwrap();

        assert_eq!(res, json!("Hello world"));
    }

    #[tokio::test]
    async fn non_existing_key() {
        let store = Store::new();

        let cmd = Command::try_from(Request::new("get", vec![json!("key1")])).unwrap();
        let res = cmd.exec(&store).unwrap();

        assert_eq!(res, Value::Null);
    }
}
