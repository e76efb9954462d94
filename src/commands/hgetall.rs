use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// All fields of the hash as a JSON object with decoded values.
#[derive(Debug, PartialEq)]
pub struct Hgetall {
    pub key: String,
}

impl Executable for Hgetall {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let store = store.lock();
        Ok(store.hgetall(&self.key))
    }
}

impl TryFrom<&mut CommandParser> for Hgetall {
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
    async fn whole_hash() {
        let store = Store::new();
        store.lock().hset("h", "a", &json!(1));
        store.lock().hset("h", "b", &json!([true]));

        let cmd = Command::try_from(Request::new("hgetall", vec![json!("h")])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!({"a": 1, "b": [true]}));
    }

    #[tokio::test]
    async fn missing_hash() {
        let store = Store::new();

        let cmd = Command::try_from(Request::new("hgetall", vec![json!("h")])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!({}));
    }
}
