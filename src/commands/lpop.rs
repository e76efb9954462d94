use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

#[derive(Debug, PartialEq)]
pub struct Lpop {
    pub key: String,
}

impl Executable for Lpop {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(store.lpop(&self.key))
    }
}

impl TryFrom<&mut CommandParser> for Lpop {
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
    async fn pop_head() {
        let store = Store::new();
        store.lock().rpush("l", &[json!("a"), json!("b")]);

        let cmd = Command::try_from(Request::new("lpop", vec![json!("l")])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!("a"));
        assert_eq!(store.lock().get("l"), json!(["b"]));
    }

    #[tokio::test]
    async fn falsy_values_read_as_null() {
        let store = Store::new();
        store.lock().rpush("l", &[json!(0), json!("")]);

        let cmd = Command::try_from(Request::new("lpop", vec![json!("l")])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), Value::Null);

        let cmd = Command::try_from(Request::new("lpop", vec![json!("l")])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), Value::Null);

        assert_eq!(store.lock().get("l"), json!([]));
    }
}
