use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

#[derive(Debug, PartialEq)]
pub struct Rpop {
    pub key: String,
}

impl Executable for Rpop {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(store.rpop(&self.key))
    }
}

impl TryFrom<&mut CommandParser> for Rpop {
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
    async fn pop_tail() {
        let store = Store::new();
        store.lock().rpush("l", &[json!("a"), json!("b")]);

        let cmd = Command::try_from(Request::new("rpop", vec![json!("l")])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!("b"));
    }

    #[tokio::test]
    async fn missing_list() {
        let store = Store::new();

        let cmd = Command::try_from(Request::new("rpop", vec![json!("l")])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), Value::Null);
    }
}
