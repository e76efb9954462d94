use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Sets `field` in the hash at `key`. Returns 1 for a new field and 0 for an update.
#[derive(Debug, PartialEq)]
pub struct Hset {
    pub key: String,
    pub field: String,
    pub value: Value,
}

impl Executable for Hset {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(Value::from(store.hset(&self.key, &self.field, &self.value)))
    }
}

impl TryFrom<&mut CommandParser> for Hset {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let field = parser.next_string()?;
        let value = parser.next_value()?;

        Ok(Self { key, field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::frame::Request;
    use serde_json::json;

    #[tokio::test]
    async fn new_and_updated_fields() {
        let store = Store::new();

        let cmd = Command::try_from(Request::new(
            "hset",
            vec![json!("h"), json!("f"), json!(1)],
        ))
        .unwrap();
        assert_eq!(
            cmd,
            Command::Hset(Hset {
                key: "h".to_string(),
                field: "f".to_string(),
                value: json!(1),
            })
        );
        assert_eq!(cmd.exec(&store).unwrap(), json!(1));

        let cmd = Command::try_from(Request::new(
            "hset",
            vec![json!("h"), json!("f"), json!(2)],
        ))
        .unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!(0));
        assert_eq!(store.lock().hget("h", "f"), json!(2));
    }

    #[tokio::test]
    async fn heals_wrong_type() {
        let store = Store::new();
        store.lock().rpush("h", &[json!("x")]);

        let cmd = Command::try_from(Request::new(
            "hset",
            vec![json!("h"), json!("f"), json!("v")],
        ))
        .unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!(1));
        assert_eq!(store.lock().hgetall("h"), json!({"f": "v"}));
    }
}
