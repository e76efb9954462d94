use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::setbit::next_offset;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// The bit at `offset`, or 0 past the end of the bitmap.
#[derive(Debug, PartialEq)]
pub struct Getbit {
    pub key: String,
    pub offset: usize,
}

impl Executable for Getbit {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let store = store.lock();
        Ok(Value::from(store.getbit(&self.key, self.offset)))
    }
}

impl TryFrom<&mut CommandParser> for Getbit {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let offset = next_offset(parser)?;

        Ok(Self { key, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::frame::Request;
    use serde_json::json;

    #[tokio::test]
    async fn most_significant_bit_first() {
        let store = Store::new();
        store.lock().setbit("b", 0, true);

        let cmd = Command::try_from(Request::new("getbit", vec![json!("b"), json!(0)])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!(1));

        let cmd = Command::try_from(Request::new("getbit", vec![json!("b"), json!(7)])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!(0));

        let cmd = Command::try_from(Request::new("getbit", vec![json!("b"), json!(100)])).unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!(0));
    }
}
