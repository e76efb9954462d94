use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::store::entry::is_truthy;
use crate::store::Store;
use crate::Error;

/// Sets or clears the bit at `offset` and returns the bit's previous value. The bitmap grows
/// with zero bytes as needed.
#[derive(Debug, PartialEq)]
pub struct Setbit {
    pub key: String,
    pub offset: usize,
    pub bit: bool,
}

impl Executable for Setbit {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let mut store = store.lock();
        Ok(Value::from(store.setbit(&self.key, self.offset, self.bit)))
    }
}

impl TryFrom<&mut CommandParser> for Setbit {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let offset = next_offset(parser)?;
        let bit = is_truthy(&parser.next_value()?);

        Ok(Self { key, offset, bit })
    }
}

/// Largest bit offset accepted, which caps a bitmap at 512 MiB.
pub(crate) const MAX_OFFSET: i64 = u32::MAX as i64;

pub(crate) fn next_offset(parser: &mut CommandParser) -> Result<usize, CommandParserError> {
    let offset = parser.next_integer()?;
    if !(0..=MAX_OFFSET).contains(&offset) {
        return Err(parser.invalid("offset between 0 and 4294967295", Value::from(offset)));
    }
    usize::try_from(offset).map_err(|_| parser.invalid("offset", Value::from(offset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::frame::Request;
    use serde_json::json;

    #[tokio::test]
    async fn returns_previous_bit() {
        let store = Store::new();

        let cmd = Command::try_from(Request::new(
            "setbit",
            vec![json!("b"), json!(9), json!(1)],
        ))
        .unwrap();
        assert_eq!(
            cmd,
            Command::Setbit(Setbit {
                key: "b".to_string(),
                offset: 9,
                bit: true,
            })
        );
        assert_eq!(cmd.exec(&store).unwrap(), json!(0));

        let cmd = Command::try_from(Request::new(
            "setbit",
            vec![json!("b"), json!(9), json!(0)],
        ))
        .unwrap();
        assert_eq!(cmd.exec(&store).unwrap(), json!(1));
        assert_eq!(store.lock().strlen("b"), 2);
    }

    #[test]
    fn negative_offset() {
        let err = Command::try_from(Request::new(
            "setbit",
            vec![json!("b"), json!(-1), json!(1)],
        ))
        .unwrap_err();
        let err = err.downcast_ref::<CommandParserError>().unwrap();

        assert_eq!(
            *err,
            CommandParserError::InvalidArgument {
                command: "setbit".to_string(),
                expected: "offset between 0 and 4294967295".to_string(),
                actual: json!(-1),
            }
        );
    }

    #[test]
    fn offset_upper_bound() {
        let cmd = Command::try_from(Request::new(
            "setbit",
            vec![json!("b"), json!(MAX_OFFSET), json!(1)],
        ))
        .unwrap();
        assert!(matches!(cmd, Command::Setbit(Setbit { offset, .. }) if offset == u32::MAX as usize));

        let err = Command::try_from(Request::new(
            "setbit",
            vec![json!("b"), json!(4611686018427387904i64), json!(1)],
        ))
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CommandParserError>(),
            Some(CommandParserError::InvalidArgument { .. })
        ));
    }
}
