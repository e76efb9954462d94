pub mod del;
pub mod executable;
pub mod expire;
pub mod get;
pub mod getbit;
pub mod gettimeseries;
pub mod hget;
pub mod hgetall;
pub mod hset;
pub mod lpop;
pub mod lpush;
pub mod ltrim;
pub mod publish;
pub mod rpop;
pub mod rpush;
pub mod sadd;
pub mod set;
pub mod setbit;
pub mod settimeseries;
pub mod smembers;
pub mod srem;
pub mod strlen;
pub mod zadd;
pub mod zrange;

use serde_json::{Number, Value};
use std::vec;
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::frame::Request;
use crate::store::Store;
use crate::Error;

use del::Del;
use expire::Expire;
use get::Get;
use getbit::Getbit;
use gettimeseries::GetTimeSeries;
use hget::Hget;
use hgetall::Hgetall;
use hset::Hset;
use lpop::Lpop;
use lpush::Lpush;
use ltrim::Ltrim;
use publish::Publish;
use rpop::Rpop;
use rpush::Rpush;
use sadd::Sadd;
use set::Set;
use setbit::Setbit;
use settimeseries::SetTimeSeries;
use smembers::Smembers;
use srem::Srem;
use strlen::Strlen;
use zadd::Zadd;
use zrange::Zrange;

/// An engine command, parsed from a request. Connection level methods (transactions and
/// subscriptions) are handled by the server and never become a `Command`.
#[derive(Debug, PartialEq)]
pub enum Command {
    Del(Del),
    Expire(Expire),
    Get(Get),
    Getbit(Getbit),
    GetTimeSeries(GetTimeSeries),
    Hget(Hget),
    Hgetall(Hgetall),
    Hset(Hset),
    Lpop(Lpop),
    Lpush(Lpush),
    Ltrim(Ltrim),
    Publish(Publish),
    Rpop(Rpop),
    Rpush(Rpush),
    Sadd(Sadd),
    Set(Set),
    Setbit(Setbit),
    SetTimeSeries(SetTimeSeries),
    Smembers(Smembers),
    Srem(Srem),
    Strlen(Strlen),
    Zadd(Zadd),
    Zrange(Zrange),
}

impl Executable for Command {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        match self {
            Command::Del(cmd) => cmd.exec(store),
            Command::Expire(cmd) => cmd.exec(store),
            Command::Get(cmd) => cmd.exec(store),
            Command::Getbit(cmd) => cmd.exec(store),
            Command::GetTimeSeries(cmd) => cmd.exec(store),
            Command::Hget(cmd) => cmd.exec(store),
            Command::Hgetall(cmd) => cmd.exec(store),
            Command::Hset(cmd) => cmd.exec(store),
            Command::Lpop(cmd) => cmd.exec(store),
            Command::Lpush(cmd) => cmd.exec(store),
            Command::Ltrim(cmd) => cmd.exec(store),
            Command::Publish(cmd) => cmd.exec(store),
            Command::Rpop(cmd) => cmd.exec(store),
            Command::Rpush(cmd) => cmd.exec(store),
            Command::Sadd(cmd) => cmd.exec(store),
            Command::Set(cmd) => cmd.exec(store),
            Command::Setbit(cmd) => cmd.exec(store),
            Command::SetTimeSeries(cmd) => cmd.exec(store),
            Command::Smembers(cmd) => cmd.exec(store),
            Command::Srem(cmd) => cmd.exec(store),
            Command::Strlen(cmd) => cmd.exec(store),
            Command::Zadd(cmd) => cmd.exec(store),
            Command::Zrange(cmd) => cmd.exec(store),
        }
    }
}

impl TryFrom<Request> for Command {
    type Error = Error;

    fn try_from(request: Request) -> Result<Self, Self::Error> {
        // Method names are matched case-insensitively, so `setTimeSeries` arrives here as
        // `settimeseries`.
        let command = request.method.to_lowercase();
        let parser = &mut CommandParser {
            command: command.clone(),
            parts: request.args.into_iter(),
        };

        match &command[..] {
            "del" => Del::try_from(parser).map(Command::Del),
            "expire" => Expire::try_from(parser).map(Command::Expire),
            "get" => Get::try_from(parser).map(Command::Get),
            "getbit" => Getbit::try_from(parser).map(Command::Getbit),
            "gettimeseries" => GetTimeSeries::try_from(parser).map(Command::GetTimeSeries),
            "hget" => Hget::try_from(parser).map(Command::Hget),
            "hgetall" => Hgetall::try_from(parser).map(Command::Hgetall),
            "hset" => Hset::try_from(parser).map(Command::Hset),
            "lpop" => Lpop::try_from(parser).map(Command::Lpop),
            "lpush" => Lpush::try_from(parser).map(Command::Lpush),
            "ltrim" => Ltrim::try_from(parser).map(Command::Ltrim),
            "publish" => Publish::try_from(parser).map(Command::Publish),
            "rpop" => Rpop::try_from(parser).map(Command::Rpop),
            "rpush" => Rpush::try_from(parser).map(Command::Rpush),
            "sadd" => Sadd::try_from(parser).map(Command::Sadd),
            "set" => Set::try_from(parser).map(Command::Set),
            "setbit" => Setbit::try_from(parser).map(Command::Setbit),
            "settimeseries" => SetTimeSeries::try_from(parser).map(Command::SetTimeSeries),
            "smembers" => Smembers::try_from(parser).map(Command::Smembers),
            "srem" => Srem::try_from(parser).map(Command::Srem),
            "strlen" => Strlen::try_from(parser).map(Command::Strlen),
            "zadd" => Zadd::try_from(parser).map(Command::Zadd),
            "zrange" => Zrange::try_from(parser).map(Command::Zrange),
            _ => Err(CommandParserError::UnknownCommand {
                command: request.method,
            }
            .into()),
        }
    }
}

pub struct CommandParser {
    command: String,
    parts: vec::IntoIter<Value>,
}

impl CommandParser {
    fn next(&mut self) -> Result<Value, CommandParserError> {
        self.parts
            .next()
            .ok_or_else(|| CommandParserError::EndOfStream {
                command: self.command.clone(),
            })
    }

    fn invalid(&self, expected: &str, actual: Value) -> CommandParserError {
        CommandParserError::InvalidArgument {
            command: self.command.clone(),
            expected: expected.to_string(),
            actual,
        }
    }

    /// Keys, fields and channels. Numbers are accepted and used in their textual form.
    fn next_string(&mut self) -> Result<String, CommandParserError> {
        match self.next()? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            value => Err(self.invalid("string", value)),
        }
    }

    fn next_value(&mut self) -> Result<Value, CommandParserError> {
        self.next()
    }

    fn next_number(&mut self) -> Result<Number, CommandParserError> {
        match self.next()? {
            Value::Number(n) => Ok(n),
            Value::String(s) => match s.parse::<Number>() {
                Ok(n) => Ok(n),
                Err(_) => Err(self.invalid("number", Value::String(s))),
            },
            value => Err(self.invalid("number", value)),
        }
    }

    fn next_f64(&mut self) -> Result<f64, CommandParserError> {
        let number = self.next_number()?;
        number
            .as_f64()
            .ok_or_else(|| self.invalid("number", Value::Number(number)))
    }

    fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        let number = self.next_number()?;
        match number.as_i64() {
            Some(i) => Ok(i),
            None => match number.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(self.invalid("integer", Value::Number(number))),
            },
        }
    }

    /// All remaining arguments. May be empty.
    fn rest(&mut self) -> Vec<Value> {
        self.parts.by_ref().collect()
    }

    fn has_next(&self) -> bool {
        self.parts.len() > 0
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("Invalid command: {command}")]
    UnknownCommand { command: String },
    #[error("invalid argument for {command}; expected {expected}, got {actual}")]
    InvalidArgument {
        command: String,
        expected: String,
        actual: Value,
    },
    #[error("wrong number of arguments for {command}")]
    EndOfStream { command: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_get_command() {
        let cmd = Command::try_from(Request::new("get", vec![json!("foo")])).unwrap();
        assert_eq!(
            cmd,
            Command::Get(get::Get {
                key: String::from("foo")
            })
        );
    }

    #[test]
    fn method_names_ignore_case() {
        let cmd = Command::try_from(Request::new(
            "setTimeSeries",
            vec![json!("t"), json!(1), json!("a")],
        ))
        .unwrap();
        assert!(matches!(cmd, Command::SetTimeSeries(_)));

        let cmd = Command::try_from(Request::new("GET", vec![json!("k")])).unwrap();
        assert!(matches!(cmd, Command::Get(_)));
    }

    #[test]
    fn numeric_keys_are_strings() {
        let cmd = Command::try_from(Request::new("get", vec![json!(42)])).unwrap();
        assert_eq!(
            cmd,
            Command::Get(get::Get {
                key: String::from("42")
            })
        );
    }

    #[test]
    fn unknown_command() {
        let err = Command::try_from(Request::new("flushall", vec![])).unwrap_err();
        let err = err.downcast_ref::<CommandParserError>().unwrap();

        assert_eq!(
            *err,
            CommandParserError::UnknownCommand {
                command: "flushall".to_string()
            }
        );
        assert_eq!(err.to_string(), "Invalid command: flushall");
    }

    #[test]
    fn missing_argument() {
        let err = Command::try_from(Request::new("hset", vec![json!("h"), json!("f")])).unwrap_err();
        let err = err.downcast_ref::<CommandParserError>().unwrap();

        assert_eq!(
            *err,
            CommandParserError::EndOfStream {
                command: "hset".to_string()
            }
        );
    }

    #[test]
    fn invalid_argument() {
        let err = Command::try_from(Request::new("get", vec![json!({"a": 1})])).unwrap_err();
        let err = err.downcast_ref::<CommandParserError>().unwrap();

        assert_eq!(
            *err,
            CommandParserError::InvalidArgument {
                command: "get".to_string(),
                expected: "string".to_string(),
                actual: json!({"a": 1}),
            }
        );
    }
}
