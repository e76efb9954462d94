use serde_json::Value;
use std::future::Future;

use crate::client::{Client, ClientResult};

/// The typed command surface, shared by [`Client`] and
/// [`ClientPool`](crate::client::ClientPool). Every method is a thin wrapper over
/// [`Commands::send_command`].
pub trait Commands {
    fn send_command(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = ClientResult<Value>> + Send;

    fn set(&self, key: &str, value: impl Into<Value>) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("set", vec![key.into(), value.into()])
    }

    fn get(&self, key: &str) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("get", vec![key.into()])
    }

    fn del(&self, key: &str) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("del", vec![key.into()])
    }

    fn expire(&self, key: &str, seconds: f64) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("expire", vec![key.into(), seconds.into()])
    }

    fn lpush(&self, key: &str, values: Vec<Value>) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("lpush", with_key(key, values))
    }

    fn rpush(&self, key: &str, values: Vec<Value>) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("rpush", with_key(key, values))
    }

    fn lpop(&self, key: &str) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("lpop", vec![key.into()])
    }

    fn rpop(&self, key: &str) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("rpop", vec![key.into()])
    }

    fn ltrim(&self, key: &str, start: i64, stop: i64) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("ltrim", vec![key.into(), start.into(), stop.into()])
    }

    fn sadd(&self, key: &str, members: Vec<Value>) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("sadd", with_key(key, members))
    }

    fn srem(&self, key: &str, members: Vec<Value>) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("srem", with_key(key, members))
    }

    fn smembers(&self, key: &str) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("smembers", vec![key.into()])
    }

    fn hset(
        &self,
        key: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("hset", vec![key.into(), field.into(), value.into()])
    }

    fn hget(&self, key: &str, field: &str) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("hget", vec![key.into(), field.into()])
    }

    fn hgetall(&self, key: &str) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("hgetall", vec![key.into()])
    }

    fn zadd(
        &self,
        key: &str,
        score: impl Into<Value>,
        member: &str,
    ) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("zadd", vec![key.into(), score.into(), member.into()])
    }

    fn zrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        with_scores: bool,
    ) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command(
            "zrange",
            vec![key.into(), start.into(), stop.into(), with_scores.into()],
        )
    }

    fn setbit(&self, key: &str, offset: u64, bit: bool) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("setbit", vec![key.into(), offset.into(), (bit as u8).into()])
    }

    fn getbit(&self, key: &str, offset: u64) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("getbit", vec![key.into(), offset.into()])
    }

    fn strlen(&self, key: &str) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("strlen", vec![key.into()])
    }

    fn set_time_series(
        &self,
        key: &str,
        timestamp: impl Into<Value>,
        value: impl Into<Value>,
    ) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command(
            "setTimeSeries",
            vec![key.into(), timestamp.into(), value.into()],
        )
    }

    fn get_time_series(
        &self,
        key: &str,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("getTimeSeries", vec![key.into(), start.into(), end.into()])
    }

    fn publish(&self, channel: &str, message: impl Into<Value>) -> impl Future<Output = ClientResult<Value>> + Send {
        self.send_command("publish", vec![channel.into(), message.into()])
    }
}

fn with_key(key: &str, values: Vec<Value>) -> Vec<Value> {
    let mut args = Vec::with_capacity(values.len() + 1);
    args.push(Value::from(key));
    args.extend(values);
    args
}

impl Commands for Client {
    fn send_command(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = ClientResult<Value>> + Send {
        Client::send_command(self, method, args)
    }
}
