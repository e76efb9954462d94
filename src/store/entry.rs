use bytes::BytesMut;
use serde_json::{Map, Number, Value};
use std::collections::{HashMap, VecDeque};
use strum_macros::Display;

use crate::store::encoding::{Codec, Stored};

/// The value held by a key.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum Entry {
    Scalar(Stored),
    List(VecDeque<Stored>),
    /// Members are kept raw, in insertion order.
    Set(Vec<Value>),
    Hash(HashMap<String, Stored>),
    /// Member to encoded score. Ordering is computed on read.
    SortedSet(HashMap<String, Stored>),
    /// `(timestamp, value)` points sorted by timestamp.
    TimeSeries(Vec<(Number, Stored)>),
    Bitmap(BytesMut),
}

impl Entry {
    /// Decoded JSON view of the entry, as returned by `get` and compared by
    /// transaction watches.
    pub fn render(&self, codec: &Codec) -> Value {
        match self {
            Entry::Scalar(stored) => codec.decode(stored),
            Entry::List(items) => Value::Array(items.iter().map(|v| codec.decode(v)).collect()),
            Entry::Set(members) => Value::Array(members.clone()),
            Entry::Hash(fields) | Entry::SortedSet(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(field, v)| (field.clone(), codec.decode(v)))
                    .collect::<Map<_, _>>(),
            ),
            Entry::TimeSeries(points) => Value::Array(
                points
                    .iter()
                    .map(|(ts, v)| Value::Array(vec![Value::Number(ts.clone()), codec.decode(v)]))
                    .collect(),
            ),
            Entry::Bitmap(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        }
    }
}

/// Set membership equality: primitives compare by value (numbers numerically),
/// arrays and objects are distinct instances and never equal anything.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => false,
    }
}

/// Truthiness of a decoded value: null, false, zero and the empty string are
/// falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
