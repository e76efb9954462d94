//! Compact tagged binary encoding for scalar values.
//!
//! The first byte of an encoded buffer identifies the type of the value:
//!
//! | tag           | payload                                                 |
//! |---------------|---------------------------------------------------------|
//! | `0xFF`        | null                                                    |
//! | `0x00`/`0x01` | false / true                                            |
//! | `0x02`        | zigzag varint (little-endian groups of 7 bits)          |
//! | `0x03`        | 16-bit float: 1 sign, 5 exponent, 10 mantissa bits      |
//! | `0x11`        | 4-byte intern id followed by a raw deflate stream       |
//! | `0x20 + n`    | `n <= 8` boolean flags packed into a single byte        |
//! | `0x80 + len`  | UTF-8 string of at most 44 bytes                        |
//!
//! Anything that does not fit one of these shapes is kept as a raw JSON value.
//! Integers are exact, other numbers are stored with half precision.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::warn;

pub const TAG_NULL: u8 = 0xFF;
pub const TAG_FALSE: u8 = 0x00;
pub const TAG_TRUE: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_FLOAT: u8 = 0x03;
pub const TAG_LONG_STRING: u8 = 0x11;
pub const TAG_BOOL_VECTOR: u8 = 0x20;
pub const TAG_SHORT_STRING: u8 = 0x80;

/// Strings up to this many bytes are stored inline, longer ones are compressed.
pub const MAX_INLINE_STRING: usize = 44;

pub const MAX_BOOL_VECTOR: usize = 8;

/// Largest finite magnitude representable with half precision.
const MAX_HALF: f64 = 65504.0;

/// A value as it sits in the keyspace.
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    /// Tagged buffer produced by [`Codec::encode`].
    Encoded(Bytes),
    /// Untagged pass-through for values the codec does not handle.
    Raw(Value),
}

#[derive(Debug, ThisError)]
pub enum DecodeError {
    #[error("empty buffer")]
    Empty,
    #[error("unknown tag byte {0:#04x}")]
    UnknownTag(u8),
    #[error("buffer ended before the value was complete")]
    Truncated,
    #[error("varint does not fit in 64 bits")]
    VarintOverflow,
    #[error("invalid UTF-8 string")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("failed to inflate string: {0}")]
    Inflate(#[from] std::io::Error),
}

#[derive(Debug)]
struct Interned {
    text: Arc<str>,
    compressed: Bytes,
}

/// Maps long strings to sequential ids. Both directions are hashed, so
/// encoding and decoding an interned string is O(1).
#[derive(Debug, Default)]
pub struct InternTable {
    ids: HashMap<Arc<str>, u32>,
    entries: HashMap<u32, Interned>,
    next_id: u32,
}

impl InternTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn id_of(&self, text: &str) -> Option<u32> {
        self.ids.get(text).copied()
    }

    pub fn lookup(&self, id: u32) -> Option<&str> {
        self.entries.get(&id).map(|entry| entry.text.as_ref())
    }

    fn intern(&mut self, text: &str) -> std::io::Result<(u32, Bytes)> {
        if let Some(id) = self.ids.get(text) {
            let compressed = self.entries[id].compressed.clone();
            return Ok((*id, compressed));
        }

        let compressed = deflate(text.as_bytes())?;
        let id = self.next_id;
        self.next_id += 1;

        let text: Arc<str> = Arc::from(text);
        self.ids.insert(text.clone(), id);
        self.entries.insert(
            id,
            Interned {
                text,
                compressed: compressed.clone(),
            },
        );
        Ok((id, compressed))
    }
}

/// Encoder/decoder pair. Owns the intern table used for long strings.
#[derive(Debug, Default)]
pub struct Codec {
    interned: InternTable,
}

impl Codec {
    pub fn new() -> Codec {
        Codec::default()
    }

    pub fn intern_table(&self) -> &InternTable {
        &self.interned
    }

    pub fn encode(&mut self, value: &Value) -> Stored {
        let mut buf = BytesMut::new();

        match value {
            Value::Null => buf.put_u8(TAG_NULL),
            Value::Bool(false) => buf.put_u8(TAG_FALSE),
            Value::Bool(true) => buf.put_u8(TAG_TRUE),
            Value::Number(number) => match classify(number) {
                Some(Numeric::Integer(i)) => {
                    buf.put_u8(TAG_INTEGER);
                    put_varint(&mut buf, zigzag(i));
                }
                Some(Numeric::Float(f)) => {
                    buf.put_u8(TAG_FLOAT);
                    buf.put_u16_le(half_from_f64(f));
                }
                None => return Stored::Raw(value.clone()),
            },
            Value::String(s) if s.len() <= MAX_INLINE_STRING => {
                buf.put_u8(TAG_SHORT_STRING + s.len() as u8);
                buf.put_slice(s.as_bytes());
            }
            Value::String(s) => match self.interned.intern(s) {
                Ok((id, compressed)) => {
                    buf.put_u8(TAG_LONG_STRING);
                    buf.put_u32_le(id);
                    buf.put_slice(&compressed);
                }
                Err(err) => {
                    warn!("failed to compress string, storing raw: {}", err);
                    return Stored::Raw(value.clone());
                }
            },
            Value::Array(items) if is_bool_vector(items) => {
                let mut bits = 0u8;
                for (i, item) in items.iter().enumerate() {
                    if item.as_bool() == Some(true) {
                        bits |= 1 << i;
                    }
                }
                buf.put_u8(TAG_BOOL_VECTOR + items.len() as u8);
                buf.put_u8(bits);
            }
            _ => return Stored::Raw(value.clone()),
        }

        Stored::Encoded(buf.freeze())
    }

    /// Decodes a stored value. Buffers are only ever produced by `encode` or
    /// validated on load, so a malformed one is logged and read as null.
    pub fn decode(&self, stored: &Stored) -> Value {
        match stored {
            Stored::Raw(value) => value.clone(),
            Stored::Encoded(bytes) => self.try_decode(bytes).unwrap_or_else(|err| {
                warn!("failed to decode stored value: {}", err);
                Value::Null
            }),
        }
    }

    pub fn try_decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        decode_bytes(bytes, Some(&self.interned))
    }

    /// Decodes a buffer produced by another codec instance (for example one
    /// loaded from a snapshot) and encodes it again with this one, so long
    /// strings get ids from this intern table.
    pub fn reencode(&mut self, bytes: &[u8]) -> Result<Stored, DecodeError> {
        let value = decode_bytes(bytes, None)?;
        Ok(self.encode(&value))
    }
}

fn decode_bytes(bytes: &[u8], interned: Option<&InternTable>) -> Result<Value, DecodeError> {
    let mut src = bytes;
    if !src.has_remaining() {
        return Err(DecodeError::Empty);
    }

    let tag = src.get_u8();
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_FALSE => Value::Bool(false),
        TAG_TRUE => Value::Bool(true),
        TAG_INTEGER => Value::from(unzigzag(get_varint(&mut src)?)),
        TAG_FLOAT => {
            if src.remaining() < 2 {
                return Err(DecodeError::Truncated);
            }
            let value = half_to_f64(src.get_u16_le());
            Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
        }
        TAG_LONG_STRING => {
            if src.remaining() < 4 {
                return Err(DecodeError::Truncated);
            }
            let id = src.get_u32_le();
            match interned.and_then(|table| table.lookup(id)) {
                Some(text) => Value::String(text.to_string()),
                None => Value::String(inflate(src)?),
            }
        }
        tag if (TAG_BOOL_VECTOR..=TAG_BOOL_VECTOR + MAX_BOOL_VECTOR as u8).contains(&tag) => {
            if !src.has_remaining() {
                return Err(DecodeError::Truncated);
            }
            let count = (tag - TAG_BOOL_VECTOR) as usize;
            let bits = src.get_u8();
            Value::Array((0..count).map(|i| Value::Bool(bits & (1 << i) != 0)).collect())
        }
        tag if (TAG_SHORT_STRING..=TAG_SHORT_STRING + MAX_INLINE_STRING as u8).contains(&tag) => {
            let len = (tag - TAG_SHORT_STRING) as usize;
            if src.remaining() < len {
                return Err(DecodeError::Truncated);
            }
            Value::String(String::from_utf8(src[..len].to_vec())?)
        }
        tag => return Err(DecodeError::UnknownTag(tag)),
    };

    Ok(value)
}

enum Numeric {
    Integer(i64),
    Float(f64),
}

// Integral floats such as `2.0` are treated as integers. Non-integers beyond the
// half precision range would decode to infinity, so they are not encoded.
fn classify(number: &Number) -> Option<Numeric> {
    if let Some(i) = number.as_i64() {
        return Some(Numeric::Integer(i));
    }
    if number.is_u64() {
        return None;
    }

    let f = number.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return Some(Numeric::Integer(f as i64));
    }
    if f.abs() > MAX_HALF {
        return None;
    }
    Some(Numeric::Float(f))
}

fn is_bool_vector(items: &[Value]) -> bool {
    items.len() <= MAX_BOOL_VECTOR && items.iter().all(Value::is_boolean)
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

fn get_varint(src: &mut &[u8]) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    let mut shift = 0;

    loop {
        if !src.has_remaining() {
            return Err(DecodeError::Truncated);
        }
        if shift >= 64 {
            return Err(DecodeError::VarintOverflow);
        }
        let byte = src.get_u8();
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Rounds to the nearest half precision value, ties to even.
fn half_from_f64(value: f64) -> u16 {
    let bits = (value as f32).to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        let nan = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }

    let exponent = exponent - 127 + 15;
    if exponent >= 0x1f {
        return sign | 0x7c00;
    }

    if exponent <= 0 {
        // Subnormal or zero.
        if exponent < -10 {
            return sign;
        }
        let mantissa = mantissa | 0x0080_0000;
        let shift = (14 - exponent) as u32;
        let halfway = 1u32 << (shift - 1);
        let rounded = mantissa + halfway - 1 + ((mantissa >> shift) & 1);
        return sign | (rounded >> shift) as u16;
    }

    let rounded = mantissa + 0x0fff + ((mantissa >> 13) & 1);
    if rounded & 0x0080_0000 != 0 {
        let exponent = exponent + 1;
        if exponent >= 0x1f {
            return sign | 0x7c00;
        }
        return sign | ((exponent as u16) << 10);
    }

    sign | ((exponent as u16) << 10) | (rounded >> 13) as u16
}

fn half_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let mantissa = (bits & 0x03ff) as f64;

    match exponent {
        0 => sign * mantissa * 2f64.powi(-24),
        0x1f if mantissa == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + mantissa / 1024.0) * 2f64.powi(exponent - 15),
    }
}

fn deflate(data: &[u8]) -> std::io::Result<Bytes> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(Bytes::from(encoder.finish()?))
}

fn inflate(data: &[u8]) -> Result<String, DecodeError> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(String::from_utf8(out)?)
}
