//! JSON messages exchanged between clients and the server.
//!
//! Requests are `{"method": ..., "args": [...]}` objects. Responses are one JSON object per line:
//! `{"success": true, "result": ...}`, `{"success": false, "error": ...}` or an unsolicited
//! `{"type": "message", "channel": ..., "message": ...}` push for subscribers.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Request {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Request {
        Request {
            method: method.into(),
            args,
        }
    }
}

/// A request as cut from the receive buffer. Text that is not a valid request is kept so the
/// server can answer it without dropping the connection.
#[derive(Debug)]
pub enum Frame {
    Request(Request),
    Malformed(serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawResponse")]
pub enum Response {
    Ok(Value),
    Error(String),
    Message { channel: String, message: Value },
}

impl Response {
    pub fn ok(result: impl Into<Value>) -> Response {
        Response::Ok(result.into())
    }

    pub fn error(message: impl ToString) -> Response {
        Response::Error(message.to_string())
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        match self {
            Response::Ok(result) => {
                map.serialize_entry("success", &true)?;
                map.serialize_entry("result", result)?;
            }
            Response::Error(error) => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
            }
            Response::Message { channel, message } => {
                map.serialize_entry("type", "message")?;
                map.serialize_entry("channel", channel)?;
                map.serialize_entry("message", message)?;
            }
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(rename = "type")]
    kind: Option<String>,
    channel: Option<String>,
    message: Option<Value>,
    success: Option<bool>,
    result: Option<Value>,
    error: Option<Value>,
}

impl TryFrom<RawResponse> for Response {
    type Error = Error;

    fn try_from(raw: RawResponse) -> Result<Self, Error> {
        if raw.kind.as_deref() == Some("message") {
            let channel = raw
                .channel
                .ok_or_else(|| Error::InvalidResponse("message without channel".to_string()))?;
            return Ok(Response::Message {
                channel,
                message: raw.message.unwrap_or(Value::Null),
            });
        }

        match raw.success {
            Some(true) => Ok(Response::Ok(raw.result.unwrap_or(Value::Null))),
            Some(false) => Ok(Response::Error(match raw.error {
                Some(Value::String(error)) => error,
                Some(error) => error.to_string(),
                None => "unknown error".to_string(),
            })),
            None => Err(Error::InvalidResponse(
                "missing success field".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialize_responses() {
        let ok = serde_json::to_value(Response::ok("OK")).unwrap();
        assert_eq!(ok, json!({"success": true, "result": "OK"}));

        let null = serde_json::to_value(Response::Ok(Value::Null)).unwrap();
        assert_eq!(null, json!({"success": true, "result": null}));

        let err = serde_json::to_value(Response::error("Invalid command")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "Invalid command"}));

        let message = serde_json::to_value(Response::Message {
            channel: "news".to_string(),
            message: json!("hi"),
        })
        .unwrap();
        assert_eq!(
            message,
            json!({"type": "message", "channel": "news", "message": "hi"})
        );
    }

    #[test]
    fn parse_responses() {
        let parse = |s: &str| serde_json::from_str::<Response>(s).unwrap();

        assert_eq!(parse(r#"{"success":true,"result":[1,2]}"#), Response::Ok(json!([1, 2])));
        assert_eq!(parse(r#"{"success":true,"result":null}"#), Response::Ok(Value::Null));
        assert_eq!(parse(r#"{"success":true}"#), Response::Ok(Value::Null));
        assert_eq!(
            parse(r#"{"success":false,"error":"EXEC without MULTI"}"#),
            Response::Error("EXEC without MULTI".to_string())
        );
        assert_eq!(
            parse(r#"{"type":"message","channel":"c","message":{"a":1}}"#),
            Response::Message {
                channel: "c".to_string(),
                message: json!({"a": 1})
            }
        );
        assert!(serde_json::from_str::<Response>(r#"{"result":1}"#).is_err());
    }

    #[test]
    fn parse_request_without_args() {
        let request: Request = serde_json::from_str(r#"{"method":"multi"}"#).unwrap();
        assert_eq!(request, Request::new("multi", vec![]));
    }
}
