//! Messages emitted by the worker.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ProtocolError;
use crate::log::{LogLevel, LogNotification};

/// One inbound message from the worker.
///
/// On the wire exactly one of `error`, `result` or `log` is present. `Error`
/// and `Result` are terminal: each dispatched request receives exactly one of
/// them. `Log` may arrive at any time and is never correlated with a call.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Error {
        error: String,
        /// Structured data about the failure (e.g. the cycle of a sort error).
        details: Option<Value>,
        id: Option<u64>,
    },
    Result {
        result: Value,
        id: Option<u64>,
    },
    Log {
        log: LogNotification,
    },
}

impl WorkerMessage {
    pub fn result(result: Value) -> Self {
        WorkerMessage::Result { result, id: None }
    }

    pub fn error(error: impl Into<String>) -> Self {
        WorkerMessage::Error {
            error: error.into(),
            details: None,
            id: None,
        }
    }

    pub fn error_with_details(error: impl Into<String>, details: Value) -> Self {
        WorkerMessage::Error {
            error: error.into(),
            details: Some(details),
            id: None,
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        WorkerMessage::Log {
            log: LogNotification::new(level, message),
        }
    }

    /// Attach a correlation id. Log messages are returned unchanged.
    pub fn with_id(self, new_id: Option<u64>) -> Self {
        match self {
            WorkerMessage::Error { error, details, .. } => WorkerMessage::Error {
                error,
                details,
                id: new_id,
            },
            WorkerMessage::Result { result, .. } => WorkerMessage::Result { result, id: new_id },
            log @ WorkerMessage::Log { .. } => log,
        }
    }

    /// True for `error` and `result` messages.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerMessage::Log { .. })
    }

    pub fn id(&self) -> Option<u64> {
        match self {
            WorkerMessage::Error { id, .. } | WorkerMessage::Result { id, .. } => *id,
            WorkerMessage::Log { .. } => None,
        }
    }

    /// Decode one line of worker output.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        match serde_json::from_str::<Value>(line)? {
            Value::Object(map) => Self::try_from(map),
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    /// Encode as a single line of JSON (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            WorkerMessage::Error { error, details, id } => {
                map.insert("error".into(), Value::String(error.clone()));
                if let Some(details) = details {
                    map.insert("details".into(), details.clone());
                }
                if let Some(id) = id {
                    map.insert("id".into(), Value::from(*id));
                }
            }
            WorkerMessage::Result { result, id } => {
                map.insert("result".into(), result.clone());
                if let Some(id) = id {
                    map.insert("id".into(), Value::from(*id));
                }
            }
            WorkerMessage::Log { log } => {
                map.insert(
                    "log".into(),
                    serde_json::json!({ "level": log.level, "message": log.message }),
                );
            }
        }
        map
    }
}

impl TryFrom<Map<String, Value>> for WorkerMessage {
    type Error = ProtocolError;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, ProtocolError> {
        let present: Vec<&'static str> = ["error", "result", "log"]
            .into_iter()
            .filter(|key| map.contains_key(*key))
            .collect();
        if present.len() > 1 {
            return Err(ProtocolError::Ambiguous(present));
        }

        // The id only cross-checks FIFO order, so a bad one must not cost the reply.
        let id = match map.remove("id") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let id = value.as_u64();
                if id.is_none() {
                    warn!(id = %value, "ignoring non-integer message id");
                }
                id
            }
        };

        match present.first().copied() {
            Some("error") => {
                let error = match map.remove("error").unwrap_or_default() {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                let details = map.remove("details").filter(|d| !d.is_null());
                Ok(WorkerMessage::Error { error, details, id })
            }
            Some("result") => Ok(WorkerMessage::Result {
                result: map.remove("result").unwrap_or(Value::Null),
                id,
            }),
            Some(_) => {
                let raw = map.remove("log").unwrap_or(Value::Null);
                Ok(WorkerMessage::Log { log: parse_log(raw)? })
            }
            None => Err(ProtocolError::Empty),
        }
    }
}

/// Parse a log payload; the level may be a name or the engine's numeric code.
fn parse_log(raw: Value) -> Result<LogNotification, ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidField { field: "log", reason };

    let level = match raw.get("level") {
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(LogLevel::from_code)
            .ok_or_else(|| invalid(format!("unknown level code {}", n)))?,
        Some(Value::String(name)) => name.parse::<LogLevel>().map_err(invalid)?,
        _ => return Err(invalid("missing level".to_string())),
    };
    let message = match raw.get("message") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    Ok(LogNotification { level, message })
}

impl Serialize for WorkerMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WorkerMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        WorkerMessage::try_from(map).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_result_with_null_payload() {
        let msg = WorkerMessage::decode(r#"{"result":null,"id":3}"#).unwrap();
        assert_eq!(msg, WorkerMessage::Result { result: Value::Null, id: Some(3) });
        assert!(msg.is_terminal());
    }

    #[test]
    fn test_decode_error_with_details() {
        let msg = WorkerMessage::decode(
            r#"{"error":"Cyclic interaction detected","details":{"cycle":[]}}"#,
        )
        .unwrap();
        match msg {
            WorkerMessage::Error { error, details, id } => {
                assert_eq!(error, "Cyclic interaction detected");
                assert_eq!(details, Some(json!({"cycle": []})));
                assert_eq!(id, None);
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_log_by_name_and_code() {
        let named = WorkerMessage::decode(r#"{"log":{"level":"warning","message":"hi"}}"#).unwrap();
        let coded = WorkerMessage::decode(r#"{"log":{"level":3,"message":"hi"}}"#).unwrap();
        assert_eq!(named, coded);
        assert!(!named.is_terminal());
    }

    #[test]
    fn test_decode_log_level_aliases() {
        for level in ["warn", "WARNING", "Warning"] {
            let line = format!(r#"{{"log":{{"level":"{}","message":"hi"}}}}"#, level);
            assert_eq!(
                WorkerMessage::decode(&line).unwrap(),
                WorkerMessage::log(LogLevel::Warning, "hi")
            );
        }
        assert!(matches!(
            WorkerMessage::decode(r#"{"log":{"level":"loud","message":"hi"}}"#),
            Err(ProtocolError::InvalidField { field: "log", .. })
        ));
    }

    #[test]
    fn test_decode_ignores_non_integer_id() {
        let msg = WorkerMessage::decode(r#"{"result":["a.esp"],"id":"1"}"#).unwrap();
        assert_eq!(msg, WorkerMessage::Result { result: json!(["a.esp"]), id: None });

        let msg = WorkerMessage::decode(r#"{"error":"boom","id":-4}"#).unwrap();
        assert!(matches!(msg, WorkerMessage::Error { id: None, .. }));
    }

    #[test]
    fn test_decode_rejects_ambiguous_and_empty() {
        assert!(matches!(
            WorkerMessage::decode(r#"{"error":"x","result":1}"#),
            Err(ProtocolError::Ambiguous(_))
        ));
        assert!(matches!(WorkerMessage::decode(r#"{"id":1}"#), Err(ProtocolError::Empty)));
        assert!(matches!(WorkerMessage::decode("[1,2]"), Err(ProtocolError::NotAnObject)));
        assert!(matches!(WorkerMessage::decode("nope"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        let line = WorkerMessage::error("boom").to_line().unwrap();
        assert_eq!(line, r#"{"error":"boom"}"#);

        let line = WorkerMessage::log(LogLevel::Info, "loading").to_line().unwrap();
        assert_eq!(line, r#"{"log":{"level":"info","message":"loading"}}"#);
    }
}
