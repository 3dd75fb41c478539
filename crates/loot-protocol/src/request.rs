//! Request messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ops::Operation;

/// A request for the worker to run one engine operation.
///
/// Requests are immutable once built; the controller stamps the optional
/// `id` when the request is admitted to the call queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Operation to run.
    #[serde(rename = "type")]
    pub op: Operation,

    /// Positional arguments, shapes defined by the engine.
    #[serde(default)]
    pub args: Vec<Value>,

    /// Correlation id, echoed by the worker on the terminal message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Request {
    pub fn new(op: Operation, args: Vec<Value>) -> Self {
        Self { op, args, id: None }
    }

    /// Return a copy of this request carrying the given correlation id.
    pub fn with_id(self, id: u64) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    /// Encode as a single line of JSON (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let request = Request::new(Operation::LoadPlugins, vec![json!(["a.esp"]), json!(true)]).with_id(7);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"type": "loadPlugins", "args": [["a.esp"], true], "id": 7}));
    }

    #[test]
    fn test_id_and_args_optional() {
        let request = Request::from_line(r#"{"type":"getLoadOrder"}"#).unwrap();
        assert_eq!(request.op, Operation::GetLoadOrder);
        assert!(request.args.is_empty());
        assert_eq!(request.id, None);

        let line = request.to_line().unwrap();
        assert!(!line.contains("id"));
    }
}
