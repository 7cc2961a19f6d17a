//! Wire messages emitted by the in-page adapter over the console channel.
//!
//! Each message is a single line: `__qUnitTestDriver__:<json>`. Anything
//! without the prefix is ordinary page output and is not part of the protocol.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

pub const MESSAGE_PREFIX: &str = "__qUnitTestDriver__:";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed driver message ({source}): {payload}")]
    Decode {
        #[source]
        source: serde_json::Error,
        payload: String,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Log { result: LogRecord },
    Done,
}

/// One assertion as reported by the adapter's `log` callback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogRecord {
    #[serde(default)]
    pub module: Option<String>,
    pub name: String,
    pub result: bool,
    #[serde(default, deserialize_with = "present")]
    pub message: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub expected: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub actual: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub source: Option<Option<String>>,
}

/// Outer `None` only for a missing key; an explicit `null` lands in the inner value.
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Decode a console line. `Ok(None)` means the line is not a protocol message.
pub fn parse(line: &str) -> Result<Option<WireMessage>, ProtocolError> {
    let Some(payload) = line.strip_prefix(MESSAGE_PREFIX) else {
        return Ok(None);
    };

    serde_json::from_str(payload)
        .map(Some)
        .map_err(|source| ProtocolError::Decode {
            source,
            payload: truncate(payload, 200),
        })
}

/// When both sides are objects or arrays, store them as JSON text so consumers
/// never see structured values in `expected`/`actual`.
pub fn normalize_pair(
    expected: Option<Value>,
    actual: Option<Value>,
) -> (Option<Value>, Option<Value>) {
    match (expected, actual) {
        (Some(e), Some(a)) if is_structured(&e) && is_structured(&a) => (
            Some(Value::String(e.to_string())),
            Some(Value::String(a.to_string())),
        ),
        pair => pair,
    }
}

fn is_structured(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
