use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::session::errors::SessionError;
use crate::session::types::{SessionRecord, StoredPayload};

/// Deepest container nesting a record may have, the record itself counting as the first level.
///
/// Both decoders refuse input past their recursion limits (128 for JSON, 256 for CBOR), so a
/// record deeper than this is rejected on encode rather than saved and lost on the next load.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Byte format of stored sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// Compact binary encoding
    #[default]
    Cbor,
    /// Human readable, handy when inspecting the store by hand
    Json,
}

impl FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cbor" => Ok(Self::Cbor),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown payload format: {other}")),
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cbor => f.write_str("cbor"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Converts session records to and from their stored byte form.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSerializer {
    format: PayloadFormat,
}

impl SessionSerializer {
    pub fn new(format: PayloadFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn encode(&self, record: &SessionRecord) -> Result<StoredPayload, SessionError> {
        if nesting_exceeds(record, MAX_NESTING_DEPTH) {
            return Err(SessionError::Serialization(format!(
                "session data nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }

        let bytes = match self.format {
            PayloadFormat::Cbor => {
                let mut buf = Vec::new();
                ciborium::into_writer(record, &mut buf)
                    .map_err(|e| SessionError::Serialization(e.to_string()))?;
                buf
            }
            PayloadFormat::Json => {
                serde_json::to_vec(record).map_err(|e| SessionError::Serialization(e.to_string()))?
            }
        };
        Ok(StoredPayload::new(bytes))
    }

    pub fn decode(&self, payload: &[u8]) -> Result<SessionRecord, SessionError> {
        match self.format {
            PayloadFormat::Cbor => ciborium::from_reader(payload)
                .map_err(|e| SessionError::CorruptPayload(e.to_string())),
            PayloadFormat::Json => serde_json::from_slice(payload)
                .map_err(|e| SessionError::CorruptPayload(e.to_string())),
        }
    }
}

/// Iterative walk, deep input must not overflow the stack.
fn nesting_exceeds(record: &SessionRecord, limit: usize) -> bool {
    let mut pending: Vec<(&Value, usize)> = record.iter().map(|(_, v)| (v, 2)).collect();
    while let Some((value, level)) = pending.pop() {
        match value {
            Value::Array(_) | Value::Object(_) if level > limit => return true,
            Value::Array(items) => pending.extend(items.iter().map(|child| (child, level + 1))),
            Value::Object(map) => pending.extend(map.values().map(|child| (child, level + 1))),
            _ => {}
        }
    }
    false
}
