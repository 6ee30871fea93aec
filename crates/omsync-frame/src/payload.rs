use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// Object-model reply envelope: `{"key": .., "flags": .., "result": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Object-model key the result belongs to.
    pub key: String,
    /// Flags echoed from the query (`f` marks a frequent reply).
    pub flags: String,
    /// Result value; absent and `null` both decode to [`Value::Null`].
    #[serde(default)]
    pub result: Value,
}

impl Payload {
    /// Whether the reply should be merged rather than replace the cached key.
    pub fn is_frequent(&self) -> bool {
        self.flags.contains('f')
    }
}

/// Decode one scanned candidate.
pub fn decode_payload(block: &str) -> Result<Payload, DecodeError> {
    let value: Value = serde_json::from_str(block).map_err(DecodeError::Malformed)?;
    serde_json::from_value(value).map_err(DecodeError::Unrecognized)
}
