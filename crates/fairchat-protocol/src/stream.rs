//! Streaming body framing.

use serde::{Deserialize, Serialize};

/// Prefix marking a line that carries a payload.
pub const STREAM_DATA_PREFIX: &str = "data: ";

/// Payload value that terminates the stream.
pub const STREAM_DONE: &str = "[DONE]";

/// One decoded unit of a streaming reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPayload {
    #[serde(alias = "text")]
    pub chunk: String,
}

impl StreamPayload {
    /// Render this payload as a complete stream line, including the newline.
    pub fn to_line(&self) -> String {
        // Serializing a struct with one string field cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{STREAM_DATA_PREFIX}{json}\n")
    }
}
