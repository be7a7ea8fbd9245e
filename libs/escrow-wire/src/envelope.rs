use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound websocket frame as the server sends it.
///
/// A non-null `error` is surfaced to the user and the frame is otherwise
/// ignored; a null `kind` is dropped and logged by the read loop.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub payload: Value,

    #[serde(default)]
    pub error: Option<String>,
}

/// Outbound websocket frame: `{type, payload}`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: &'static str,

    pub payload: Value,
}
