//! # Hub Wire Protocol
//!
//! JSON hub protocol, version 1. Every message is a JSON object terminated
//! by the ASCII record separator `0x1E`; one transport frame may carry
//! several records and a record may be split across frames, so incoming
//! text is accumulated and split with [`drain_records`].
//!
//! | `type` | Message |
//! |--------|---------|
//! | 1 | Invocation (`target`, `arguments`, optional `invocationId`) |
//! | 3 | Completion (`invocationId`, `result` or `error`) |
//! | 6 | Ping |
//! | 7 | Close (`error`, `allowReconnect`) |
//!
//! Stream messages (2, 4, 5) and acks (8, 9) are decoded as
//! [`HubMessage::Other`] and ignored.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{LabError, LabResult};

/// Record terminator.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Protocol name sent in the handshake.
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Negotiate protocol version requested from the server.
pub const NEGOTIATE_VERSION: u32 = 1;

const TYPE_INVOCATION: u64 = 1;
const TYPE_COMPLETION: u64 = 3;
const TYPE_PING: u64 = 6;
const TYPE_CLOSE: u64 = 7;

/// Handshake record sent right after the transport connects.
pub fn handshake_request() -> String {
    let mut text = json!({ "protocol": PROTOCOL_NAME, "version": PROTOCOL_VERSION }).to_string();
    text.push(RECORD_SEPARATOR);
    text
}

/// Server answer to the handshake. An empty object means accepted.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default)]
    pub error: Option<String>,
}

/// Parse a handshake answer record.
///
/// # Errors
/// Returns [`LabError::Handshake`] on malformed JSON or a server error.
pub fn parse_handshake(record: &str) -> LabResult<()> {
    let response: HandshakeResponse =
        serde_json::from_str(record).map_err(|e| LabError::Handshake {
            reason: format!("Invalid handshake response: {e}"),
        })?;
    match response.error {
        Some(error) => Err(LabError::Handshake { reason: error }),
        None => Ok(()),
    }
}

/// Remove every complete record from `buffer`, leaving a trailing partial
/// record in place.
pub fn drain_records(buffer: &mut String) -> Vec<String> {
    let Some(last) = buffer.rfind(RECORD_SEPARATOR) else {
        return Vec::new();
    };
    let rest = buffer.split_off(last + RECORD_SEPARATOR.len_utf8());
    let complete = std::mem::replace(buffer, rest);
    complete
        .split(RECORD_SEPARATOR)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// A decoded hub message.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Any other message type; ignored by the client.
    Other(u64),
}

impl HubMessage {
    /// Serialize as one record, separator included.
    pub fn encode(&self) -> String {
        let value = match self {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                let mut v = json!({
                    "type": TYPE_INVOCATION,
                    "target": target,
                    "arguments": arguments,
                });
                if let Some(id) = invocation_id {
                    v["invocationId"] = json!(id);
                }
                v
            }
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                let mut v = json!({ "type": TYPE_COMPLETION, "invocationId": invocation_id });
                if let Some(error) = error {
                    v["error"] = json!(error);
                } else if let Some(result) = result {
                    v["result"] = result.clone();
                }
                v
            }
            HubMessage::Ping => json!({ "type": TYPE_PING }),
            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                let mut v = json!({ "type": TYPE_CLOSE, "allowReconnect": allow_reconnect });
                if let Some(error) = error {
                    v["error"] = json!(error);
                }
                v
            }
            HubMessage::Other(kind) => json!({ "type": kind }),
        };
        let mut text = value.to_string();
        text.push(RECORD_SEPARATOR);
        text
    }

    /// Decode one record (without separator).
    ///
    /// # Errors
    /// Returns [`LabError::ProtocolError`] for invalid JSON, a missing
    /// `type`, or a known type missing its required fields.
    pub fn decode(record: &str) -> LabResult<Self> {
        let value: Value = serde_json::from_str(record).map_err(|e| LabError::ProtocolError {
            reason: format!("Invalid hub message: {e}"),
        })?;
        let kind = value
            .get("type")
            .and_then(Value::as_u64)
            .ok_or_else(|| LabError::ProtocolError {
                reason: "Hub message has no type".into(),
            })?;

        let string_field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);

        Ok(match kind {
            TYPE_INVOCATION => HubMessage::Invocation {
                invocation_id: string_field("invocationId"),
                target: string_field("target").ok_or_else(|| LabError::ProtocolError {
                    reason: "Invocation message has no target".into(),
                })?,
                arguments: value
                    .get("arguments")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            },
            TYPE_COMPLETION => HubMessage::Completion {
                invocation_id: string_field("invocationId").ok_or_else(|| {
                    LabError::ProtocolError {
                        reason: "Completion message has no invocationId".into(),
                    }
                })?,
                result: value.get("result").cloned(),
                error: string_field("error"),
            },
            TYPE_PING => HubMessage::Ping,
            TYPE_CLOSE => HubMessage::Close {
                error: string_field("error"),
                allow_reconnect: value
                    .get("allowReconnect")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            other => HubMessage::Other(other),
        })
    }
}

// ─── Negotiate ──────────────────────────────────────────────────────────

/// A transport offered by the server in the negotiate response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    pub transport: String,
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

/// Body of `POST {hub}/negotiate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub connection_token: Option<String>,
    #[serde(default)]
    pub negotiate_version: Option<u32>,
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
    /// Redirect to another endpoint (e.g. a managed service).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl NegotiateResponse {
    /// Id to put on transport requests: the connection token for
    /// negotiate version 1, the connection id for version 0.
    pub fn transport_id(&self) -> Option<&str> {
        if self.negotiate_version.unwrap_or(0) >= 1 {
            self.connection_token
                .as_deref()
                .or(self.connection_id.as_deref())
        } else {
            self.connection_id.as_deref()
        }
    }

    /// Whether the server offers `transport` with the text format. An empty
    /// list is treated as "anything goes".
    pub fn supports(&self, transport: &str) -> bool {
        self.available_transports.is_empty()
            || self.available_transports.iter().any(|t| {
                t.transport.eq_ignore_ascii_case(transport)
                    && (t.transfer_formats.is_empty()
                        || t.transfer_formats.iter().any(|f| f == "Text"))
            })
    }
}
