//! Inbound wire events and their parsing.
//!
//! Events arrive as JSON text frames shaped `{"type": ..., "payload": ...}`.
//! The tag set is closed; an unrecognized tag parses to
//! [`WireEvent::Unknown`] so the session has one explicit fallback path
//! instead of silent field access on a dynamic payload.

#[cfg(test)]
#[path = "event_test.rs"]
mod event_test;

use serde::Deserialize;

/// Error for a malformed or unparseable inbound payload.
///
/// Never escapes the session boundary: a malformed frame is dropped and
/// logged, state untouched.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A decoded frame from the transport socket.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum WireEvent {
    /// A message arrived in some conversation.
    #[serde(rename = "NEW_MESSAGE")]
    NewMessage(IncomingMessage),
    /// A conversation was created or changed server-side.
    #[serde(rename = "CHAT_UPDATE")]
    ChatUpdate(ChatPatch),
    /// Advisory transport status from the server. Never written to the
    /// published connection state; the status poll is authoritative.
    #[serde(rename = "STATUS_UPDATE")]
    StatusUpdate(serde_json::Value),
    /// Server-reported failure.
    #[serde(rename = "ERROR")]
    Error(ServerError),
    /// Keepalive response.
    #[serde(rename = "PONG")]
    Pong,
    /// Unrecognized tag.
    #[serde(other)]
    Unknown,
}

/// Payload of a `NEW_MESSAGE` frame.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct IncomingMessage {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    /// Server message id; absent for some gateway sources.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "fromMe", default)]
    pub from_me: bool,
    #[serde(default)]
    pub timestamp: String,
}

/// Payload of a `CHAT_UPDATE` frame. All fields except the id are
/// optional; present fields are merged over the existing conversation.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ChatPatch {
    pub id: String,
    #[serde(rename = "contactName", default)]
    pub name: Option<String>,
    #[serde(rename = "lastMessageContent", default)]
    pub last_message: Option<String>,
    #[serde(rename = "lastMessageTimestamp", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "unreadCount", default)]
    pub unread: Option<u32>,
}

/// Payload of an `ERROR` frame.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ServerError {
    #[serde(default)]
    pub message: Option<String>,
}

/// Parse one text frame from the socket.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] when the frame is not valid JSON
/// or its payload does not match the tagged shape.
pub fn parse_event(raw: &str) -> Result<WireEvent, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}
