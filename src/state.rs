//! Shared working state: conversations, messages, and board columns.
//!
//! DESIGN
//! ======
//! The working set is owned jointly by the reducer (inbound events and
//! snapshots) and the mutation coordinator (optimistic edits). Both go
//! through single lock scopes on [`SharedState`], so every transition is
//! atomic to an external observer. Connection state lives elsewhere: the
//! session owns it exclusively.

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Markers identifying broadcast/system channels that never enter state.
const FILTERED_CHANNEL_MARKERS: [&str; 2] = ["@newsletter", "@broadcast"];

/// Placeholder stored in place of raw media payloads.
pub const MEDIA_PLACEHOLDER: &str = "[media]";

const PREVIEW_MAX_CHARS: usize = 50;

/// Delivery lifecycle of a locally originated message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Appended optimistically, awaiting the remote command result.
    Pending,
    /// Acknowledged by the server, or received from it.
    #[default]
    Confirmed,
    /// The remote command failed; the entry is retained and marked.
    Failed,
}

/// A single message within a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Message text; media payloads are normalized to [`MEDIA_PLACEHOLDER`].
    pub body: String,
    pub from_me: bool,
    /// RFC 3339 instant.
    pub timestamp: String,
    #[serde(default)]
    pub delivery: Delivery,
}

/// Binding of a conversation to one board column. Both ids are always
/// present together; "unassigned" is the absence of the whole binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub board_id: String,
    pub column_id: String,
}

/// A conversation in the inbox working set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque chat id.
    pub id: String,
    /// User-editable display name override.
    pub name: Option<String>,
    /// Derived last-message preview: truncated, media redacted.
    pub preview: String,
    /// Last activity instant.
    pub timestamp: String,
    pub unread: u32,
    pub assignment: Option<Assignment>,
}

/// One kanban column and the conversations assigned to it, in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardColumn {
    pub id: String,
    pub name: String,
    /// Conversation ids, top to bottom.
    pub chats: Vec<String>,
}

/// The currently open board as an ordered sequence of columns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub columns: Vec<BoardColumn>,
}

/// Conversation/message/board state folded from events, snapshots, and
/// optimistic mutations.
#[derive(Clone, Debug, Default)]
pub struct WorkingSet {
    pub conversations: Vec<Conversation>,
    /// Per-conversation message lists, keyed by conversation id.
    pub messages: HashMap<String, Vec<Message>>,
    /// Currently selected conversation, if any.
    pub selected: Option<String>,
    /// The open board, if any.
    pub board: Option<Board>,
}

/// Handle through which the reducer and coordinator share the working set.
pub type SharedState = Arc<RwLock<WorkingSet>>;

/// Construct an empty shared working set.
#[must_use]
pub fn shared() -> SharedState {
    Arc::new(RwLock::new(WorkingSet::default()))
}

impl WorkingSet {
    /// Look up a conversation by id.
    #[must_use]
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// The column currently holding `conversation_id`, if any.
    #[must_use]
    pub fn column_of(&self, conversation_id: &str) -> Option<&BoardColumn> {
        self.board
            .as_ref()?
            .columns
            .iter()
            .find(|column| column.chats.iter().any(|id| id == conversation_id))
    }
}

/// True for broadcast/system channel ids that must never enter state.
#[must_use]
pub fn is_filtered_channel(id: &str) -> bool {
    FILTERED_CHANNEL_MARKERS
        .iter()
        .any(|marker| id.contains(marker))
}

/// Redact raw media payloads to the placeholder token.
#[must_use]
pub fn normalize_body(body: &str) -> String {
    if body.starts_with("/9j/") || body.starts_with("data:image") {
        MEDIA_PLACEHOLDER.to_owned()
    } else {
        body.to_owned()
    }
}

/// Derive a conversation preview from a message body.
#[must_use]
pub fn preview_of(body: &str) -> String {
    let normalized = normalize_body(body);
    if normalized.chars().count() > PREVIEW_MAX_CHARS {
        let head: String = normalized.chars().take(PREVIEW_MAX_CHARS - 3).collect();
        format!("{head}...")
    } else {
        normalized
    }
}

/// Format a bare subscriber id for display when it looks like a phone
/// number; anything else passes through unchanged.
#[must_use]
pub fn format_phone(raw: &str) -> String {
    if is_filtered_channel(raw) {
        return raw.to_owned();
    }
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() >= 10 {
        format!(
            "+{} {} {}-{}",
            &digits[..2],
            &digits[2..5],
            &digits[5..8],
            &digits[8..]
        )
    } else {
        raw.to_owned()
    }
}
