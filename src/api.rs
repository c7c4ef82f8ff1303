//! Identity and remote command ports, with the HTTP implementation.
//!
//! ARCHITECTURE
//! ============
//! All durable state lives behind [`CommandPort`]; the core only speaks
//! single request/response calls here, with the websocket as the sole
//! push channel. The [`Identity`] port supplies the subject id and
//! bearer credential; issuance and refresh are someone else's problem.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::state::{self, Assignment, Conversation, Delivery, Message};

/// Failure surfaced by a remote command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Transport unreachable, or the round-trip bound expired.
    #[error("network failure: {0}")]
    Network(String),
    /// The server returned a structured failure.
    #[error("rejected by server: {0}")]
    Rejected(String),
    /// A required selection was missing on the caller's side.
    #[error("invalid request: {0}")]
    Validation(&'static str),
}

/// Supplies the authenticated subject and bearer credential.
#[async_trait]
pub trait Identity: Send + Sync {
    /// Stable subject id for the logged-in user.
    fn subject(&self) -> &str;

    /// Bearer credential for outbound calls.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Network`] when no credential can be
    /// produced.
    async fn bearer(&self) -> Result<String, CommandError>;
}

/// Fixed identity for tests and single-session tools.
#[derive(Clone, Debug)]
pub struct StaticIdentity {
    subject: String,
    token: String,
}

impl StaticIdentity {
    #[must_use]
    pub fn new(subject: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl Identity for StaticIdentity {
    fn subject(&self) -> &str {
        &self.subject
    }

    async fn bearer(&self) -> Result<String, CommandError> {
        Ok(self.token.clone())
    }
}

/// Request/response command surface backing resync and optimistic
/// mutations.
#[async_trait]
pub trait CommandPort: Send + Sync {
    /// Fetch the full conversation list for the authenticated subject.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] on transport or server failure.
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, CommandError>;

    /// Fetch the message backlog of one conversation.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] on transport or server failure.
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>, CommandError>;

    /// Send a message into a conversation.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] on transport or server failure.
    async fn send_message(&self, conversation_id: &str, body: &str) -> Result<(), CommandError>;

    /// Assign a conversation to a board column; `(None, None)` fully
    /// unassigns it.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] on transport or server failure.
    async fn assign_to_column(
        &self,
        conversation_id: &str,
        board_id: Option<&str>,
        column_id: Option<&str>,
    ) -> Result<(), CommandError>;

    /// Set a conversation's display name.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] on transport or server failure.
    async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
    ) -> Result<(), CommandError>;
}

/// `reqwest`-backed command port.
pub struct HttpCommandPort<I: Identity> {
    base_url: String,
    client: reqwest::Client,
    identity: I,
}

impl<I: Identity> HttpCommandPort<I> {
    /// Build a port with the configured round-trip bound baked into the
    /// HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Network`] when the client cannot be
    /// constructed.
    pub fn new(config: &Config, identity: I) -> Result<Self, CommandError> {
        let client = reqwest::Client::builder()
            .timeout(config.command_timeout)
            .build()
            .map_err(|error| CommandError::Network(error.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            client,
            identity,
        })
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, CommandError> {
        let token = self.identity.bearer().await?;
        let url = format!("{}{path}", self.base_url);

        let request = self.client.request(method, &url).bearer_auth(token);
        let request = if let Some(json) = body {
            request.json(&json)
        } else {
            request
        };

        let response = request
            .send()
            .await
            .map_err(|error| CommandError::Network(error.to_string()))?;
        let status = response.status();
        let value = response
            .json::<Value>()
            .await
            .unwrap_or_else(|_| Value::Null);

        if !status.is_success() {
            return Err(CommandError::Rejected(rejection_message(
                status.as_u16(),
                &value,
            )));
        }
        Ok(value)
    }
}

#[async_trait]
impl<I: Identity> CommandPort for HttpCommandPort<I> {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, CommandError> {
        let path = format!("/users/{}/chats", self.identity.subject());
        let value = self.request(reqwest::Method::GET, &path, None).await?;
        let rows: Vec<ChatRow> = rows_from(value)?;
        Ok(rows.into_iter().map(conversation_from_row).collect())
    }

    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>, CommandError> {
        let path = format!(
            "/users/{}/chats/{conversation_id}/messages?limit=50",
            self.identity.subject()
        );
        let value = self.request(reqwest::Method::GET, &path, None).await?;
        let rows: Vec<MessageRow> = rows_from(value)?;
        Ok(rows.into_iter().map(message_from_row).collect())
    }

    async fn send_message(&self, conversation_id: &str, body: &str) -> Result<(), CommandError> {
        let path = format!(
            "/users/{}/chats/{conversation_id}/messages",
            self.identity.subject()
        );
        let payload = serde_json::json!({ "message": body });
        self.request(reqwest::Method::POST, &path, Some(payload))
            .await?;
        Ok(())
    }

    async fn assign_to_column(
        &self,
        conversation_id: &str,
        board_id: Option<&str>,
        column_id: Option<&str>,
    ) -> Result<(), CommandError> {
        let path = format!(
            "/users/{}/chats/{conversation_id}/kanban",
            self.identity.subject()
        );
        let payload = serde_json::json!({ "boardId": board_id, "columnId": column_id });
        self.request(reqwest::Method::PUT, &path, Some(payload))
            .await?;
        Ok(())
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
    ) -> Result<(), CommandError> {
        let path = format!("/users/{}/chats/{conversation_id}", self.identity.subject());
        let payload = serde_json::json!({ "name": name });
        self.request(reqwest::Method::PATCH, &path, Some(payload))
            .await?;
        Ok(())
    }
}

/// Extract a human-readable rejection from an error response body.
fn rejection_message(status: u16, body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .map_or_else(|| format!("HTTP {status}"), |m| format!("HTTP {status}: {m}"))
}

/// Pull the `data` array out of a list response.
fn rows_from<T: serde::de::DeserializeOwned>(value: Value) -> Result<Vec<T>, CommandError> {
    let rows = value.get("data").cloned().unwrap_or(Value::Array(vec![]));
    serde_json::from_value(rows)
        .map_err(|error| CommandError::Rejected(format!("unexpected response shape: {error}")))
}

#[derive(Debug, serde::Deserialize)]
struct ChatRow {
    #[serde(rename = "chatId")]
    chat_id: String,
    #[serde(rename = "contactName", default)]
    contact_name: Option<String>,
    #[serde(rename = "lastMessageContent", default)]
    last_message: Option<String>,
    #[serde(rename = "lastMessageTimestamp", default)]
    timestamp: Option<String>,
    #[serde(rename = "unreadCount", default)]
    unread: u32,
    #[serde(rename = "kanbanBoardId", default)]
    board_id: Option<String>,
    #[serde(rename = "kanbanColumnId", default)]
    column_id: Option<String>,
}

fn conversation_from_row(row: ChatRow) -> Conversation {
    // Assignments are only meaningful as a full pair.
    let assignment = match (row.board_id, row.column_id) {
        (Some(board_id), Some(column_id)) => Some(Assignment { board_id, column_id }),
        _ => None,
    };
    Conversation {
        id: row.chat_id,
        name: row.contact_name.map(|name| state::format_phone(&name)),
        preview: row
            .last_message
            .as_deref()
            .map_or_else(String::new, state::preview_of),
        timestamp: row.timestamp.unwrap_or_default(),
        unread: row.unread,
        assignment,
    }
}

#[derive(Debug, serde::Deserialize)]
struct MessageRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(rename = "fromMe", default)]
    from_me: bool,
    #[serde(default)]
    timestamp: String,
}

fn message_from_row(row: MessageRow) -> Message {
    let body = row.content.or(row.body).unwrap_or_default();
    Message {
        id: row
            .id
            .unwrap_or_else(|| format!("recv-{}", Uuid::new_v4())),
        body: state::normalize_body(&body),
        from_me: row.from_me,
        timestamp: row.timestamp,
        delivery: Delivery::Confirmed,
    }
}
