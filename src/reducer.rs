//! Pure event-to-state reducer.
//!
//! DESIGN
//! ======
//! [`apply`] folds one inbound event or REST snapshot into the working
//! set. Duplicate delivery is tolerated: messages dedupe by id and
//! conversation updates upsert by id, so applying the same event twice
//! yields the same state as applying it once. Broadcast/system channels
//! are rejected on every path, snapshots included.

#[cfg(test)]
#[path = "reducer_test.rs"]
mod reducer_test;

use crate::event::{ChatPatch, IncomingMessage, ServerError};
use crate::state::{self, Conversation, Delivery, Message, WorkingSet};

/// An event folded into the working set. Push events map from
/// [`crate::event::WireEvent`]; snapshots come from the command port.
#[derive(Clone, Debug)]
pub enum Event {
    NewMessage(IncomingMessage),
    ChatUpdate(ChatPatch),
    /// Authoritative replace of the whole conversation working list,
    /// taken after connection establishment or explicit refresh.
    FullSnapshot(Vec<Conversation>),
    /// Authoritative replace of one conversation's message list.
    MessageSnapshot {
        conversation_id: String,
        messages: Vec<Message>,
    },
    /// Server-reported failure; logged, state untouched.
    Error(ServerError),
}

/// Fold one event into the working set.
pub fn apply(set: &mut WorkingSet, event: Event) {
    match event {
        Event::NewMessage(incoming) => apply_new_message(set, incoming),
        Event::ChatUpdate(patch) => apply_chat_update(set, patch),
        Event::FullSnapshot(conversations) => apply_full_snapshot(set, conversations),
        Event::MessageSnapshot { conversation_id, messages } => {
            apply_message_snapshot(set, &conversation_id, messages);
        }
        Event::Error(error) => {
            tracing::warn!(
                message = error.message.as_deref().unwrap_or("unknown"),
                "server error event"
            );
        }
    }
}

fn apply_new_message(set: &mut WorkingSet, incoming: IncomingMessage) {
    if state::is_filtered_channel(&incoming.chat_id) {
        tracing::debug!(chat = %incoming.chat_id, "dropping filtered-channel message");
        return;
    }

    // Some gateway sources omit the message id; synthesize a stable one so
    // duplicate delivery of the same frame still dedupes.
    let message_id = incoming
        .id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", incoming.chat_id, incoming.timestamp));

    let list = set.messages.entry(incoming.chat_id.clone()).or_default();
    if list.iter().any(|message| message.id == message_id) {
        return;
    }
    list.push(Message {
        id: message_id,
        body: state::normalize_body(&incoming.body),
        from_me: incoming.from_me,
        timestamp: incoming.timestamp.clone(),
        delivery: Delivery::Confirmed,
    });
    // Stable sort keeps arrival order for equal timestamps.
    list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let selected = set.selected.as_deref() == Some(incoming.chat_id.as_str());
    let preview = state::preview_of(&incoming.body);
    if let Some(convo) = set.conversation_mut(&incoming.chat_id) {
        convo.preview = preview;
        convo.timestamp = incoming.timestamp;
        if selected {
            convo.unread = 0;
        } else {
            convo.unread += 1;
        }
    } else {
        // First sign of this conversation; a later update or snapshot
        // fills in the rest.
        set.conversations.push(Conversation {
            id: incoming.chat_id,
            name: None,
            preview,
            timestamp: incoming.timestamp,
            unread: u32::from(!selected),
            assignment: None,
        });
    }
}

fn apply_chat_update(set: &mut WorkingSet, patch: ChatPatch) {
    if state::is_filtered_channel(&patch.id) {
        tracing::debug!(chat = %patch.id, "dropping filtered-channel update");
        return;
    }

    if let Some(existing) = set.conversation_mut(&patch.id) {
        if let Some(name) = patch.name {
            existing.name = Some(state::format_phone(&name));
        }
        if let Some(last) = patch.last_message {
            existing.preview = state::preview_of(&last);
        }
        if let Some(timestamp) = patch.timestamp {
            existing.timestamp = timestamp;
        }
        if let Some(unread) = patch.unread {
            existing.unread = unread;
        }
    } else {
        set.conversations.push(Conversation {
            id: patch.id,
            name: patch.name.map(|name| state::format_phone(&name)),
            preview: patch
                .last_message
                .as_deref()
                .map_or_else(String::new, state::preview_of),
            timestamp: patch.timestamp.unwrap_or_default(),
            unread: patch.unread.unwrap_or(0),
            assignment: None,
        });
    }
}

fn apply_full_snapshot(set: &mut WorkingSet, conversations: Vec<Conversation>) {
    set.conversations = conversations
        .into_iter()
        .filter(|convo| !state::is_filtered_channel(&convo.id))
        .collect();

    // Conversations absent from the snapshot are dropped entirely,
    // message backlogs and stale selection included.
    let keep: Vec<String> = set.conversations.iter().map(|c| c.id.clone()).collect();
    set.messages.retain(|id, _| keep.iter().any(|k| k == id));
    if let Some(selected) = set.selected.as_deref() {
        if !keep.iter().any(|k| k == selected) {
            set.selected = None;
        }
    }
}

fn apply_message_snapshot(set: &mut WorkingSet, conversation_id: &str, messages: Vec<Message>) {
    if state::is_filtered_channel(conversation_id) {
        return;
    }
    let mut messages: Vec<Message> = messages
        .into_iter()
        .map(|mut message| {
            message.body = state::normalize_body(&message.body);
            message
        })
        .collect();
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    set.messages.insert(conversation_id.to_owned(), messages);
}
