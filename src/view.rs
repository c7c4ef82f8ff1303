//! Read-only projections over the working set.
//!
//! Pure functions a presentation layer calls on every repaint; nothing
//! here mutates state or allocates beyond the returned collection.

#[cfg(test)]
#[path = "view_test.rs"]
mod view_test;

use crate::state::{Conversation, Message, WorkingSet};

/// Conversations ordered newest-activity-first for the inbox list.
#[must_use]
pub fn inbox(set: &WorkingSet) -> Vec<&Conversation> {
    let mut entries: Vec<&Conversation> = set.conversations.iter().collect();
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

/// Conversations belonging to one board column, in the column's order.
/// Ids with no matching conversation are skipped.
#[must_use]
pub fn column_chats<'a>(set: &'a WorkingSet, column_id: &str) -> Vec<&'a Conversation> {
    let Some(board) = set.board.as_ref() else {
        return Vec::new();
    };
    let Some(column) = board.columns.iter().find(|c| c.id == column_id) else {
        return Vec::new();
    };
    column
        .chats
        .iter()
        .filter_map(|id| set.conversation(id))
        .collect()
}

/// Sum of unread counts across all conversations, for the badge.
#[must_use]
pub fn total_unread(set: &WorkingSet) -> u32 {
    set.conversations.iter().map(|c| c.unread).sum()
}

/// Message backlog of the selected conversation, oldest first. Empty
/// when nothing is selected or nothing was fetched yet.
#[must_use]
pub fn selected_messages(set: &WorkingSet) -> &[Message] {
    set.selected
        .as_deref()
        .and_then(|id| set.messages.get(id))
        .map_or(&[], Vec::as_slice)
}
