//! Optimistic mutation coordinator.
//!
//! DESIGN
//! ======
//! Every mutation applies its local state change in a single lock scope,
//! then issues the remote command, then reconciles: commit on success,
//! restore the captured pre-mutation snapshot on failure. Failures are
//! surfaced through the notification sink and never retried here, and
//! the coordinator never blocks on connection state: a send attempted
//! while the socket is down still fires its remote command.

#[cfg(test)]
#[path = "mutation_test.rs"]
mod mutation_test;

use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::api::{CommandError, CommandPort};
use crate::notify::{Notice, NotificationSink};
use crate::reducer::{self, Event};
use crate::state::{Assignment, BoardColumn, Delivery, Message, SharedState};

/// Coordinates optimistic local edits with their remote commands.
pub struct Coordinator {
    state: SharedState,
    commands: Arc<dyn CommandPort>,
    sink: Arc<dyn NotificationSink>,
}

/// Pre-move copies of everything a board move touches.
struct MoveSnapshot {
    source: Option<BoardColumn>,
    destination: Option<BoardColumn>,
    assignment: Option<Assignment>,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        state: SharedState,
        commands: Arc<dyn CommandPort>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            state,
            commands,
            sink,
        }
    }

    /// Send a message: append a pending local entry immediately, then
    /// reconcile against the remote result. On failure the entry is kept
    /// and marked failed, never silently removed.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`CommandError`]; the local rollback and
    /// user notice have already happened when it surfaces.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        body: &str,
    ) -> Result<(), CommandError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(CommandError::Validation("message body is empty"));
        }

        let local_id = format!("local-{}", Uuid::new_v4());
        {
            let mut set = self.state.write().await;
            set.messages
                .entry(conversation_id.to_owned())
                .or_default()
                .push(Message {
                    id: local_id.clone(),
                    body: body.to_owned(),
                    from_me: true,
                    timestamp: now_rfc3339(),
                    delivery: Delivery::Pending,
                });
        }

        match self.commands.send_message(conversation_id, body).await {
            Ok(()) => {
                self.set_delivery(conversation_id, &local_id, Delivery::Confirmed)
                    .await;
                Ok(())
            }
            Err(error) => {
                self.set_delivery(conversation_id, &local_id, Delivery::Failed)
                    .await;
                self.sink
                    .notify(Notice::error(format!("message not sent: {error}")));
                Err(error)
            }
        }
    }

    /// Move a conversation to a board column, or fully unassign it when
    /// both ids are `None`. The move is applied locally as a single
    /// remove-then-insert transition before the remote call; a remote
    /// failure restores both affected column lists and the assignment.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Validation`] for a half-specified
    /// destination, or the remote failure after rollback.
    pub async fn move_to_column(
        &self,
        conversation_id: &str,
        board_id: Option<&str>,
        column_id: Option<&str>,
        index: usize,
    ) -> Result<(), CommandError> {
        let destination = match (board_id, column_id) {
            (Some(board), Some(column)) => Some((board.to_owned(), column.to_owned())),
            (None, None) => None,
            _ => {
                return Err(CommandError::Validation(
                    "destination board and column must be chosen together",
                ));
            }
        };

        let snapshot = {
            let mut set = self.state.write().await;
            let assignment = set
                .conversation(conversation_id)
                .and_then(|convo| convo.assignment.clone());

            let Some(board) = set.board.as_mut() else {
                return Err(CommandError::Validation("no board is open"));
            };
            if let Some((_, column)) = &destination {
                if !board.columns.iter().any(|c| &c.id == column) {
                    return Err(CommandError::Validation("destination column does not exist"));
                }
            }

            let source = board
                .columns
                .iter()
                .find(|column| column.chats.iter().any(|id| id == conversation_id))
                .cloned();
            let dest_copy = destination.as_ref().and_then(|(_, column_id)| {
                board.columns.iter().find(|c| &c.id == column_id).cloned()
            });

            // Remove-then-insert as one transition: the conversation is
            // never visible in two columns.
            for column in &mut board.columns {
                column.chats.retain(|id| id != conversation_id);
            }
            if let Some((_, column_id)) = &destination {
                if let Some(column) = board.columns.iter_mut().find(|c| &c.id == column_id) {
                    let at = index.min(column.chats.len());
                    column.chats.insert(at, conversation_id.to_owned());
                }
            }

            if let Some(convo) = set.conversation_mut(conversation_id) {
                convo.assignment = destination.as_ref().map(|(board_id, column_id)| Assignment {
                    board_id: board_id.clone(),
                    column_id: column_id.clone(),
                });
            }

            MoveSnapshot {
                source,
                destination: dest_copy,
                assignment,
            }
        };

        match self
            .commands
            .assign_to_column(conversation_id, board_id, column_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(error) => {
                self.rollback_move(snapshot, conversation_id).await;
                self.sink
                    .notify(Notice::error(format!("could not move chat: {error}")));
                Err(error)
            }
        }
    }

    /// Remove a conversation from its board entirely.
    ///
    /// # Errors
    ///
    /// Same failure surface as [`Coordinator::move_to_column`].
    pub async fn unassign(&self, conversation_id: &str) -> Result<(), CommandError> {
        self.move_to_column(conversation_id, None, None, 0).await
    }

    /// Set a conversation's display name optimistically; rolled back to
    /// the prior name if the remote command fails.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Validation`] for an empty name or unknown
    /// conversation, or the remote failure after rollback.
    pub async fn rename(&self, conversation_id: &str, name: &str) -> Result<(), CommandError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::Validation("name is empty"));
        }

        let previous = {
            let mut set = self.state.write().await;
            let Some(convo) = set.conversation_mut(conversation_id) else {
                return Err(CommandError::Validation("no such conversation"));
            };
            let previous = convo.name.take();
            convo.name = Some(name.to_owned());
            previous
        };

        match self
            .commands
            .rename_conversation(conversation_id, name)
            .await
        {
            Ok(()) => Ok(()),
            Err(error) => {
                {
                    let mut set = self.state.write().await;
                    if let Some(convo) = set.conversation_mut(conversation_id) {
                        convo.name = previous;
                    }
                }
                self.sink
                    .notify(Notice::error(format!("rename failed: {error}")));
                Err(error)
            }
        }
    }

    /// Make a conversation the active selection: its unread count resets
    /// to zero and the message backlog is fetched and folded in as an
    /// authoritative snapshot.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure; the selection itself sticks either way.
    pub async fn select(&self, conversation_id: &str) -> Result<(), CommandError> {
        {
            let mut set = self.state.write().await;
            set.selected = Some(conversation_id.to_owned());
            if let Some(convo) = set.conversation_mut(conversation_id) {
                convo.unread = 0;
            }
        }

        let messages = match self.commands.fetch_messages(conversation_id).await {
            Ok(messages) => messages,
            Err(error) => {
                self.sink
                    .notify(Notice::error(format!("could not load messages: {error}")));
                return Err(error);
            }
        };

        let mut set = self.state.write().await;
        reducer::apply(
            &mut set,
            Event::MessageSnapshot {
                conversation_id: conversation_id.to_owned(),
                messages,
            },
        );
        Ok(())
    }

    async fn set_delivery(&self, conversation_id: &str, message_id: &str, delivery: Delivery) {
        let mut set = self.state.write().await;
        if let Some(message) = set
            .messages
            .get_mut(conversation_id)
            .and_then(|list| list.iter_mut().find(|m| m.id == message_id))
        {
            message.delivery = delivery;
        }
    }

    async fn rollback_move(&self, snapshot: MoveSnapshot, conversation_id: &str) {
        let mut set = self.state.write().await;
        if let Some(board) = set.board.as_mut() {
            for saved in [snapshot.source, snapshot.destination].into_iter().flatten() {
                if let Some(column) = board.columns.iter_mut().find(|c| c.id == saved.id) {
                    *column = saved;
                }
            }
        }
        if let Some(convo) = set.conversation_mut(conversation_id) {
            convo.assignment = snapshot.assignment;
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
