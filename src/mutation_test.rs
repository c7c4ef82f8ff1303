use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::*;
use crate::api::{CommandError, CommandPort};
use crate::notify::{Notice, NotificationSink, Severity};
use crate::state::{Board, BoardColumn, Conversation, Delivery, WorkingSet, shared};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakePort {
    fail_send: AtomicBool,
    fail_assign: AtomicBool,
    fail_rename: AtomicBool,
    fail_fetch: AtomicBool,
    calls: Mutex<Vec<String>>,
    canned_messages: Mutex<Vec<Message>>,
}

impl FakePort {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), CommandError> {
        if flag.load(Ordering::SeqCst) {
            Err(CommandError::Rejected("server said no".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CommandPort for FakePort {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, CommandError> {
        self.record("fetch_conversations");
        Ok(Vec::new())
    }

    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>, CommandError> {
        self.record(format!("fetch_messages:{conversation_id}"));
        self.check(&self.fail_fetch)?;
        Ok(self.canned_messages.lock().unwrap().clone())
    }

    async fn send_message(&self, conversation_id: &str, body: &str) -> Result<(), CommandError> {
        self.record(format!("send:{conversation_id}:{body}"));
        self.check(&self.fail_send)
    }

    async fn assign_to_column(
        &self,
        conversation_id: &str,
        board_id: Option<&str>,
        column_id: Option<&str>,
    ) -> Result<(), CommandError> {
        self.record(format!(
            "assign:{conversation_id}:{}:{}",
            board_id.unwrap_or("-"),
            column_id.unwrap_or("-")
        ));
        self.check(&self.fail_assign)
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
    ) -> Result<(), CommandError> {
        self.record(format!("rename:{conversation_id}:{name}"));
        self.check(&self.fail_rename)
    }
}

#[derive(Default)]
struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

impl RecordingSink {
    fn errors(&self) -> usize {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.severity == Severity::Error)
            .count()
    }
}

fn convo(id: &str) -> Conversation {
    Conversation {
        id: id.to_owned(),
        name: Some(format!("chat {id}")),
        preview: String::new(),
        timestamp: "2026-01-01T00:00:00Z".to_owned(),
        unread: 0,
        assignment: None,
    }
}

fn seeded_board() -> WorkingSet {
    let mut set = WorkingSet::default();
    for id in ["c7", "c8", "c9"] {
        set.conversations.push(convo(id));
    }
    set.conversation_mut("c7").unwrap().assignment = Some(Assignment {
        board_id: "b1".to_owned(),
        column_id: "col-a".to_owned(),
    });
    set.board = Some(Board {
        id: "b1".to_owned(),
        name: "Pipeline".to_owned(),
        columns: vec![
            BoardColumn {
                id: "col-a".to_owned(),
                name: "New".to_owned(),
                chats: vec!["c7".to_owned(), "c8".to_owned()],
            },
            BoardColumn {
                id: "col-b".to_owned(),
                name: "In progress".to_owned(),
                chats: vec!["c9".to_owned()],
            },
        ],
    });
    set
}

fn rig() -> (Coordinator, SharedState, Arc<FakePort>, Arc<RecordingSink>) {
    let state = shared();
    let port = Arc::new(FakePort::default());
    let sink = Arc::new(RecordingSink::default());
    let coordinator = Coordinator::new(Arc::clone(&state), port.clone(), sink.clone());
    (coordinator, state, port, sink)
}

async fn seed(state: &SharedState, set: WorkingSet) {
    *state.write().await = set;
}

// ============================================================================
// send_message
// ============================================================================

#[tokio::test]
async fn send_confirms_local_entry_on_success() {
    let (coordinator, state, port, _) = rig();
    seed(&state, seeded_board()).await;

    coordinator.send_message("c7", "  hello there  ").await.unwrap();

    let set = state.read().await;
    let messages = &set.messages["c7"];
    assert_eq!(messages.len(), 1);
    assert!(messages[0].id.starts_with("local-"));
    assert_eq!(messages[0].body, "hello there");
    assert!(messages[0].from_me);
    assert_eq!(messages[0].delivery, Delivery::Confirmed);
    assert_eq!(port.calls.lock().unwrap().as_slice(), ["send:c7:hello there"]);
}

#[tokio::test]
async fn send_failure_keeps_entry_marked_failed() {
    let (coordinator, state, port, sink) = rig();
    seed(&state, seeded_board()).await;
    port.fail_send.store(true, Ordering::SeqCst);

    let result = coordinator.send_message("c7", "hello").await;
    assert!(matches!(result, Err(CommandError::Rejected(_))));

    let set = state.read().await;
    let messages = &set.messages["c7"];
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].delivery, Delivery::Failed);
    assert_eq!(sink.errors(), 1);
}

#[tokio::test]
async fn send_rejects_blank_body_without_touching_state() {
    let (coordinator, state, port, _) = rig();
    seed(&state, seeded_board()).await;

    let result = coordinator.send_message("c7", "   ").await;
    assert!(matches!(result, Err(CommandError::Validation(_))));
    assert!(state.read().await.messages.is_empty());
    assert!(port.calls.lock().unwrap().is_empty());
}

// ============================================================================
// move_to_column
// ============================================================================

#[tokio::test]
async fn move_places_chat_at_index_and_updates_assignment() {
    let (coordinator, state, port, _) = rig();
    seed(&state, seeded_board()).await;

    coordinator
        .move_to_column("c7", Some("b1"), Some("col-b"), 0)
        .await
        .unwrap();

    let set = state.read().await;
    let board = set.board.as_ref().unwrap();
    assert_eq!(board.columns[0].chats, ["c8"]);
    assert_eq!(board.columns[1].chats, ["c7", "c9"]);
    assert_eq!(
        set.conversation("c7").unwrap().assignment,
        Some(Assignment {
            board_id: "b1".to_owned(),
            column_id: "col-b".to_owned(),
        })
    );
    assert_eq!(port.calls.lock().unwrap().as_slice(), ["assign:c7:b1:col-b"]);
}

#[tokio::test]
async fn move_clamps_out_of_range_index_to_end() {
    let (coordinator, state, _, _) = rig();
    seed(&state, seeded_board()).await;

    coordinator
        .move_to_column("c7", Some("b1"), Some("col-b"), 99)
        .await
        .unwrap();

    let set = state.read().await;
    assert_eq!(set.board.as_ref().unwrap().columns[1].chats, ["c9", "c7"]);
}

#[tokio::test]
async fn move_failure_restores_columns_and_assignment() {
    let (coordinator, state, port, sink) = rig();
    let before = seeded_board();
    seed(&state, before.clone()).await;
    port.fail_assign.store(true, Ordering::SeqCst);

    let result = coordinator
        .move_to_column("c7", Some("b1"), Some("col-b"), 0)
        .await;
    assert!(result.is_err());

    let set = state.read().await;
    assert_eq!(set.board, before.board);
    assert_eq!(
        set.conversation("c7").unwrap().assignment,
        before.conversation("c7").unwrap().assignment
    );
    assert_eq!(sink.errors(), 1);
}

#[tokio::test]
async fn chat_never_appears_in_two_columns() {
    let (coordinator, state, _, _) = rig();
    seed(&state, seeded_board()).await;

    coordinator
        .move_to_column("c7", Some("b1"), Some("col-b"), 1)
        .await
        .unwrap();

    let set = state.read().await;
    let membership: usize = set
        .board
        .as_ref()
        .unwrap()
        .columns
        .iter()
        .filter(|column| column.chats.iter().any(|id| id == "c7"))
        .count();
    assert_eq!(membership, 1);
}

#[tokio::test]
async fn unassign_clears_assignment_and_column_membership() {
    let (coordinator, state, port, _) = rig();
    seed(&state, seeded_board()).await;

    coordinator.unassign("c7").await.unwrap();

    let set = state.read().await;
    assert!(set
        .board
        .as_ref()
        .unwrap()
        .columns
        .iter()
        .all(|column| !column.chats.iter().any(|id| id == "c7")));
    assert_eq!(set.conversation("c7").unwrap().assignment, None);
    assert_eq!(port.calls.lock().unwrap().as_slice(), ["assign:c7:-:-"]);
}

#[tokio::test]
async fn half_specified_destination_is_rejected_before_any_change() {
    let (coordinator, state, port, _) = rig();
    let before = seeded_board();
    seed(&state, before.clone()).await;

    let result = coordinator
        .move_to_column("c7", Some("b1"), None, 0)
        .await;
    assert!(matches!(result, Err(CommandError::Validation(_))));
    assert_eq!(state.read().await.board, before.board);
    assert!(port.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_destination_column_is_rejected_before_any_change() {
    let (coordinator, state, port, _) = rig();
    let before = seeded_board();
    seed(&state, before.clone()).await;

    let result = coordinator
        .move_to_column("c7", Some("b1"), Some("col-z"), 0)
        .await;
    assert!(matches!(result, Err(CommandError::Validation(_))));
    assert_eq!(state.read().await.board, before.board);
    assert!(port.calls.lock().unwrap().is_empty());
}

// ============================================================================
// rename
// ============================================================================

#[tokio::test]
async fn rename_applies_optimistically() {
    let (coordinator, state, _, _) = rig();
    seed(&state, seeded_board()).await;

    coordinator.rename("c8", "Acme Corp").await.unwrap();
    assert_eq!(
        state.read().await.conversation("c8").unwrap().name.as_deref(),
        Some("Acme Corp")
    );
}

#[tokio::test]
async fn rename_failure_restores_previous_name() {
    let (coordinator, state, port, sink) = rig();
    seed(&state, seeded_board()).await;
    port.fail_rename.store(true, Ordering::SeqCst);

    let result = coordinator.rename("c8", "Acme Corp").await;
    assert!(result.is_err());
    assert_eq!(
        state.read().await.conversation("c8").unwrap().name.as_deref(),
        Some("chat c8")
    );
    assert_eq!(sink.errors(), 1);
}

// ============================================================================
// select
// ============================================================================

#[tokio::test]
async fn select_zeroes_unread_and_loads_backlog() {
    let (coordinator, state, port, _) = rig();
    let mut before = seeded_board();
    before.conversation_mut("c8").unwrap().unread = 4;
    seed(&state, before).await;
    port.canned_messages.lock().unwrap().push(Message {
        id: "m1".to_owned(),
        body: "hi".to_owned(),
        from_me: false,
        timestamp: "2026-01-02T00:00:00Z".to_owned(),
        delivery: Delivery::Confirmed,
    });

    coordinator.select("c8").await.unwrap();

    let set = state.read().await;
    assert_eq!(set.selected.as_deref(), Some("c8"));
    assert_eq!(set.conversation("c8").unwrap().unread, 0);
    assert_eq!(set.messages["c8"].len(), 1);
    assert_eq!(port.calls.lock().unwrap().as_slice(), ["fetch_messages:c8"]);
}

#[tokio::test]
async fn select_keeps_selection_when_fetch_fails() {
    let (coordinator, state, port, sink) = rig();
    seed(&state, seeded_board()).await;
    port.fail_fetch.store(true, Ordering::SeqCst);

    let result = coordinator.select("c8").await;
    assert!(result.is_err());
    assert_eq!(state.read().await.selected.as_deref(), Some("c8"));
    assert_eq!(sink.errors(), 1);
}
