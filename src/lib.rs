//! Realtime reconciliation core for a messaging/CRM dashboard client.
//!
//! Keeps a chat inbox and a kanban board consistent across three
//! independent truth sources: a persistent websocket feed, on-demand REST
//! fetches, and optimistic local edits. The connection [`session`] owns
//! the socket lifecycle (connect, keepalive, bounded reconnect, teardown),
//! the [`reducer`] folds push events and REST snapshots into the shared
//! working set, and the [`mutation`] coordinator applies local edits
//! immediately and reconciles them against remote command results,
//! committing on success and rolling back on rejection.
//!
//! Presentation, storage, and auth issuance live behind the narrow ports
//! in [`api`], [`transport`], and [`notify`].

pub mod api;
pub mod config;
pub mod event;
pub mod mutation;
pub mod notify;
pub mod reducer;
pub mod session;
pub mod state;
pub mod transport;
pub mod view;
