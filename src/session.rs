//! Connection lifecycle session.
//!
//! DESIGN
//! ======
//! One task owns the socket, the keepalive timer, and the status poll.
//! The published [`ConnectionState`] is re-derived from the transport's
//! raw status by a single derivation function invoked from both the poll
//! and the socket event path, so two writers can never publish
//! contradictory states. Reconnection uses a fixed delay and a bounded
//! attempt budget; exhausting the budget is the only terminal failure.
//! Keepalive probes are send-only: a missing PONG is not a failure
//! trigger, the transport's own close signal is.
//!
//! Every exit path ends the task with the socket closed and both timers
//! gone; nothing outlives a [`Session::stop`].

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::api::CommandPort;
use crate::config::Config;
use crate::event::{self, WireEvent};
use crate::notify::{Notice, NotificationSink};
use crate::reducer::{self, Event};
use crate::state::SharedState;
use crate::transport::{CLEAN_CLOSE, Socket, SocketEvent, SocketStatus, Transport, derive_ws_url};

/// Externally observable lifecycle state of the realtime connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    Closing,
}

enum Command {
    Send(String),
    Stop,
}

/// How one socket's drive loop ended.
enum Exit {
    /// `stop()` was called; socket closed cleanly.
    Stopped,
    /// The server closed the socket with a clean code.
    CleanClose,
    /// Abnormal close or stream exhaustion.
    Lost,
}

/// Handle to a running connection session.
///
/// Created once per authenticated identity; dependents hold the handle
/// and read connection state through [`Session::watch_state`].
pub struct Session {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    task: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Start the session task and return its handle.
    #[must_use]
    pub fn start(
        config: Config,
        transport: Arc<dyn Transport>,
        commands: Arc<dyn CommandPort>,
        state: SharedState,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let runner = Runner {
            config,
            transport,
            commands,
            state,
            sink,
            state_tx,
            inbox: rx,
        };
        let task = tokio::spawn(runner.run());
        Self {
            commands: tx,
            state_rx,
            task,
        }
    }

    /// Current published connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for state changes, for status indicators.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Queue an outbound event. Dropped and logged, never an error,
    /// unless the connection is open.
    pub fn send(&self, payload: String) {
        if self.state() != ConnectionState::Open {
            tracing::warn!("dropping outbound event: connection not open");
            return;
        }
        if self.commands.send(Command::Send(payload)).is_err() {
            tracing::warn!("dropping outbound event: session ended");
        }
    }

    /// Tear the session down: clean close, timers cleared, state ends at
    /// `Disconnected`.
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop);
        let _ = self.task.await;
    }
}

struct Runner {
    config: Config,
    transport: Arc<dyn Transport>,
    commands: Arc<dyn CommandPort>,
    state: SharedState,
    sink: Arc<dyn NotificationSink>,
    state_tx: watch::Sender<ConnectionState>,
    inbox: mpsc::UnboundedReceiver<Command>,
}

impl Runner {
    async fn run(mut self) {
        let url = match self.config.ws_url.clone() {
            Some(url) => url,
            None => match derive_ws_url(&self.config.base_url) {
                Ok(url) => url,
                Err(error) => {
                    tracing::error!(error = %error, "cannot derive websocket URL");
                    self.sink
                        .notify(Notice::error("realtime connection unavailable"));
                    return;
                }
            },
        };

        let mut attempts: u32 = 0;
        loop {
            self.publish(ConnectionState::Connecting);
            let socket = match self.transport.open(&url).await {
                Ok(socket) => socket,
                Err(error) => {
                    tracing::warn!(error = %error, "websocket open failed");
                    if self.backoff(&mut attempts).await {
                        continue;
                    }
                    return;
                }
            };

            attempts = 0;
            self.publish(ConnectionState::Open);
            // Events pushed before this point are not assumed complete;
            // the snapshot is the authoritative baseline.
            self.resync().await;

            match self.drive(socket).await {
                Exit::Stopped | Exit::CleanClose => {
                    self.publish(ConnectionState::Disconnected);
                    return;
                }
                Exit::Lost => {
                    if self.backoff(&mut attempts).await {
                        continue;
                    }
                    return;
                }
            }
        }
    }

    /// Process one open socket until it ends.
    async fn drive(&mut self, mut socket: Box<dyn Socket>) -> Exit {
        enum Wake {
            Command(Option<Command>),
            Keepalive,
            Poll,
            Socket(Option<SocketEvent>),
        }

        let start = tokio::time::Instant::now();
        let mut keepalive = tokio::time::interval_at(
            start + self.config.keepalive_interval,
            self.config.keepalive_interval,
        );
        let mut poll = tokio::time::interval_at(
            start + self.config.status_poll_interval,
            self.config.status_poll_interval,
        );

        loop {
            let wake = tokio::select! {
                command = self.inbox.recv() => Wake::Command(command),
                _ = keepalive.tick() => Wake::Keepalive,
                _ = poll.tick() => Wake::Poll,
                event = socket.next_event() => Wake::Socket(event),
            };

            match wake {
                Wake::Command(Some(Command::Send(payload))) => {
                    if socket.status() == SocketStatus::Open {
                        if let Err(error) = socket.send(payload).await {
                            tracing::warn!(error = %error, "outbound send failed");
                        }
                    } else {
                        tracing::warn!("dropping outbound event: socket not open");
                    }
                }
                Wake::Command(Some(Command::Stop) | None) => {
                    self.publish(ConnectionState::Closing);
                    socket.close(CLEAN_CLOSE).await;
                    return Exit::Stopped;
                }
                Wake::Keepalive => {
                    if socket.status() == SocketStatus::Open {
                        if let Err(error) = socket.send(keepalive_probe()).await {
                            tracing::warn!(error = %error, "keepalive probe failed");
                        }
                    }
                }
                Wake::Poll => {
                    self.publish(derive_state(socket.status()));
                }
                Wake::Socket(Some(SocketEvent::Message(raw))) => {
                    self.dispatch(&raw).await;
                }
                Wake::Socket(Some(SocketEvent::Closed { code, was_clean })) => {
                    tracing::info!(code, was_clean, "websocket closed");
                    if was_clean {
                        return Exit::CleanClose;
                    }
                    return Exit::Lost;
                }
                Wake::Socket(None) => return Exit::Lost,
            }
        }
    }

    /// Fixed-delay reconnect. Returns `false` once the attempt budget is
    /// spent or a stop arrives while waiting; the session then ends at
    /// `Disconnected`.
    async fn backoff(&mut self, attempts: &mut u32) -> bool {
        *attempts += 1;
        if *attempts > self.config.max_reconnect_attempts {
            tracing::error!(
                max = self.config.max_reconnect_attempts,
                "reconnect budget exhausted"
            );
            self.sink.notify(Notice::error(format!(
                "realtime connection lost; gave up after {} attempts",
                self.config.max_reconnect_attempts
            )));
            self.publish(ConnectionState::Disconnected);
            return false;
        }

        tracing::info!(
            attempt = *attempts,
            max = self.config.max_reconnect_attempts,
            "reconnecting"
        );
        self.publish(ConnectionState::Reconnecting);

        let delay = tokio::time::sleep(self.config.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                () = &mut delay => return true,
                command = self.inbox.recv() => match command {
                    Some(Command::Send(_)) => {
                        tracing::warn!("dropping outbound event: connection not open");
                    }
                    Some(Command::Stop) | None => {
                        self.publish(ConnectionState::Disconnected);
                        return false;
                    }
                },
            }
        }
    }

    /// Full REST resynchronization of the conversation list.
    async fn resync(&self) {
        match self.commands.fetch_conversations().await {
            Ok(conversations) => {
                let mut set = self.state.write().await;
                reducer::apply(&mut set, Event::FullSnapshot(conversations));
            }
            Err(error) => {
                tracing::warn!(error = %error, "conversation resync failed");
                self.sink
                    .notify(Notice::warning("could not refresh conversations"));
            }
        }
    }

    /// Parse and fold one inbound frame. A malformed frame is dropped
    /// here; it never reaches the working set.
    async fn dispatch(&self, raw: &str) {
        let wire = match event::parse_event(raw) {
            Ok(wire) => wire,
            Err(error) => {
                tracing::warn!(error = %error, "dropping malformed event");
                return;
            }
        };

        match wire {
            WireEvent::NewMessage(message) => {
                let mut set = self.state.write().await;
                reducer::apply(&mut set, Event::NewMessage(message));
            }
            WireEvent::ChatUpdate(patch) => {
                let mut set = self.state.write().await;
                reducer::apply(&mut set, Event::ChatUpdate(patch));
            }
            WireEvent::StatusUpdate(payload) => {
                // Advisory only; the status poll owns the published state.
                tracing::debug!(%payload, "server status update");
            }
            WireEvent::Error(error) => {
                let message = error
                    .message
                    .clone()
                    .unwrap_or_else(|| "unknown server error".to_owned());
                self.sink.notify(Notice::error(message));
                let mut set = self.state.write().await;
                reducer::apply(&mut set, Event::Error(error));
            }
            WireEvent::Pong => {
                tracing::debug!("keepalive acknowledged");
            }
            WireEvent::Unknown => {
                tracing::debug!("ignoring unrecognized event tag");
            }
        }
    }

    fn publish(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::debug!(state = ?next, "connection state");
        }
    }
}

/// Single authoritative mapping from raw socket status to published
/// state while a socket exists.
fn derive_state(status: SocketStatus) -> ConnectionState {
    match status {
        SocketStatus::Connecting => ConnectionState::Connecting,
        SocketStatus::Open => ConnectionState::Open,
        SocketStatus::Closing => ConnectionState::Closing,
        // A closed socket observed by the poll means the close event is
        // about to be handled; reconnection is already implied.
        SocketStatus::Closed => ConnectionState::Reconnecting,
    }
}

fn keepalive_probe() -> String {
    serde_json::json!({ "type": "PING" }).to_string()
}
