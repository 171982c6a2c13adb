//! Sender session: the send window driven by a single background task.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  try_send(cmd) / stats()          CommandSender
//!      │                               ┌──────────────────────┐
//!      ├──────────────────────────────▶│  SenderHandle (mpsc) │
//!      │                               │  notices (mpsc)      │◀─┐
//!      ▼                               └──────────┬───────────┘  │
//!  next_notice()                                  │ event_loop   │
//!                                                 ▼ task         │
//!                          select! { request | datagram | tick } ┘
//!                            ├── SendWindow            (slots, seq numbers)
//!                            ├── RetransmitScheduler   (timeouts, retry budget)
//!                            └── Arc<T: Transport>     (commands out, ACKs in)
//! ```
//!
//! The window is owned by the event loop and nothing else, so admission, ACK
//! processing and retransmission never race.  `try_send` does not queue: the
//! loop answers each submission at once with a sequence number or
//! [`WindowFull`], and the caller decides when to retry.
//!
//! ```ignore
//! let transport = Arc::new(UdpTransport::multicast_sender(group, 1, 0).await?);
//! let mut sender = CommandSender::spawn(transport, dest, ProtocolConfig::default());
//! let seq = sender.try_send("PLAY").await?;
//! while let Some(notice) = sender.next_notice().await {
//!     println!("{notice:?}");
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::ack::{Ack, AckKind};
use crate::config::ProtocolConfig;
use crate::message::Message;
use crate::send_window::{SendWindow, WindowFull};
use crate::socket::Transport;
use crate::timer::RetransmitScheduler;

/// Capacity of the request and notice channels.
const CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Errors returned to callers of the sender session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// Every window slot is taken; retry after an ACK frees one.
    #[error(transparent)]
    WindowFull(#[from] WindowFull),
    /// A command was given up on; later commands could never be delivered
    /// in order, so no new ones are admitted.
    #[error("command {seq} was undeliverable; session accepts no new commands")]
    Failed { seq: u64 },
    /// The background task has stopped.
    #[error("sender session is closed")]
    Closed,
}

/// Something the session reports back to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderNotice {
    /// A reply arrived from the receiver.
    Reply(Ack),
    /// A command ran out of retries and was dropped from the window.
    ///
    /// The receiver cannot deliver anything past a missing sequence number,
    /// so after the first of these every [`SenderHandle::try_send`] fails
    /// with [`SendError::Failed`].  Commands already in flight keep being
    /// retried and acknowledged as before.
    Undeliverable {
        seq: u64,
        command: String,
        retries: u32,
    },
}

/// Snapshot of the send window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub in_flight: usize,
    pub capacity: usize,
    pub next_seq: u64,
    pub last_ack: Option<u64>,
    pub retransmit_count: u64,
    /// First sequence number given up on, if any.
    pub failed: Option<u64>,
}

impl From<&SendWindow> for WindowStats {
    fn from(window: &SendWindow) -> Self {
        Self {
            in_flight: window.in_flight(),
            capacity: window.capacity(),
            next_seq: window.next_seq(),
            last_ack: window.last_ack(),
            retransmit_count: window.retransmit_count(),
            failed: None,
        }
    }
}

enum Request {
    Submit {
        command: String,
        reply: oneshot::Sender<Result<u64, SendError>>,
    },
    Stats {
        reply: oneshot::Sender<WindowStats>,
    },
}

// ---------------------------------------------------------------------------
// SenderHandle
// ---------------------------------------------------------------------------

/// Cloneable submission handle for a running session.
#[derive(Debug, Clone)]
pub struct SenderHandle {
    requests: mpsc::Sender<Request>,
}

impl SenderHandle {
    /// Offer `command` to the window.
    ///
    /// Returns the assigned sequence number, or [`SendError::WindowFull`]
    /// without queuing anything.  Once a command has been reported
    /// undeliverable this always fails with [`SendError::Failed`].
    pub async fn try_send(&self, command: impl Into<String>) -> Result<u64, SendError> {
        let (reply, rx) = oneshot::channel();
        let request = Request::Submit {
            command: command.into(),
            reply,
        };
        self.requests
            .send(request)
            .await
            .map_err(|_| SendError::Closed)?;
        rx.await.map_err(|_| SendError::Closed)?
    }

    pub async fn stats(&self) -> Result<WindowStats, SendError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Stats { reply })
            .await
            .map_err(|_| SendError::Closed)?;
        rx.await.map_err(|_| SendError::Closed)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submit { command, .. } => {
                f.debug_struct("Submit").field("command", command).finish()
            }
            Self::Stats { .. } => f.write_str("Stats"),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandSender
// ---------------------------------------------------------------------------

/// A running sender session.
#[derive(Debug)]
pub struct CommandSender {
    handle: SenderHandle,
    notices: mpsc::Receiver<SenderNotice>,
    task: JoinHandle<()>,
}

impl CommandSender {
    /// Start a session sending commands to `dest` over `transport`.
    ///
    /// Replies are read from the same transport, so the receiver must answer
    /// to its local address.
    pub fn spawn<T: Transport>(
        transport: Arc<T>,
        dest: SocketAddr,
        config: ProtocolConfig,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (notice_tx, notice_rx) = mpsc::channel(CHANNEL_CAPACITY);

        log::info!(
            "[tx] session to {dest} from {} (window={}, timeout={:?})",
            transport.local_addr(),
            config.window_size,
            config.retransmit_timeout
        );
        let task = tokio::spawn(event_loop(transport, dest, config, request_rx, notice_tx));

        Self {
            handle: SenderHandle {
                requests: request_tx,
            },
            notices: notice_rx,
            task,
        }
    }

    pub async fn try_send(&self, command: impl Into<String>) -> Result<u64, SendError> {
        self.handle.try_send(command).await
    }

    pub async fn stats(&self) -> Result<WindowStats, SendError> {
        self.handle.stats().await
    }

    /// A handle for submitting from other tasks.
    pub fn handle(&self) -> SenderHandle {
        self.handle.clone()
    }

    /// Wait for the next reply or delivery failure.
    ///
    /// Returns `None` once the session has stopped.
    pub async fn next_notice(&mut self) -> Option<SenderNotice> {
        self.notices.recv().await
    }

    /// Split into the submission handle and the notice stream, leaving the
    /// background task detached.
    pub fn into_parts(self) -> (SenderHandle, mpsc::Receiver<SenderNotice>) {
        (self.handle, self.notices)
    }

    /// Stop the background task.  Unacknowledged commands are abandoned.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

// ---------------------------------------------------------------------------
// Background event loop
// ---------------------------------------------------------------------------

async fn event_loop<T: Transport>(
    transport: Arc<T>,
    dest: SocketAddr,
    config: ProtocolConfig,
    mut requests: mpsc::Receiver<Request>,
    notices: mpsc::Sender<SenderNotice>,
) {
    let mut window = SendWindow::new(config.window_size);
    let scheduler = RetransmitScheduler::from_config(&config);
    // Lowest seq given up on; set once, never cleared.
    let mut failed: Option<u64> = None;

    // Fixed-rate tick; a slow sweep is followed by catch-up ticks.
    let mut tick = tokio::time::interval_at(Instant::now() + config.tick, config.tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            // ── Branch 1: request from the application ───────────────────
            request = requests.recv() => {
                match request {
                    None => {
                        log::debug!("[tx] all handles dropped; stopping");
                        break;
                    }
                    Some(Request::Submit { command, reply }) => {
                        if let Some(seq) = failed {
                            log::debug!("[tx] rejected: seq={seq} already failed");
                            let _ = reply.send(Err(SendError::Failed { seq }));
                            continue;
                        }
                        let result = match window.admit(command, Instant::now().into_std()) {
                            Ok(message) => {
                                transmit(&*transport, &message, dest).await;
                                log::debug!(
                                    "[tx] → seq={} ack={:?} in_flight={}",
                                    message.seq,
                                    message.ack,
                                    window.in_flight()
                                );
                                Ok(message.seq)
                            }
                            Err(full) => {
                                log::debug!("[tx] rejected: {full}");
                                Err(SendError::WindowFull(full))
                            }
                        };
                        let _ = reply.send(result);
                    }
                    Some(Request::Stats { reply }) => {
                        let stats = WindowStats {
                            failed,
                            ..WindowStats::from(&window)
                        };
                        let _ = reply.send(stats);
                    }
                }
            }

            // ── Branch 2: reply from the receiver ────────────────────────
            received = transport.recv_from() => {
                let (bytes, from) = match received {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("[tx] receive failed: {e}");
                        continue;
                    }
                };
                let message = match Message::decode(&bytes) {
                    Ok(m) => m,
                    Err(e) => {
                        log::warn!("[tx] dropping malformed reply from {from}: {e}");
                        continue;
                    }
                };

                let ack = Ack::from_message(&message);
                let freed = window.on_ack(ack.ack);
                match &ack.kind {
                    AckKind::Response(text) => {
                        log::debug!("[tx] ← ACK ack={:?} freed={freed} {text:?}", ack.ack)
                    }
                    kind => log::debug!("[tx] ← ACK ack={:?} freed={freed} {kind:?}", ack.ack),
                }
                notify(&notices, SenderNotice::Reply(ack));
            }

            // ── Branch 3: retransmission tick ────────────────────────────
            _ = tick.tick() => {
                let sweep = scheduler.sweep(&mut window, Instant::now().into_std());
                if sweep.is_empty() {
                    continue;
                }

                for message in &sweep.resend {
                    log::debug!("[tx] timeout: resending seq={}", message.seq);
                    transmit(&*transport, message, dest).await;
                }
                for expired in sweep.expired {
                    log::warn!(
                        "[tx] giving up on seq={} after {} retries",
                        expired.message.seq,
                        expired.retries
                    );
                    failed.get_or_insert(expired.message.seq);
                    notify(
                        &notices,
                        SenderNotice::Undeliverable {
                            seq: expired.message.seq,
                            command: expired.message.command,
                            retries: expired.retries,
                        },
                    );
                }
            }
        }
    }
}

/// Put `message` on the wire.  A failed send leaves the entry in the window
/// for the next sweep to retry.
async fn transmit<T: Transport>(transport: &T, message: &Message, dest: SocketAddr) {
    if let Err(e) = transport.send_to(&message.encode(), dest).await {
        log::warn!("[tx] send of seq={} to {dest} failed: {e}", message.seq);
    }
}

/// Hand a notice to the application without ever blocking the loop.
fn notify(notices: &mpsc::Sender<SenderNotice>, notice: SenderNotice) {
    match notices.try_send(notice) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(notice)) => {
            log::warn!("[tx] notice queue full; dropping {notice:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
