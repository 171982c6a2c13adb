//! Timeout-driven retransmission.
//!
//! Reliable delivery requires that unacknowledged commands are re-sent if no
//! ACK arrives within a bounded time.  The session calls
//! [`RetransmitScheduler::sweep`] once per tick; the sweep:
//! - resends every in-flight command older than the retransmit timeout, with
//!   its original sequence number and text, and refreshes its timestamp;
//! - evicts commands that have used up their retry budget, if one is
//!   configured, so the caller can report them as undeliverable.
//!
//! There is no back-off: a timed-out command is resent at most once per tick
//! and never sooner than one timeout after its previous transmission.

use std::time::{Duration, Instant};

use crate::config::ProtocolConfig;
use crate::message::Message;
use crate::send_window::{InFlight, SendWindow};

/// Outcome of one retransmission scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sweep {
    /// Records to put back on the wire, oldest first.
    pub resend: Vec<Message>,
    /// Commands dropped from the window after exhausting their retries.
    pub expired: Vec<InFlight>,
}

impl Sweep {
    pub fn is_empty(&self) -> bool {
        self.resend.is_empty() && self.expired.is_empty()
    }
}

/// Retransmission policy for one session.
#[derive(Debug, Clone, Copy)]
pub struct RetransmitScheduler {
    timeout: Duration,
    max_retries: Option<u32>,
}

impl RetransmitScheduler {
    pub fn new(timeout: Duration, max_retries: Option<u32>) -> Self {
        Self {
            timeout,
            max_retries,
        }
    }

    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self::new(config.retransmit_timeout, config.max_retries)
    }

    /// Scan `window` at time `now`.
    ///
    /// An entry is due when strictly more than the timeout has elapsed since
    /// it was last sent.
    pub fn sweep(&self, window: &mut SendWindow, now: Instant) -> Sweep {
        let mut resend = Vec::new();
        let mut exhausted = Vec::new();

        for (&seq, entry) in window.entries_mut() {
            if now.saturating_duration_since(entry.sent_at) <= self.timeout {
                continue;
            }
            if self.max_retries.is_some_and(|max| entry.retries >= max) {
                exhausted.push(seq);
                continue;
            }
            entry.sent_at = now;
            entry.retries += 1;
            resend.push(entry.message.clone());
        }

        window.record_retransmits(resend.len() as u64);
        let expired = exhausted
            .into_iter()
            .filter_map(|seq| window.evict(seq))
            .collect();

        Sweep { resend, expired }
    }
}
