//! Sliding-window send-side state machine.
//!
//! [`SendWindow`] admits commands while fewer than `window_size` are awaiting
//! acknowledgement and frees slots on cumulative ACKs.
//!
//! # Protocol contract
//!
//! - At most `window_size` commands may be in flight at once.  A command
//!   offered to a full window is refused immediately; nothing is queued.
//! - Sequence numbers start at 0 and increase by exactly 1 per admitted
//!   command.  They are `u64` and never wrap in practice.
//! - ACKs are **cumulative**: `ack = K` acknowledges every sequence number
//!   `<= K`, however many slots that frees.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::BTreeMap;
use std::time::Instant;

use thiserror::Error;

use crate::message::Message;

/// Refusal returned by [`SendWindow::admit`] when every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("send window full ({capacity} commands in flight)")]
pub struct WindowFull {
    pub capacity: usize,
}

/// A command occupying one slot of the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    /// The record exactly as first transmitted; resends reuse it unchanged.
    pub message: Message,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
    /// How many times this command has been resent (0 = original only).
    pub retries: u32,
}

/// Send-side window state for one session.
///
/// ```text
///   last_ack           next_seq
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── in flight ──▶│ <── sendable ───▶
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Sequence number for the **next** admitted command.
    next_seq: u64,
    /// Highest cumulative ACK seen so far.
    last_ack: Option<u64>,
    /// Maximum number of commands in flight (N).
    window_size: usize,
    /// Unacknowledged commands keyed by sequence number.
    in_flight: BTreeMap<u64, InFlight>,
    /// Total resends over the lifetime of the session.
    retransmit_count: u64,
}

impl SendWindow {
    pub fn new(window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            next_seq: 0,
            last_ack: None,
            window_size,
            in_flight: BTreeMap::new(),
            retransmit_count: 0,
        }
    }

    /// `true` when there is room for at least one more command.
    pub fn can_send(&self) -> bool {
        self.in_flight.len() < self.window_size
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn capacity(&self) -> usize {
        self.window_size
    }

    pub fn has_unacked(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn last_ack(&self) -> Option<u64> {
        self.last_ack
    }

    pub fn retransmit_count(&self) -> u64 {
        self.retransmit_count
    }

    /// Admit `command` into the window.
    ///
    /// Allocates the next sequence number, stamps the record with the current
    /// cumulative ACK and stores it as sent at `now`.  The returned message is
    /// what the caller must put on the wire.
    pub fn admit(&mut self, command: String, now: Instant) -> Result<Message, WindowFull> {
        if !self.can_send() {
            return Err(WindowFull {
                capacity: self.window_size,
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let message = Message::new(seq, self.last_ack, command);
        self.in_flight.insert(
            seq,
            InFlight {
                message: message.clone(),
                sent_at: now,
                retries: 0,
            },
        );
        Ok(message)
    }

    /// Process a cumulative ACK.
    ///
    /// Raises `last_ack` if `ack` is newer and drops every in-flight entry
    /// with sequence number `<= ack`.  Returns the number of slots freed;
    /// `None` and stale ACKs free nothing.
    pub fn on_ack(&mut self, ack: Option<u64>) -> usize {
        let Some(ack) = ack else {
            return 0;
        };
        self.last_ack = self.last_ack.max(Some(ack));

        let before = self.in_flight.len();
        self.in_flight = match ack.checked_add(1) {
            Some(first_kept) => self.in_flight.split_off(&first_kept),
            None => BTreeMap::new(),
        };
        before - self.in_flight.len()
    }

    /// Iterate over all in-flight commands from oldest to newest.
    pub fn entries(&self) -> impl Iterator<Item = (&u64, &InFlight)> {
        self.in_flight.iter()
    }

    /// Mutable access for the retransmission scan.
    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (&u64, &mut InFlight)> {
        self.in_flight.iter_mut()
    }

    /// Add `n` resends to the session total.
    pub(crate) fn record_retransmits(&mut self, n: u64) {
        self.retransmit_count += n;
    }

    /// Remove the entry for `seq` without an ACK (retry budget exhausted).
    pub(crate) fn evict(&mut self, seq: u64) -> Option<InFlight> {
        self.in_flight.remove(&seq)
    }
}
