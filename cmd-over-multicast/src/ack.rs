//! Acknowledgement records.
//!
//! Every command arrival is answered with exactly one [`Ack`] per outcome:
//!
//! | Kind                  | `ack` field              | Command text      |
//! |-----------------------|--------------------------|-------------------|
//! | [`AckKind::Response`] | seq just delivered       | `ACK:<response>`  |
//! | [`AckKind::Buffered`] | `next_expected - 1`      | `ACK:BUFFERED`    |
//! | [`AckKind::Duplicate`]| seq of the duplicate     | `ACK:DUPLICADO`   |
//!
//! ACKs travel as ordinary [`Message`]s with sequence number `0`, unicast
//! back to whichever address the command came from.

use std::net::SocketAddr;

use crate::message::Message;
use crate::socket::Transport;

/// Prefix of every acknowledgement's command text.
pub const ACK_PREFIX: &str = "ACK:";
/// Marker for an arrival parked in the reorder buffer.
pub const BUFFERED_MARKER: &str = "BUFFERED";
/// Marker for an arrival that was already delivered.
pub const DUPLICATE_MARKER: &str = "DUPLICADO";

/// Sequence number carried by acknowledgements; the field is unused there.
const ACK_SEQ: u64 = 0;

/// What an acknowledgement reports about the arrival it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckKind {
    /// The command was delivered; carries the application's response.
    Response(String),
    /// The command is ahead of a gap and was buffered.
    Buffered,
    /// The command had already been delivered.
    Duplicate,
}

/// A cumulative acknowledgement plus what happened to the arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub ack: Option<u64>,
    pub kind: AckKind,
}

impl Ack {
    pub fn response(seq: u64, text: impl Into<String>) -> Self {
        Self {
            ack: Some(seq),
            kind: AckKind::Response(text.into()),
        }
    }

    pub fn buffered(ack: Option<u64>) -> Self {
        Self {
            ack,
            kind: AckKind::Buffered,
        }
    }

    pub fn duplicate(seq: u64) -> Self {
        Self {
            ack: Some(seq),
            kind: AckKind::Duplicate,
        }
    }

    /// Wire record for this acknowledgement.
    pub fn to_message(&self) -> Message {
        let text = match &self.kind {
            AckKind::Response(response) => format!("{ACK_PREFIX}{response}"),
            AckKind::Buffered => format!("{ACK_PREFIX}{BUFFERED_MARKER}"),
            AckKind::Duplicate => format!("{ACK_PREFIX}{DUPLICATE_MARKER}"),
        };
        Message::new(ACK_SEQ, self.ack, text)
    }

    /// Classify a reply received by the sender.
    ///
    /// Replies without the `ACK:` prefix are still honoured for their ack
    /// number; their whole text is treated as a response.
    ///
    /// The markers share the response namespace: an application response
    /// that is literally `BUFFERED` or `DUPLICADO` is classified as that
    /// marker, since the wire record cannot tell them apart.
    pub fn from_message(message: &Message) -> Self {
        let body = message
            .command
            .strip_prefix(ACK_PREFIX)
            .unwrap_or(&message.command);
        let kind = match body {
            BUFFERED_MARKER => AckKind::Buffered,
            DUPLICATE_MARKER => AckKind::Duplicate,
            other => AckKind::Response(other.to_owned()),
        };
        Self {
            ack: message.ack,
            kind,
        }
    }
}

/// Send `ack` to `reply_to`.
///
/// Failures are logged and swallowed: a lost ACK is recovered by the peer's
/// retransmission.
pub async fn emit<T: Transport>(transport: &T, ack: &Ack, reply_to: SocketAddr) {
    let datagram = ack.to_message().encode();
    match transport.send_to(&datagram, reply_to).await {
        Ok(()) => log::debug!("[rx] → ACK ack={:?} {:?} to {reply_to}", ack.ack, ack.kind),
        Err(e) => log::warn!("[rx] failed to send ACK to {reply_to}: {e}"),
    }
}
