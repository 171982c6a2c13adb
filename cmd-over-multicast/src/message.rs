//! Wire-format definitions for command records.
//!
//! Every datagram exchanged between peers is a [`Message`].  This module is
//! responsible for:
//! - Defining the on-wire textual layout.
//! - Serialising a [`Message`] into a byte buffer ready for transmission.
//! - Parsing a raw byte slice back into a [`Message`], returning errors for
//!   malformed input.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! ```text
//! <seq>:<ack>:<command>
//! ```
//!
//! The record is split into at most three parts, so the command may itself
//! contain `:`.  `seq` is a non-negative decimal integer.  `ack` is either a
//! non-negative decimal integer or `-1`, meaning "nothing acknowledged yet".

use std::fmt;

use thiserror::Error;

/// Field separator on the wire.
pub const SEPARATOR: char = ':';

/// Textual form of an absent ack number.
const NO_ACK: &str = "-1";

/// One protocol record: a command travelling sender → receiver, or an
/// acknowledgement travelling back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sequence number of the command (unused, `0`, on acknowledgements).
    pub seq: u64,
    /// Cumulative acknowledgement, `None` before anything has been acked.
    pub ack: Option<u64>,
    /// Opaque command or reply text.
    pub command: String,
}

impl Message {
    pub fn new(seq: u64, ack: Option<u64>, command: impl Into<String>) -> Self {
        Self {
            seq,
            ack,
            command: command.into(),
        }
    }

    /// Serialise this message into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse a [`Message`] from a raw datagram.
    ///
    /// The datagram must be exactly the record; every byte after the second
    /// separator belongs to the command.
    ///
    /// Returns [`Err`] if:
    /// - the datagram is not valid UTF-8,
    /// - fewer than three `:`-separated parts are present, or
    /// - the sequence or ack field is not a valid number.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(buf).map_err(|_| DecodeError::NotUtf8)?;

        let mut parts = text.splitn(3, SEPARATOR);
        let (Some(seq), Some(ack), Some(command)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(DecodeError::MissingField);
        };

        let seq = seq
            .parse::<u64>()
            .map_err(|_| DecodeError::BadSequence(seq.to_owned()))?;
        let ack = match ack {
            NO_ACK => None,
            other => Some(
                other
                    .parse::<u64>()
                    .map_err(|_| DecodeError::BadAck(other.to_owned()))?,
            ),
        };

        Ok(Self {
            seq,
            ack,
            command: command.to_owned(),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ack {
            Some(ack) => write!(f, "{}{SEPARATOR}{ack}{SEPARATOR}{}", self.seq, self.command),
            None => write!(f, "{}{SEPARATOR}{NO_ACK}{SEPARATOR}{}", self.seq, self.command),
        }
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Datagram bytes are not valid UTF-8.
    #[error("datagram is not valid UTF-8")]
    NotUtf8,
    /// Fewer than three separator-delimited fields.
    #[error("record has fewer than three fields")]
    MissingField,
    /// Sequence field is not a non-negative integer.
    #[error("invalid sequence number {0:?}")]
    BadSequence(String),
    /// Ack field is neither a non-negative integer nor `-1`.
    #[error("invalid ack number {0:?}")]
    BadAck(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Characters that stress the layout: separators, NULs, whitespace.
    const ALPHABET: &[char] = &['a', 'Z', '0', '-', ':', ':', '\0', ' ', '\t', '\n', 'ñ'];

    #[test]
    fn encode_decode_roundtrip() {
        let msg = Message::new(42, Some(41), "PLAY");
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn wire_layout_is_colon_separated() {
        assert_eq!(Message::new(3, Some(2), "STOP").encode(), b"3:2:STOP");
    }

    #[test]
    fn missing_ack_encodes_as_minus_one() {
        let msg = Message::new(0, None, "PLAY");
        assert_eq!(msg.encode(), b"0:-1:PLAY");
        assert_eq!(Message::decode(b"0:-1:PLAY").unwrap(), msg);
    }

    #[test]
    fn command_may_contain_separator() {
        let msg = Message::new(7, Some(6), "ACK:Estado: Reproduciendo");
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.command, "ACK:Estado: Reproduciendo");
    }

    #[test]
    fn empty_command_is_valid() {
        let decoded = Message::decode(b"1:0:").unwrap();
        assert_eq!(decoded, Message::new(1, Some(0), ""));
    }

    #[test]
    fn trailing_nul_is_part_of_command() {
        let msg = Message::new(1, Some(0), "bin\0");
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn trailing_whitespace_is_preserved() {
        let msg = Message::new(2, Some(1), "say hi ");
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn large_numbers_roundtrip() {
        let msg = Message::new(u64::MAX, Some(u64::MAX - 1), "x");
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn too_few_fields_rejected() {
        assert_eq!(Message::decode(b"1:2"), Err(DecodeError::MissingField));
        assert_eq!(Message::decode(b""), Err(DecodeError::MissingField));
    }

    #[test]
    fn non_numeric_seq_rejected() {
        assert_eq!(
            Message::decode(b"JOIN:alice:lobby"),
            Err(DecodeError::BadSequence("JOIN".into()))
        );
    }

    #[test]
    fn negative_seq_rejected() {
        assert_eq!(
            Message::decode(b"-1:0:PLAY"),
            Err(DecodeError::BadSequence("-1".into()))
        );
    }

    #[test]
    fn bad_ack_rejected() {
        assert_eq!(
            Message::decode(b"1:-2:PLAY"),
            Err(DecodeError::BadAck("-2".into()))
        );
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert_eq!(Message::decode(&[0xff, 0xfe, b':']), Err(DecodeError::NotUtf8));
    }

    #[test]
    fn random_records_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        for _ in 0..1_000 {
            let len = rng.gen_range(0..24);
            let command: String = (0..len)
                .map(|_| *ALPHABET.choose(&mut rng).unwrap())
                .collect();
            let ack = if rng.gen_bool(0.2) { None } else { Some(rng.gen()) };
            let msg = Message::new(rng.gen(), ack, command);
            assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
        }
    }
}
