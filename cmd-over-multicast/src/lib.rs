//! `cmd-over-multicast`: reliable, ordered command delivery over multicast UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────────┐  seq:ack:command   ┌─────────────────┐
//!  │ CommandSender  │───────────────────▶│ CommandReceiver │
//!  │  SendWindow    │   (multicast)      │  Sequencer      │
//!  │  Retransmit-   │                    │  CommandHandler │
//!  │   Scheduler    │◀───────────────────│                 │
//!  └───────┬────────┘  0:ack:ACK:...     └────────┬────────┘
//!          │             (unicast)                │
//!          │          raw UDP datagrams           │
//!  ┌───────▼──────────────────────────────────────▼────────┐
//!  │  Transport  (UdpTransport, or Simulator for tests)    │
//!  └───────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`message`]     : wire record codec
//! - [`config`]      : protocol constants and tunables
//! - [`send_window`] : outbound window state machine
//! - [`timer`]       : timeout-driven retransmission
//! - [`sender`]      : sender session task and handles
//! - [`sequencer`]   : inbound in-order delivery state machine
//! - [`ack`]         : acknowledgement records and emission
//! - [`receiver`]    : receiver loop
//! - [`playback`]    : playback-status application for the receiver binary
//! - [`simulator`]   : optional lossy/reorder network layer for testing
//! - [`socket`]      : async UDP and multicast transport

pub mod ack;
pub mod config;
pub mod message;
pub mod playback;
pub mod receiver;
pub mod send_window;
pub mod sender;
pub mod sequencer;
pub mod simulator;
pub mod socket;
pub mod timer;

pub use ack::{Ack, AckKind};
pub use config::ProtocolConfig;
pub use message::{DecodeError, Message};
pub use receiver::CommandReceiver;
pub use send_window::WindowFull;
pub use sender::{CommandSender, SendError, SenderHandle, SenderNotice, WindowStats};
pub use sequencer::CommandHandler;
pub use socket::{Transport, TransportError, UdpTransport};
