//! Receiver loop: decode, sequence, deliver, acknowledge.
//!
//! One [`CommandReceiver`] owns the sequencing state for everything arriving
//! on its transport.  Each datagram is handled to completion before the next
//! is read, so the application sees commands one at a time and in order.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::ack;
use crate::config::ProtocolConfig;
use crate::message::Message;
use crate::sequencer::{Arrival, CommandHandler, Sequencer};
use crate::socket::Transport;

/// Serves commands arriving on a transport to an application handler.
#[derive(Debug)]
pub struct CommandReceiver<T, H> {
    transport: Arc<T>,
    sequencer: Sequencer,
    handler: H,
}

impl<T, H> CommandReceiver<T, H>
where
    T: Transport,
    H: CommandHandler + 'static,
{
    pub fn new(transport: Arc<T>, config: &ProtocolConfig, handler: H) -> Self {
        Self {
            transport,
            sequencer: Sequencer::new(config.reorder_limit),
            handler,
        }
    }

    pub fn next_expected(&self) -> u64 {
        self.sequencer.next_expected()
    }

    /// Read and answer one datagram.
    ///
    /// Transport and decode failures are logged and the datagram is skipped.
    pub async fn step(&mut self) {
        let (bytes, from) = match self.transport.recv_from().await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[rx] receive failed: {e}");
                return;
            }
        };
        let message = match Message::decode(&bytes) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("[rx] dropping malformed datagram from {from}: {e}");
                return;
            }
        };

        let arrival = self
            .sequencer
            .on_arrive(message.seq, message.command, &mut self.handler);
        match &arrival {
            Arrival::Delivered(acks) => log::debug!(
                "[rx] ← seq={} delivered {} command(s); next_expected={}",
                message.seq,
                acks.len(),
                self.sequencer.next_expected()
            ),
            Arrival::Buffered(_) => log::debug!(
                "[rx] ← seq={} buffered; waiting for {} ({} parked)",
                message.seq,
                self.sequencer.next_expected(),
                self.sequencer.buffered()
            ),
            Arrival::Duplicate(_) => log::debug!("[rx] ← seq={} duplicate", message.seq),
            Arrival::TooFarAhead => {
                log::warn!(
                    "[rx] ← seq={} too far ahead of {}; dropped",
                    message.seq,
                    self.sequencer.next_expected()
                );
            }
        }

        for ack in arrival.acks() {
            ack::emit(&*self.transport, ack, from).await;
        }
    }

    /// Serve forever.
    pub async fn run(mut self) {
        log::info!("[rx] listening on {}", self.transport.local_addr());
        loop {
            self.step().await;
        }
    }

    /// Run the loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
