//! Receive-side sequencing.
//!
//! [`Sequencer`] hands commands to the application strictly in sequence-number
//! order, whatever order they arrive in:
//!
//! - **In order** (seq == `next_expected`): delivered at once, followed by every
//!   buffered command that has just become contiguous.  Each delivery gets its
//!   own ACK.
//! - **Ahead** (seq > `next_expected`): parked in the reorder buffer and
//!   answered with a BUFFERED ACK of `next_expected - 1`.
//! - **Behind** (seq < `next_expected`): already delivered; answered with a
//!   DUPLICATE ACK for that seq and never re-delivered.
//! - **Too far ahead** (seq > `next_expected + reorder_limit`): dropped without
//!   an ACK.  A sender bounded by its window can never legitimately get there.
//!
//! Invariant: the reorder buffer never holds a key `<= next_expected`.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::BTreeMap;

use crate::ack::Ack;

/// The application behind the receiver.
///
/// Commands and responses are opaque to the protocol.
pub trait CommandHandler: Send {
    fn handle(&mut self, command: &str) -> String;
}

impl<F> CommandHandler for F
where
    F: FnMut(&str) -> String + Send,
{
    fn handle(&mut self, command: &str) -> String {
        self(command)
    }
}

/// How an arrival was classified, with the ACKs it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// The arrival and `acks.len() - 1` buffered successors were delivered.
    Delivered(Vec<Ack>),
    Buffered(Ack),
    Duplicate(Ack),
    /// Beyond the reorder limit; nothing is sent back.
    TooFarAhead,
}

impl Arrival {
    /// ACKs to send back, in order.
    pub fn acks(&self) -> &[Ack] {
        match self {
            Self::Delivered(acks) => acks,
            Self::Buffered(ack) | Self::Duplicate(ack) => std::slice::from_ref(ack),
            Self::TooFarAhead => &[],
        }
    }
}

/// Receive-side state for one session.
#[derive(Debug)]
pub struct Sequencer {
    /// Next sequence number the application has not seen yet.
    next_expected: u64,
    /// Commands that arrived ahead of a gap.
    reorder_buffer: BTreeMap<u64, String>,
    /// Maximum distance ahead of `next_expected` accepted into the buffer.
    reorder_limit: u64,
}

impl Sequencer {
    pub fn new(reorder_limit: u64) -> Self {
        Self {
            next_expected: 0,
            reorder_buffer: BTreeMap::new(),
            reorder_limit,
        }
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Number of commands parked in the reorder buffer.
    pub fn buffered(&self) -> usize {
        self.reorder_buffer.len()
    }

    /// Process an inbound command, delivering whatever became deliverable to
    /// `app`.
    pub fn on_arrive<H>(&mut self, seq: u64, command: String, app: &mut H) -> Arrival
    where
        H: CommandHandler + ?Sized,
    {
        if seq < self.next_expected {
            return Arrival::Duplicate(Ack::duplicate(seq));
        }

        if seq > self.next_expected {
            if seq - self.next_expected > self.reorder_limit {
                return Arrival::TooFarAhead;
            }
            self.reorder_buffer.insert(seq, command);
            return Arrival::Buffered(Ack::buffered(self.next_expected.checked_sub(1)));
        }

        let mut acks = vec![self.deliver(command, app)];
        while let Some(next) = self.reorder_buffer.remove(&self.next_expected) {
            acks.push(self.deliver(next, app));
        }
        Arrival::Delivered(acks)
    }

    fn deliver<H>(&mut self, command: String, app: &mut H) -> Ack
    where
        H: CommandHandler + ?Sized,
    {
        let seq = self.next_expected;
        let response = app.handle(&command);
        self.next_expected += 1;
        Ack::response(seq, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::AckKind;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Records every delivered command and answers with its upper-case form.
    #[derive(Default)]
    struct Recorder {
        delivered: Vec<String>,
    }

    impl CommandHandler for Recorder {
        fn handle(&mut self, command: &str) -> String {
            self.delivered.push(command.to_owned());
            command.to_uppercase()
        }
    }

    fn acked(arrival: &Arrival) -> Vec<Option<u64>> {
        arrival.acks().iter().map(|a| a.ack).collect()
    }

    #[test]
    fn initial_state() {
        let s = Sequencer::new(6);
        assert_eq!(s.next_expected(), 0);
        assert_eq!(s.buffered(), 0);
    }

    #[test]
    fn in_order_arrival_is_delivered_and_acked() {
        let mut s = Sequencer::new(6);
        let mut app = Recorder::default();

        let arrival = s.on_arrive(0, "play".into(), &mut app);
        assert_eq!(arrival, Arrival::Delivered(vec![Ack::response(0, "PLAY")]));
        assert_eq!(s.next_expected(), 1);
        assert_eq!(app.delivered, vec!["play"]);
    }

    #[test]
    fn future_arrival_is_buffered() {
        let mut s = Sequencer::new(6);
        let mut app = Recorder::default();
        s.on_arrive(0, "a".into(), &mut app);

        let arrival = s.on_arrive(3, "d".into(), &mut app);
        assert_eq!(arrival, Arrival::Buffered(Ack::buffered(Some(0))));
        assert_eq!(s.buffered(), 1);
        assert_eq!(app.delivered, vec!["a"]);
    }

    #[test]
    fn buffered_ack_before_anything_delivered_is_empty() {
        let mut s = Sequencer::new(6);
        let arrival = s.on_arrive(1, "b".into(), &mut Recorder::default());
        assert_eq!(arrival, Arrival::Buffered(Ack::buffered(None)));
    }

    #[test]
    fn buffering_law() {
        // next_expected = k = 2; k+2 arrives first, then k, then k+1.
        let mut s = Sequencer::new(6);
        let mut app = Recorder::default();
        s.on_arrive(0, "c0".into(), &mut app);
        s.on_arrive(1, "c1".into(), &mut app);

        let ahead = s.on_arrive(4, "c4".into(), &mut app);
        assert_eq!(ahead.acks()[0].kind, AckKind::Buffered);
        assert_eq!(acked(&ahead), vec![Some(1)]);

        let k = s.on_arrive(2, "c2".into(), &mut app);
        assert_eq!(acked(&k), vec![Some(2)]);

        let drained = s.on_arrive(3, "c3".into(), &mut app);
        assert_eq!(acked(&drained), vec![Some(3), Some(4)]);
        assert!(matches!(drained, Arrival::Delivered(_)));

        assert_eq!(app.delivered, vec!["c0", "c1", "c2", "c3", "c4"]);
        assert_eq!(s.next_expected(), 5);
        assert_eq!(s.buffered(), 0);
    }

    #[test]
    fn each_drained_command_gets_its_own_response() {
        let mut s = Sequencer::new(6);
        let mut app = Recorder::default();
        s.on_arrive(2, "two".into(), &mut app);
        s.on_arrive(1, "one".into(), &mut app);

        let arrival = s.on_arrive(0, "zero".into(), &mut app);
        assert_eq!(
            arrival,
            Arrival::Delivered(vec![
                Ack::response(0, "ZERO"),
                Ack::response(1, "ONE"),
                Ack::response(2, "TWO"),
            ])
        );
    }

    #[test]
    fn duplicate_is_not_redelivered() {
        let mut s = Sequencer::new(6);
        let mut app = Recorder::default();
        s.on_arrive(0, "a".into(), &mut app);
        s.on_arrive(1, "b".into(), &mut app);

        for _ in 0..3 {
            let arrival = s.on_arrive(0, "a".into(), &mut app);
            assert_eq!(arrival, Arrival::Duplicate(Ack::duplicate(0)));
        }
        assert_eq!(app.delivered, vec!["a", "b"]);
        assert_eq!(s.next_expected(), 2);
    }

    #[test]
    fn repeated_future_arrival_overwrites_buffer_slot() {
        let mut s = Sequencer::new(6);
        let mut app = Recorder::default();
        s.on_arrive(1, "first".into(), &mut app);
        s.on_arrive(1, "second".into(), &mut app);
        assert_eq!(s.buffered(), 1);

        s.on_arrive(0, "zero".into(), &mut app);
        assert_eq!(app.delivered, vec!["zero", "second"]);
    }

    #[test]
    fn arrival_past_reorder_limit_is_dropped() {
        let mut s = Sequencer::new(6);
        let mut app = Recorder::default();

        assert!(matches!(s.on_arrive(6, "edge".into(), &mut app), Arrival::Buffered(_)));
        let arrival = s.on_arrive(7, "far".into(), &mut app);
        assert_eq!(arrival, Arrival::TooFarAhead);
        assert!(arrival.acks().is_empty());
        assert_eq!(s.buffered(), 1);
    }

    #[test]
    fn closure_handler() {
        let mut s = Sequencer::new(6);
        let mut count = 0;
        let mut app = |cmd: &str| {
            count += 1;
            format!("{cmd}#{count}")
        };
        let arrival = s.on_arrive(0, "STATUS".into(), &mut app);
        assert_eq!(arrival.acks()[0], Ack::response(0, "STATUS#1"));
    }

    #[test]
    fn any_interleaving_delivers_in_order_exactly_once() {
        const COUNT: u64 = 24;

        for seed in 0..64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            // Every seq at least once, some twice, in random order.
            let mut arrivals: Vec<u64> = (0..COUNT).collect();
            arrivals.extend((0..COUNT).filter(|s| s % 3 == seed % 3));
            arrivals.shuffle(&mut rng);

            let mut s = Sequencer::new(COUNT);
            let mut app = Recorder::default();
            for seq in arrivals {
                s.on_arrive(seq, format!("cmd-{seq}"), &mut app);
                assert!(s.reorder_buffer.keys().all(|k| *k > s.next_expected()));
            }

            let expected: Vec<String> = (0..COUNT).map(|i| format!("cmd-{i}")).collect();
            assert_eq!(app.delivered, expected, "seed {seed}");
            assert_eq!(s.buffered(), 0);
        }
    }
}
