//! Fault-injecting transport for deterministic testing.
//!
//! Real networks drop, reorder, and duplicate datagrams.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] wraps any [`Transport`] and applies a configurable fault
//! model to outbound datagrams:
//!
//! | Fault        | Description                                          |
//! |--------------|------------------------------------------------------|
//! | Loss         | Drop a datagram with probability `loss_rate`.        |
//! | Duplication  | Send a datagram twice with `duplicate_rate`.         |
//! | Reordering   | Hold a datagram back for `reorder_delay` with        |
//! |              | `reorder_rate`, letting later ones overtake it.      |
//!
//! Inbound datagrams pass through untouched; wrap both peers to impair both
//! directions.  All randomness comes from a ChaCha8 RNG seeded from
//! [`SimulatorConfig::seed`], so a failing run can be replayed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::socket::{Transport, TransportError};

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a delivered datagram is sent twice.
    pub duplicate_rate: f64,
    /// Probability that a delivered datagram is delayed.
    pub reorder_rate: f64,
    /// Delay applied to reordered datagrams.
    pub reorder_delay: Duration,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            reorder_delay: Duration::ZERO,
            seed: 0,
        }
    }
}

/// Counters of faults injected so far.
#[derive(Debug, Default)]
pub struct SimulatorStats {
    pub sent: AtomicU64,
    pub dropped: AtomicU64,
    pub duplicated: AtomicU64,
    pub delayed: AtomicU64,
}

/// What happens to one outbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Drop,
    Deliver { copies: u8, delayed: bool },
}

/// A fault-injecting wrapper around another transport.
#[derive(Debug)]
pub struct Simulator<T> {
    inner: Arc<T>,
    config: SimulatorConfig,
    rng: Mutex<ChaCha8Rng>,
    stats: SimulatorStats,
}

impl<T: Transport> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            inner: Arc::new(inner),
            config,
            rng: Mutex::new(rng),
            stats: SimulatorStats::default(),
        }
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    fn roll(&self) -> Fate {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if rng.gen_bool(self.config.loss_rate) {
            return Fate::Drop;
        }
        let copies = if rng.gen_bool(self.config.duplicate_rate) { 2 } else { 1 };
        let delayed = rng.gen_bool(self.config.reorder_rate);
        Fate::Deliver { copies, delayed }
    }
}

impl<T: Transport> Transport for Simulator<T> {
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.stats.sent.fetch_add(1, Ordering::Relaxed);

        let (copies, delayed) = match self.roll() {
            Fate::Drop => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("[sim] dropped {} bytes to {dest}", datagram.len());
                return Ok(());
            }
            Fate::Deliver { copies, delayed } => (copies, delayed),
        };
        if copies > 1 {
            self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
        }

        if delayed {
            self.stats.delayed.fetch_add(1, Ordering::Relaxed);
            let inner = Arc::clone(&self.inner);
            let datagram = datagram.to_vec();
            let delay = self.config.reorder_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                for _ in 0..copies {
                    if let Err(e) = inner.send_to(&datagram, dest).await {
                        log::debug!("[sim] delayed send to {dest} failed: {e}");
                    }
                }
            });
            return Ok(());
        }

        for _ in 0..copies {
            self.inner.send_to(datagram, dest).await?;
        }
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        self.inner.recv_from().await
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::UdpTransport;

    async fn loopback() -> UdpTransport {
        UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn default_config_is_pass_through() {
        let sim = Simulator::new(loopback().await, SimulatorConfig::default());
        let peer = loopback().await;

        sim.send_to(b"hello", peer.local_addr()).await.unwrap();
        let (bytes, from) = peer.recv_from().await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(from, sim.local_addr());
        assert_eq!(sim.stats().dropped.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn full_loss_drops_everything() {
        let config = SimulatorConfig {
            loss_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let sim = Simulator::new(loopback().await, config);
        let peer = loopback().await;

        for _ in 0..10 {
            sim.send_to(b"gone", peer.local_addr()).await.unwrap();
        }
        assert_eq!(sim.stats().sent.load(Ordering::Relaxed), 10);
        assert_eq!(sim.stats().dropped.load(Ordering::Relaxed), 10);

        let nothing =
            tokio::time::timeout(Duration::from_millis(100), peer.recv_from()).await;
        assert!(nothing.is_err(), "a dropped datagram was delivered");
    }

    #[tokio::test]
    async fn full_duplication_sends_twice() {
        let config = SimulatorConfig {
            duplicate_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let sim = Simulator::new(loopback().await, config);
        let peer = loopback().await;

        sim.send_to(b"twice", peer.local_addr()).await.unwrap();
        assert_eq!(peer.recv_from().await.unwrap().0, b"twice");
        assert_eq!(peer.recv_from().await.unwrap().0, b"twice");
    }

    #[tokio::test]
    async fn delayed_datagram_is_overtaken() {
        let config = SimulatorConfig {
            reorder_rate: 1.0,
            reorder_delay: Duration::from_millis(200),
            ..SimulatorConfig::default()
        };
        let sim = Simulator::new(loopback().await, config);
        let direct = loopback().await;
        let peer = loopback().await;

        sim.send_to(b"late", peer.local_addr()).await.unwrap();
        direct.send_to(b"early", peer.local_addr()).await.unwrap();

        assert_eq!(peer.recv_from().await.unwrap().0, b"early");
        assert_eq!(peer.recv_from().await.unwrap().0, b"late");
    }

    #[tokio::test]
    async fn same_seed_same_fates() {
        let config = SimulatorConfig {
            loss_rate: 0.3,
            duplicate_rate: 0.2,
            reorder_rate: 0.2,
            seed: 7,
            ..SimulatorConfig::default()
        };
        let a = Simulator::new(loopback().await, config.clone());
        let b = Simulator::new(loopback().await, config);

        let fates_a: Vec<Fate> = (0..64).map(|_| a.roll()).collect();
        let fates_b: Vec<Fate> = (0..64).map(|_| b.roll()).collect();
        assert_eq!(fates_a, fates_b);
        assert!(fates_a.contains(&Fate::Drop));
    }
}
