//! Protocol tuning knobs.
//!
//! [`ProtocolConfig::default`] carries the values both peers must agree on for
//! interoperability: a window of 6 commands, a 2 s retransmission timeout and
//! a 1 s scheduler tick.  Everything else is local policy.

use std::net::{IpAddr, Ipv6Addr};
use std::time::Duration;

/// Default multicast group for command traffic.
pub const DEFAULT_GROUP: IpAddr = IpAddr::V6(Ipv6Addr::new(0xff3e, 0x40, 0x2001, 0, 0, 0, 0, 1));

/// Default UDP port for command traffic.
pub const DEFAULT_PORT: u16 = 7777;

/// Adjustable parameters for one protocol session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Maximum number of unacknowledged commands in flight.
    pub window_size: usize,
    /// Age after which an in-flight command is resent.
    pub retransmit_timeout: Duration,
    /// Period of the retransmission scan.
    pub tick: Duration,
    /// Resends allowed per command before it is reported as undeliverable.
    ///
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    /// How far past the next expected sequence number the receiver will
    /// buffer.  Arrivals beyond `next_expected + reorder_limit` are dropped.
    pub reorder_limit: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::with_window(6)
    }
}

impl ProtocolConfig {
    /// Defaults with a custom window; the reorder limit follows the window.
    pub fn with_window(window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            window_size,
            retransmit_timeout: Duration::from_secs(2),
            tick: Duration::from_secs(1),
            max_retries: None,
            reorder_limit: window_size as u64,
        }
    }

    pub fn retransmit_timeout(mut self, timeout: Duration) -> Self {
        self.retransmit_timeout = timeout;
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn reorder_limit(mut self, limit: u64) -> Self {
        self.reorder_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_constants() {
        let c = ProtocolConfig::default();
        assert_eq!(c.window_size, 6);
        assert_eq!(c.retransmit_timeout, Duration::from_secs(2));
        assert_eq!(c.tick, Duration::from_secs(1));
        assert_eq!(c.max_retries, None);
        assert_eq!(c.reorder_limit, 6);
    }

    #[test]
    fn reorder_limit_follows_window() {
        assert_eq!(ProtocolConfig::with_window(16).reorder_limit, 16);
    }

    #[test]
    fn default_group_is_multicast() {
        assert!(DEFAULT_GROUP.is_multicast());
        assert_eq!(DEFAULT_GROUP.to_string(), "ff3e:40:2001::1");
    }

    #[test]
    #[should_panic(expected = "window_size must be at least 1")]
    fn zero_window_panics() {
        let _ = ProtocolConfig::with_window(0);
    }
}
