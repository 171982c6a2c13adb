//! Entry point for `cmd-over-multicast`.
//!
//! Parses CLI arguments and dispatches into either **sender** or **receiver**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, signal handling, argument parsing).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use cmd_over_multicast::config::{DEFAULT_GROUP, DEFAULT_PORT};
use cmd_over_multicast::playback::Playback;
use cmd_over_multicast::{
    AckKind, CommandReceiver, CommandSender, ProtocolConfig, SendError, SenderNotice, UdpTransport,
};

/// Reliable, ordered command delivery over multicast UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Read commands from stdin, one per line, and send them to the group.
    Sender {
        #[command(flatten)]
        net: Network,
        /// Multicast TTL / hop limit.
        #[arg(long, default_value_t = 1)]
        hops: u32,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Join the group and answer commands with the playback-status app.
    Receiver {
        #[command(flatten)]
        net: Network,
        #[command(flatten)]
        tuning: Tuning,
    },
}

#[derive(Args)]
struct Network {
    /// Multicast group address.
    #[arg(short, long, default_value_t = DEFAULT_GROUP)]
    group: IpAddr,
    /// UDP port of the group.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// IPv6 interface index (0 = OS default).
    #[arg(short, long, default_value_t = 0)]
    interface: u32,
}

#[derive(Args)]
struct Tuning {
    /// Commands allowed in flight.
    #[arg(short, long, default_value_t = 6)]
    window: usize,
    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    /// Retransmission scan period in milliseconds.
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,
    /// Give up on a command after this many resends (default: never).
    #[arg(long)]
    max_retries: Option<u32>,
    /// Receiver reorder buffer reach (default: the window size).
    #[arg(long)]
    reorder_limit: Option<u64>,
}

impl Tuning {
    fn to_config(&self) -> Result<ProtocolConfig> {
        anyhow::ensure!(self.window >= 1, "--window must be at least 1");
        anyhow::ensure!(self.tick_ms >= 1, "--tick-ms must be at least 1");
        let config = ProtocolConfig::with_window(self.window)
            .retransmit_timeout(Duration::from_millis(self.timeout_ms))
            .tick(Duration::from_millis(self.tick_ms))
            .max_retries(self.max_retries);
        Ok(match self.reorder_limit {
            Some(limit) => config.reorder_limit(limit),
            None => config,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Sender { net, hops, tuning } => run_sender(net, hops, tuning.to_config()?).await,
        Mode::Receiver { net, tuning } => run_receiver(net, tuning.to_config()?).await,
    }
}

async fn run_sender(net: Network, hops: u32, config: ProtocolConfig) -> Result<()> {
    let transport = UdpTransport::multicast_sender(net.group, hops, net.interface)
        .await
        .with_context(|| format!("opening sender socket for {}", net.group))?;
    let dest = SocketAddr::new(net.group, net.port);
    log::info!("Sending to {dest}");

    let tick = config.tick;
    let sender = CommandSender::spawn(Arc::new(transport), dest, config);
    let (handle, mut notices) = sender.into_parts();

    let printer = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice {
                SenderNotice::Reply(ack) => match ack.kind {
                    AckKind::Response(text) => println!("[{}] {text}", fmt_ack(ack.ack)),
                    AckKind::Buffered => {
                        log::info!("receiver buffered; acked up to {}", fmt_ack(ack.ack))
                    }
                    AckKind::Duplicate => {
                        log::info!("receiver already had seq {}", fmt_ack(ack.ack))
                    }
                },
                SenderNotice::Undeliverable { seq, command, retries } => {
                    eprintln!("undeliverable: seq={seq} {command:?} after {retries} retries");
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else {
            break;
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        match handle.try_send(command).await {
            Ok(seq) => log::info!("queued seq={seq} {command:?}"),
            Err(SendError::WindowFull(full)) => {
                eprintln!("{full}; wait for replies and try again");
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Stdin closed: wait for outstanding commands before exiting.
    let drain = async {
        let mut poll = tokio::time::interval(tick);
        loop {
            poll.tick().await;
            match handle.stats().await {
                Ok(stats) if stats.in_flight > 0 => continue,
                _ => break,
            }
        }
    };
    tokio::select! {
        _ = drain => {}
        _ = tokio::signal::ctrl_c() => log::info!("interrupted with commands in flight"),
    }

    drop(handle);
    printer.abort();
    Ok(())
}

async fn run_receiver(net: Network, config: ProtocolConfig) -> Result<()> {
    let transport = UdpTransport::join_group(net.group, net.port, net.interface)
        .await
        .with_context(|| format!("joining {} on port {}", net.group, net.port))?;
    log::info!("Receiver joined {}:{}", net.group, net.port);

    let receiver = CommandReceiver::new(Arc::new(transport), &config, Playback::default());
    tokio::select! {
        _ = receiver.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
            log::info!("Receiver shutting down");
        }
    }
    Ok(())
}

fn fmt_ack(ack: Option<u64>) -> String {
    ack.map_or_else(|| "-".to_owned(), |a| a.to_string())
}
