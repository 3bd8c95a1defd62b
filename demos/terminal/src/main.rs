//! clocksync terminal front end.
//!
//! ```text
//! clocksync server [--step-mode] [--bind <addr>]
//! clocksync client <name> <server_addr> [--start-time <t>] [--step-mode]
//! ```
//!
//! In step mode, press Enter to let the paused role continue.
//!
//! Environment variables:
//! - CLOCKSYNC_LOG: tracing filter directive (default `info`)

mod reporter;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clocksync::client::{Initiator, InitiatorBuilder};
use clocksync::core::{COORDINATION_PORT, StepGate};
use clocksync::server::{Responder, ResponderBuilder};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::reporter::TerminalReporter;

#[derive(Parser, Debug)]
#[command(name = "clocksync")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the responder (time reference)
    Server {
        /// Pause before each sync, follow-up and delay reply until Enter is pressed
        #[arg(long)]
        step_mode: bool,

        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:5555")]
        bind: SocketAddr,
    },

    /// Run an initiator that synchronizes against a responder
    Client {
        /// Peer id announced to the responder
        name: String,

        /// Responder host, optionally with a port (defaults to 5555)
        server_addr: String,

        /// Initial clock value
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        start_time: i64,

        /// Pause between phases until Enter is pressed
        #[arg(long)]
        step_mode: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("CLOCKSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let reporter = Arc::new(TerminalReporter::new());

    match cli.command {
        Commands::Server { step_mode, bind } => {
            let config = ResponderBuilder::new()
                .bind_addr(bind)
                .step_mode(step_mode)
                .build();
            let responder = Responder::bind(config, reporter)
                .await
                .with_context(|| format!("failed to start responder on {bind}"))?;
            let gate = responder.step_gate();
            supervise(responder.run(), gate).await
        }
        Commands::Client {
            name,
            server_addr,
            start_time,
            step_mode,
        } => {
            let server_addr = resolve(&server_addr).await?;
            let config = InitiatorBuilder::new()
                .peer_id(name)
                .server_addr(server_addr)
                .start_time(start_time)
                .step_mode(step_mode)
                .build();
            let initiator = Initiator::bind(config, reporter)
                .await
                .context("failed to start initiator")?;
            let gate = initiator.step_gate();
            supervise(initiator.run(), gate).await
        }
    }
}

/// Resolve `host` or `host:port`; a bare host gets the coordination port.
async fn resolve(server: &str) -> Result<SocketAddr> {
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let addrs: Vec<SocketAddr> = match tokio::net::lookup_host(server).await {
        Ok(addrs) => addrs.collect(),
        Err(_) => tokio::net::lookup_host((server, COORDINATION_PORT))
            .await
            .with_context(|| format!("failed to resolve {server}"))?
            .collect(),
    };

    match addrs.iter().find(|a| a.is_ipv4()).or(addrs.first()) {
        Some(addr) => Ok(*addr),
        None => bail!("{server} did not resolve to any address"),
    }
}

/// Run a role until it fails or ctrl-c arrives, forwarding Enter presses to
/// its step gate.
async fn supervise<F>(role: F, gate: Arc<StepGate>) -> Result<()>
where
    F: Future<Output = Result<(), clocksync::ClockSyncError>>,
{
    let stdin = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if !gate.signal() {
                tracing::debug!("step signal ignored, nothing is paused");
            }
        }
    });

    let result = tokio::select! {
        result = role => result.context("protocol run failed"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
    };

    stdin.abort();
    result
}
