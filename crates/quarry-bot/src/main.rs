//! `quarry-bot`: negotiate a protocol version, ping a server, or play.
//!
//! ```text
//!   quarry-bot --server mc.example.net:25565 ping
//!   quarry-bot negotiate --force --window 3
//!   quarry-bot negotiate --clean
//!   quarry-bot run
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the `info` default). Stdout
//! only carries machine-readable lines.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use quarry::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "quarry-bot", version, about = "Scripted Minecraft mining bot")]
struct Cli {
    /// Server address, `host` or `host:port`.
    #[arg(
        long,
        env = "QUARRY_SERVER",
        default_value = "localhost:25565",
        global = true
    )]
    server: Endpoint,

    /// Offline-mode username.
    #[arg(long, env = "QUARRY_USERNAME", default_value = "MINER", global = true)]
    username: String,

    /// Directory holding the negotiated version and the attempt ledger.
    #[arg(long, env = "QUARRY_STATE_DIR", default_value = ".quarry", global = true)]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Find a protocol version the server accepts and save it.
    Negotiate(NegotiateArgs),
    /// Negotiate unless a version is saved, then join and mine.
    Run {
        /// Wait for `!mine` instead of starting after the world loads.
        #[arg(long, default_value_t = false)]
        no_auto_mine: bool,
    },
    /// Print the server's version and status.
    Ping,
}

#[derive(Debug, Args)]
struct NegotiateArgs {
    /// Ignore the saved version and the ledger; retry every candidate.
    #[arg(long, conflicts_with = "clean")]
    force: bool,

    /// Delete the saved version and the ledger, then exit.
    #[arg(long)]
    clean: bool,

    /// How far around the reported version to look.
    #[arg(long)]
    window: Option<u32>,

    /// Fallback versions, in order. Comma-separated.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    candidates: Vec<i32>,
}

impl Cli {
    fn bot_config(&self) -> BotConfig {
        BotConfig {
            endpoint: self.server.clone(),
            username: self.username.clone(),
            negotiation: NegotiationConfig {
                state_dir: self.state_dir.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = quarry::init_tracing(quarry::DEFAULT_FILTER) {
        eprintln!("warning: {e}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<QuarryError>() {
        Some(QuarryError::Negotiation(e @ NegotiationError::Exhausted { .. })) => {
            eprint!("{}", e.remediation());
        }
        _ => eprintln!("error: {err:#}"),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = cli.bot_config();

    match cli.command {
        Cmd::Ping => {
            let status = Bot::new(config)
                .ping()
                .await
                .context("status ping failed")?;
            println!("{}", status_line(&status));
            print_status_details(&status);
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Negotiate(args) => {
            if let Some(window) = args.window {
                config.negotiation.window_radius = window;
            }
            if !args.candidates.is_empty() {
                config.negotiation.default_candidates = args.candidates;
            }
            let bot = Bot::new(config);

            if args.clean {
                bot.clean()?;
                eprintln!("negotiation state removed");
                return Ok(ExitCode::SUCCESS);
            }

            let outcome = bot.negotiate(args.force).await?;
            println!("PROTOCOL={}", outcome.version);
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Run { no_auto_mine } => {
            config.auto_mine = !no_auto_mine;
            let end = Bot::new(config).run(shutdown_signal()).await?;
            tracing::info!(%end, "bot finished");
            Ok(match end {
                SessionEnd::Stopped | SessionEnd::Interrupted => ExitCode::SUCCESS,
                SessionEnd::ConnectionLost => ExitCode::FAILURE,
            })
        }
    }
}

fn print_status_details(status: &ServerStatus) {
    eprintln!("Server status:");
    eprintln!(
        "  Version: {} (protocol {})",
        status.version.name, status.version.protocol
    );
    eprintln!("  MOTD: {}", status.motd());
    if let Some(players) = &status.players {
        eprintln!("  Players: {}/{}", players.online, players.max);
    }
    if let Some(latency) = status.latency {
        eprintln!("  Latency: {latency:?}");
    }
    eprintln!("  Detected type: {}", status.mod_loader());
    if let Some(players) = status.players.as_ref().filter(|p| !p.sample.is_empty()) {
        eprintln!("  Sample players:");
        for player in &players.sample {
            eprintln!("    - {} ({})", player.name, player.id);
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
