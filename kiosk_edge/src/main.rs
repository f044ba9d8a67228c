use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kiosk_common::Money;
use kiosk_edge::{app, config::EdgeConfig, decoder::CashKind, dispatcher::DispatchOutcome};
use log::*;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(version, about = "Bridges the kiosk's cash acceptor and receipt printer to the kiosk cloud")]
pub struct Arguments {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the cash reader and the print poller until interrupted. This is the default.
    Run,
    /// Check that the acceptor answers PING.
    Probe {
        /// Seconds to wait for PONG, including the time the acceptor takes to reset
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
    },
    /// Ask the acceptor for a synthetic insertion and report it to the cloud.
    Simulate {
        #[arg(value_enum)]
        kind: CashArg,
        /// The amount, e.g. 100 or 12.50
        amount: Money,
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CashArg {
    Bill,
    Coin,
}

impl From<CashArg> for CashKind {
    fn from(value: CashArg) -> Self {
        match value {
            CashArg::Bill => CashKind::Bill,
            CashArg::Coin => CashKind::Coin,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let config = EdgeConfig::from_env_or_default()?;
    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let token = CancellationToken::new();
            let shutdown = token.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("🚀️ Ctrl-C received. Shutting down"),
                    Err(e) => error!("🚀️ Could not listen for Ctrl-C. {e}"),
                }
                shutdown.cancel();
            });
            app::run_edge(config, token).await.context("The kiosk edge could not start")?;
        },
        Command::Probe { timeout } => {
            app::probe(&config, Duration::from_secs(timeout))
                .await
                .with_context(|| format!("The acceptor on {} did not answer", config.serial_port))?;
            println!("✅️ The acceptor on {} answered PING", config.serial_port);
        },
        Command::Simulate { kind, amount, timeout } => {
            let outcome = app::simulate(&config, kind.into(), amount, Duration::from_secs(timeout))
                .await
                .context("The simulated insertion failed")?;
            match outcome {
                DispatchOutcome::Delivered { order_id, response } => println!(
                    "✅️ Order {order_id}: {} of {} inserted ({}{})",
                    response.amount_inserted,
                    response.total_required,
                    response.status,
                    if response.applied { "" } else { ", not counted" }
                ),
                DispatchOutcome::Unattributed => println!("⚠️ No session was waiting for cash"),
                DispatchOutcome::SessionFinished { order_id } => {
                    println!("⚠️ Order {order_id} no longer accepts cash")
                },
                DispatchOutcome::Lost { order_id, error } => {
                    anyhow::bail!("Could not report the cash for order {order_id}. {error}")
                },
            }
        },
    }
    Ok(())
}
