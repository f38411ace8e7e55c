//! StageLink CLI - monitor and generate Art-Net, sACN and PosiStageNet traffic

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use stagelink_core::{ARTNET_PORT, PSN_MULTICAST_GROUP, PSN_PORT, SACN_PORT};
use stagelink_engine::EngineConfig;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod monitor;
mod pattern;
mod run;
mod send;

/// StageLink - Art-Net, sACN and PosiStageNet I/O
#[derive(Parser)]
#[command(name = "stagelink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info", env = "STAGELINK_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print incoming data whenever it changes
    Monitor {
        #[command(subcommand)]
        protocol: monitor::MonitorCommand,
    },

    /// Transmit a moving test signal
    Send {
        #[command(subcommand)]
        protocol: send::SendCommand,
    },

    /// Start every operator configured in a TOML file
    Run {
        /// Configuration file path
        #[arg(short, long, default_value = "stagelink.toml", env = "STAGELINK_CONFIG")]
        config: PathBuf,
    },

    /// Show version, protocol defaults and a sample configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    // Handle Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(()).await;
        }
    });

    match cli.command {
        Commands::Monitor { protocol } => {
            monitor::run(protocol, &mut shutdown_rx).await?;
        }

        Commands::Send { protocol } => {
            send::run(protocol, &mut shutdown_rx).await?;
        }

        Commands::Run { config } => {
            let engine = EngineConfig::load(&config)
                .with_context(|| format!("Failed to load {}", config.display()))?;
            println!(
                "{} Running operators from {}",
                "StageLink".cyan().bold(),
                config.display().to_string().yellow()
            );
            run::run(engine, &mut shutdown_rx).await?;
        }

        Commands::Info => {
            print_info()?;
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

fn print_info() -> Result<()> {
    println!("{} {}", "StageLink".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!();
    println!("{}", "Protocols:".bold());
    println!("  Art-Net   UDP {:<6} universes 0-32767, broadcast or unicast", ARTNET_PORT);
    println!("  sACN      UDP {:<6} universes 1-63999, multicast 239.255.hi.lo", SACN_PORT);
    println!("  PSN       UDP {:<6} trackers 0-65535, multicast {}", PSN_PORT, PSN_MULTICAST_GROUP);
    println!();
    println!("{}", "Sample configuration:".bold());

    let sample = EngineConfig {
        artnet_input: Some(Default::default()),
        sacn_input: Some(Default::default()),
        psn_input: Some(Default::default()),
        sacn_discovery: Some(Default::default()),
        artnet_output: Some(Default::default()),
        sacn_output: Some(Default::default()),
        psn_output: Some(Default::default()),
    };
    println!("{}", sample.to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send_sacn() {
        let cli = Cli::try_parse_from(["stagelink", "send", "sacn", "--sync", "7", "-n", "2"]).unwrap();
        match cli.command {
            Commands::Send {
                protocol: send::SendCommand::Sacn { target, count, sync, .. },
            } => {
                assert!(target.is_none());
                assert_eq!(count, 2);
                assert_eq!(sync, Some(7));
            }
            _ => panic!("expected send sacn"),
        }
    }

    #[test]
    fn test_send_counts_are_bounded() {
        assert!(Cli::try_parse_from(["stagelink", "send", "artnet", "-n", "0"]).is_err());
        assert!(Cli::try_parse_from(["stagelink", "send", "artnet", "-n", "513"]).is_err());
        assert!(Cli::try_parse_from(["stagelink", "send", "sacn", "-n", "4000000000"]).is_err());
        assert!(Cli::try_parse_from(["stagelink", "send", "psn", "-n", "5000"]).is_err());
        assert!(Cli::try_parse_from(["stagelink", "send", "artnet", "-n", "512"]).is_ok());
    }
}
