//! `stagelink monitor`

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use stagelink_core::psn::TrackerPose;
use stagelink_core::{DMX_CHANNELS, PSN_MULTICAST_GROUP};
use stagelink_engine::config::{ArtNetInputConfig, PsnInputConfig, SacnDiscoveryConfig, SacnInputConfig};
use stagelink_engine::{
    ArtNetInput, DirtyWatch, Input, PsnInput, SacnDiscovery, SacnInput, SourceInfo, StatusSink, TracingStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How often the monitor pulls
const TICK: Duration = Duration::from_millis(25);

#[derive(Subcommand)]
pub enum MonitorCommand {
    /// Art-Net universes
    Artnet {
        /// Local interface address, or "any"
        #[arg(short, long, default_value = "any")]
        bind: String,

        #[arg(short, long, default_value_t = stagelink_core::ARTNET_PORT)]
        port: u16,

        /// First universe
        #[arg(short, long, default_value_t = 0)]
        start: u32,

        /// Number of universes
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Channels printed per universe
        #[arg(long, default_value_t = 16)]
        channels: usize,

        /// Seconds before a silent universe is dropped (0 keeps it)
        #[arg(short, long, default_value_t = 2.5)]
        timeout: f64,
    },

    /// sACN universes
    Sacn {
        #[arg(short, long, default_value = "any")]
        bind: String,

        #[arg(short, long, default_value_t = stagelink_core::SACN_PORT)]
        port: u16,

        #[arg(short, long, default_value_t = 1)]
        start: u32,

        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        #[arg(long, default_value_t = 16)]
        channels: usize,

        #[arg(short, long, default_value_t = 2.5)]
        timeout: f64,

        /// Only receive unicast traffic
        #[arg(long)]
        no_multicast: bool,
    },

    /// PosiStageNet trackers
    Psn {
        #[arg(short, long, default_value = "any")]
        bind: String,

        #[arg(short, long, default_value_t = stagelink_core::PSN_PORT)]
        port: u16,

        /// Multicast group to join; empty for unicast only
        #[arg(short, long, default_value_t = PSN_MULTICAST_GROUP.to_string())]
        group: String,

        #[arg(short, long, default_value_t = 2.5)]
        timeout: f64,
    },

    /// sACN sources announcing on the discovery universe
    Discovery {
        #[arg(short, long, default_value = "any")]
        bind: String,

        #[arg(short, long, default_value_t = stagelink_core::SACN_PORT)]
        port: u16,
    },
}

pub async fn run(command: MonitorCommand, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
    let status: Arc<dyn StatusSink> = Arc::new(TracingStatus);

    match command {
        MonitorCommand::Artnet {
            bind,
            port,
            start,
            count,
            channels,
            timeout,
        } => {
            let config = ArtNetInputConfig {
                local_ip: bind,
                port,
                start_universe: start,
                universe_count: count,
                timeout_secs: timeout,
            };
            config.validate()?;
            banner("Art-Net", port);
            let input = ArtNetInput::new(status);
            watch(input, config, shutdown_rx, |frame| print_universes("ArtNet", start, &frame, channels)).await;
        }

        MonitorCommand::Sacn {
            bind,
            port,
            start,
            count,
            channels,
            timeout,
            no_multicast,
        } => {
            let config = SacnInputConfig {
                local_ip: bind,
                port,
                start_universe: start,
                universe_count: count,
                timeout_secs: timeout,
                multicast: !no_multicast,
            };
            config.validate()?;
            banner("sACN", port);
            let input = SacnInput::new(status);
            watch(input, config, shutdown_rx, |frame| print_universes("sACN", start, &frame, channels)).await;
        }

        MonitorCommand::Psn {
            bind,
            port,
            group,
            timeout,
        } => {
            let config = PsnInputConfig {
                local_ip: bind,
                port,
                multicast_group: group,
                timeout_secs: timeout,
                ..Default::default()
            };
            config.validate()?;
            banner("PSN", port);
            let input = PsnInput::new(status);
            let names = input.names().clone();
            watch(input, config, shutdown_rx, |trackers| {
                print_trackers(&trackers, |id| names.get(id))
            })
            .await;
        }

        MonitorCommand::Discovery { bind, port } => {
            let config = SacnDiscoveryConfig {
                local_ip: bind,
                port,
                ..Default::default()
            };
            config.validate()?;
            banner("sACN discovery", port);
            let input = SacnDiscovery::new(status);
            watch(input, config, shutdown_rx, |sources| print_sources(&sources)).await;
        }
    }

    println!("{}", "Monitor stopped".yellow());
    Ok(())
}

fn banner(protocol: &str, port: u16) {
    println!(
        "{} Monitoring {} on port {} (Ctrl+C to stop)",
        "StageLink".cyan().bold(),
        protocol.green(),
        port
    );
}

/// Pull every tick and hand the result to `show` whenever it changed
async fn watch<I, F>(mut input: I, config: I::Config, shutdown_rx: &mut mpsc::Receiver<()>, mut show: F)
where
    I: Input,
    F: FnMut(I::Output),
{
    let mut changes = DirtyWatch::new(input.dirty().clone());
    let mut ticker = tokio::time::interval(TICK);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let output = input.pull(&config).await;
                if changes.take() {
                    show(output);
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    input.stop().await;
}

fn print_universes(label: &str, start: u32, frame: &[u8], channels: usize) {
    for (i, universe) in frame.chunks(DMX_CHANNELS).enumerate() {
        let shown = &universe[..channels.min(universe.len())];
        let values: Vec<String> = shown.iter().map(|v| format!("{:>3}", v)).collect();
        println!(
            "{} {:>5} {}",
            label.cyan(),
            start + i as u32,
            values.join(" ")
        );
    }
}

fn print_trackers(trackers: &[(u16, TrackerPose)], name: impl Fn(u16) -> Option<String>) {
    if trackers.is_empty() {
        println!("{} {}", "PSN".cyan(), "no trackers".dimmed());
    }
    for (id, pose) in trackers {
        let p = pose.position;
        let r = pose.axis_angle;
        println!(
            "{} {:>5} {:<16} pos ({:>7.3}, {:>7.3}, {:>7.3}) rot ({:>6.3}, {:>6.3}, {:>6.3})",
            "PSN".cyan(),
            id,
            name(*id).unwrap_or_default(),
            p.x,
            p.y,
            p.z,
            r.x,
            r.y,
            r.z
        );
    }
}

fn print_sources(sources: &[SourceInfo]) {
    if sources.is_empty() {
        println!("{} {}", "sACN".cyan(), "no sources".dimmed());
    }
    for source in sources {
        let universes: Vec<String> = source.universes.iter().map(u16::to_string).collect();
        println!(
            "{} {:<24} {:<21} universes {}",
            "sACN".cyan(),
            source.name.green(),
            source.address,
            universes.join(",")
        );
    }
}
