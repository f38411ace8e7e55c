//! `stagelink send`

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use stagelink_core::{DMX_CHANNELS, PSN_MULTICAST_GROUP};
use stagelink_engine::config::{ArtNetOutputConfig, PsnOutputConfig, SacnOutputConfig};
use stagelink_engine::{ArtNetOutput, Output, PsnOutput, SacnOutput, StatusSink, TracingStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::pattern::{dmx_chase, orbit};

/// Shortest gap between frames, which also bounds unpaced sending
const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

/// Most universes a test pattern spans
const MAX_UNIVERSES: i64 = 512;

/// Most test trackers
const MAX_TRACKERS: i64 = 1024;

#[derive(Subcommand)]
pub enum SendCommand {
    /// Art-Net test pattern
    Artnet {
        /// Local interface address, or "any"
        #[arg(short, long, default_value = "any")]
        bind: String,

        /// Node or broadcast address
        #[arg(short, long, default_value = "255.255.255.255")]
        target: String,

        #[arg(short, long, default_value_t = stagelink_core::ARTNET_PORT)]
        port: u16,

        #[arg(short, long, default_value_t = 0)]
        start: u32,

        /// Number of universes
        #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=MAX_UNIVERSES))]
        count: u32,

        /// Frames per second
        #[arg(short, long, default_value_t = 44.0)]
        fps: f64,
    },

    /// sACN test pattern
    Sacn {
        #[arg(short, long, default_value = "any")]
        bind: String,

        /// Unicast receiver; multicast when omitted
        #[arg(short, long)]
        target: Option<String>,

        #[arg(short, long, default_value_t = stagelink_core::SACN_PORT)]
        port: u16,

        #[arg(short, long, default_value_t = 1)]
        start: u32,

        #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=MAX_UNIVERSES))]
        count: u32,

        #[arg(short, long, default_value_t = 44.0)]
        fps: f64,

        #[arg(long, default_value = "StageLink")]
        name: String,

        /// 0-200
        #[arg(long, default_value_t = 100)]
        priority: u8,

        /// Send a sync packet on this universe after every frame
        #[arg(long)]
        sync: Option<u32>,
    },

    /// PSN trackers orbiting the origin
    Psn {
        #[arg(short, long, default_value = "any")]
        bind: String,

        #[arg(short, long, default_value_t = PSN_MULTICAST_GROUP.to_string())]
        target: String,

        #[arg(short, long, default_value_t = stagelink_core::PSN_PORT)]
        port: u16,

        /// Number of trackers
        #[arg(short = 'n', long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..=MAX_TRACKERS))]
        trackers: u16,

        /// Orbit radius in metres
        #[arg(short, long, default_value_t = 2.0)]
        radius: f32,

        #[arg(short, long, default_value_t = 60.0)]
        fps: f64,
    },
}

pub async fn run(command: SendCommand, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
    let status: Arc<dyn StatusSink> = Arc::new(TracingStatus);

    match command {
        SendCommand::Artnet {
            bind,
            target,
            port,
            start,
            count,
            fps,
        } => {
            let config = ArtNetOutputConfig {
                local_ip: bind,
                target_ip: target,
                port,
                start_universe: start,
                max_fps: fps,
                broadcast: true,
            };
            config.validate()?;
            println!(
                "{} Sending Art-Net to {} universes {}..{}",
                "StageLink".cyan().bold(),
                config.target()?.to_string().green(),
                start,
                start + count
            );
            let channels = count as usize * DMX_CHANNELS;
            transmit(ArtNetOutput::new(status), config, shutdown_rx, |step, _| dmx_chase(channels, step)).await;
        }

        SendCommand::Sacn {
            bind,
            target,
            port,
            start,
            count,
            fps,
            name,
            priority,
            sync,
        } => {
            let defaults = SacnOutputConfig::default();
            let config = SacnOutputConfig {
                local_ip: bind,
                multicast: target.is_none(),
                target_ip: target.unwrap_or(defaults.target_ip),
                port,
                start_universe: start,
                max_fps: fps,
                source_name: name,
                priority,
                sync_enabled: sync.is_some(),
                sync_universe: sync.unwrap_or(defaults.sync_universe),
                ..defaults
            };
            config.validate()?;
            let destination = if config.multicast {
                "multicast".to_string()
            } else {
                config.target_ip.clone()
            };
            println!(
                "{} Sending sACN ({}) universes {}..{}",
                "StageLink".cyan().bold(),
                destination.green(),
                start,
                start + count
            );
            let channels = count as usize * DMX_CHANNELS;
            transmit(SacnOutput::new(status), config, shutdown_rx, |step, _| dmx_chase(channels, step)).await;
        }

        SendCommand::Psn {
            bind,
            target,
            port,
            trackers,
            radius,
            fps,
        } => {
            let config = PsnOutputConfig {
                local_ip: bind,
                target_ip: target,
                port,
                max_fps: fps,
                ..Default::default()
            };
            config.validate()?;
            println!(
                "{} Sending {} PSN trackers to {}",
                "StageLink".cyan().bold(),
                trackers,
                config.target()?.to_string().green()
            );
            transmit(PsnOutput::new(status), config, shutdown_rx, |_, seconds| {
                orbit(usize::from(trackers), radius, seconds)
            })
            .await;
        }
    }

    println!("{}", "Sender stopped".yellow());
    Ok(())
}

/// Send frames from `frame(step, seconds)` until shutdown, then close the output.
///
/// Frames go out at most once per [`MIN_FRAME_INTERVAL`] so an unpaced output,
/// or one whose socket cannot open, does not spin.
async fn transmit<O, F, V>(mut output: O, config: O::Config, shutdown_rx: &mut mpsc::Receiver<()>, mut frame: F)
where
    O: Output,
    F: FnMut(u64, f32) -> V,
    V: AsRef<O::Frame>,
{
    let started = Instant::now();
    let mut ticker = tokio::time::interval(MIN_FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut step = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.recv() => break,
        }
        let next = frame(step, started.elapsed().as_secs_f32());
        tokio::select! {
            _ = output.send(&config, next.as_ref()) => {}
            _ = shutdown_rx.recv() => break,
        }
        step += 1;
    }

    output.close().await;
}
