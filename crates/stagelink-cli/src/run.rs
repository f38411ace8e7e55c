//! `stagelink run`
//!
//! Starts every operator in the configuration as its own task. DMX inputs
//! feed the DMX outputs (Art-Net first if both are configured) and the PSN
//! input feeds the PSN output, so a config with one input and one output of
//! different protocols acts as a converter. Outputs without a matching input
//! send the test pattern.

use anyhow::{bail, Result};
use colored::Colorize;
use parking_lot::Mutex;
use stagelink_core::psn::TrackerPose;
use stagelink_core::DMX_CHANNELS;
use stagelink_engine::{
    ArtNetInput, ArtNetOutput, DirtyWatch, EngineConfig, Input, Output, PsnInput, PsnOutput, SacnDiscovery,
    SacnInput, SacnOutput, StatusSink, TracingStatus,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::pattern::{dmx_chase, orbit};

/// How often inputs are pulled
const TICK: Duration = Duration::from_millis(10);

/// Latest frame published by an input, if any input feeds this kind of data
type Latest<T> = Option<Arc<Mutex<Vec<T>>>>;

pub async fn run(config: EngineConfig, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
    if config.is_empty() {
        bail!("No operators configured");
    }

    let status: Arc<dyn StatusSink> = Arc::new(TracingStatus);
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let dmx: Latest<i32> = (config.artnet_input.is_some() || config.sacn_input.is_some())
        .then(|| Arc::new(Mutex::new(Vec::new())));
    let poses: Latest<TrackerPose> = config
        .psn_input
        .is_some()
        .then(|| Arc::new(Mutex::new(Vec::new())));

    // Inputs
    if let Some(c) = config.artnet_input.clone() {
        let sink = dmx.clone();
        tasks.push(spawn_input("artnet-in", ArtNetInput::new(status.clone()), c, stop_rx.clone(), move |frame| {
            publish_dmx(&sink, &frame)
        }));
    }
    if let Some(c) = config.sacn_input.clone() {
        // Art-Net wins when both DMX inputs are configured
        let sink = if config.artnet_input.is_some() { None } else { dmx.clone() };
        tasks.push(spawn_input("sacn-in", SacnInput::new(status.clone()), c, stop_rx.clone(), move |frame| {
            publish_dmx(&sink, &frame)
        }));
    }
    if let Some(c) = config.psn_input.clone() {
        let sink = poses.clone();
        tasks.push(spawn_input("psn-in", PsnInput::new(status.clone()), c, stop_rx.clone(), move |trackers| {
            if let Some(sink) = &sink {
                *sink.lock() = trackers.into_iter().map(|(_, pose)| pose).collect();
            }
        }));
    }
    if let Some(c) = config.sacn_discovery.clone() {
        tasks.push(spawn_input("sacn-discovery", SacnDiscovery::new(status.clone()), c, stop_rx.clone(), |sources| {
            for source in sources {
                info!("sACN source {} at {} universes {:?}", source.name, source.address, source.universes);
            }
        }));
    }

    // Outputs
    if let Some(c) = config.artnet_output.clone() {
        let source = dmx.clone();
        tasks.push(spawn_output(ArtNetOutput::new(status.clone()), c, stop_rx.clone(), move |step, _| {
            dmx_frame(&source, step)
        }));
    }
    if let Some(c) = config.sacn_output.clone() {
        let source = dmx.clone();
        tasks.push(spawn_output(SacnOutput::new(status.clone()), c, stop_rx.clone(), move |step, _| {
            dmx_frame(&source, step)
        }));
    }
    if let Some(c) = config.psn_output.clone() {
        let source = poses.clone();
        tasks.push(spawn_output(PsnOutput::new(status.clone()), c, stop_rx.clone(), move |_, seconds| {
            match &source {
                Some(latest) => latest.lock().clone(),
                None => orbit(2, 2.0, seconds),
            }
        }));
    }

    println!(
        "{} {} operator(s) running (Ctrl+C to stop)",
        "OK".green().bold(),
        tasks.len()
    );

    shutdown_rx.recv().await;
    let _ = stop_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    println!("{}", "All operators stopped".yellow());
    Ok(())
}

fn publish_dmx(sink: &Latest<i32>, frame: &[u8]) {
    if let Some(sink) = sink {
        *sink.lock() = frame.iter().map(|&v| v as i32).collect();
    }
}

fn dmx_frame(source: &Latest<i32>, step: u64) -> Vec<i32> {
    match source {
        Some(latest) => latest.lock().clone(),
        None => dmx_chase(DMX_CHANNELS, step),
    }
}

/// Pull `input` every tick until stopped, passing changed results to `publish`
fn spawn_input<I, F>(
    name: &'static str,
    mut input: I,
    config: I::Config,
    mut stop: watch::Receiver<bool>,
    mut publish: F,
) -> JoinHandle<()>
where
    I: Input + 'static,
    I::Config: 'static,
    F: FnMut(I::Output) + Send + 'static,
{
    tokio::spawn(async move {
        let mut changes = DirtyWatch::new(input.dirty().clone());
        let mut ticker = tokio::time::interval(TICK);
        info!("{} started", name);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let output = input.pull(&config).await;
                    if changes.take() {
                        debug!("{} changed", name);
                        publish(output);
                    }
                }
                _ = stop.changed() => break,
            }
        }

        input.stop().await;
        info!("{} stopped", name);
    })
}

/// Send frames from `frame` until stopped, then close the output.
///
/// Sends at most once per tick, which bounds unpaced outputs and outputs
/// whose source has nothing to send yet.
fn spawn_output<O, F, V>(
    mut output: O,
    config: O::Config,
    mut stop: watch::Receiver<bool>,
    mut frame: F,
) -> JoinHandle<()>
where
    O: Output + 'static,
    O::Config: 'static,
    F: FnMut(u64, f32) -> V + Send + 'static,
    V: AsRef<O::Frame> + Send + Sync,
{
    tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut step = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }
            let next = frame(step, started.elapsed().as_secs_f32());
            tokio::select! {
                _ = output.send(&config, next.as_ref()) => {}
                _ = stop.changed() => break,
            }
            step += 1;
        }

        output.close().await;
    })
}
