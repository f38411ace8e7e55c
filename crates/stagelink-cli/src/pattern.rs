//! Test signals

use glam::Vec3;
use stagelink_core::psn::TrackerPose;
use std::f32::consts::TAU;

/// A ramp that walks along the channels one step per frame
pub fn dmx_chase(channels: usize, step: u64) -> Vec<i32> {
    (0..channels)
        .map(|i| ((i as u64 + step) * 4 % 256) as i32)
        .collect()
}

/// `count` trackers evenly spaced on a circle of `radius` metres at head height,
/// facing the direction of travel
pub fn orbit(count: usize, radius: f32, seconds: f32) -> Vec<TrackerPose> {
    (0..count)
        .map(|i| {
            let angle = seconds * 0.5 + i as f32 * TAU / count as f32;
            let position = Vec3::new(radius * angle.cos(), 1.7, radius * angle.sin());
            TrackerPose::new(position, Vec3::new(0.0, -angle.rem_euclid(TAU), 0.0))
        })
        .collect()
}
