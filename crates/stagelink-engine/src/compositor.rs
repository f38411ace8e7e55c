//! Assembly of stores into flat arrays, and the reverse for outputs
//!
//! ```text
//! input:   store[start] ++ store[start+1] ++ ... ++ store[start+count-1]
//!          (512 bytes each, zeros where an id is absent)
//!
//! output:  [c0 ... c511 | c512 ... c1023 | c1024 ...]
//!              start        start + 1       start + 2
//! ```

use stagelink_core::psn::TrackerPose;
use stagelink_core::{Protocol, DMX_CHANNELS};

use crate::store::{TrackerStore, UniverseStore};

/// Concatenate universes `start..start + count` in ascending order
pub fn compose_universes(store: &UniverseStore, start: u32, count: u32) -> Vec<u8> {
    let mut out = vec![0u8; count as usize * DMX_CHANNELS];
    for (slot, id) in (start..start.saturating_add(count)).enumerate() {
        let Ok(id) = u16::try_from(id) else {
            break;
        };
        if let Some(frame) = store.get(id) {
            let offset = slot * DMX_CHANNELS;
            out[offset..offset + DMX_CHANNELS].copy_from_slice(frame.as_bytes());
        }
    }
    out
}

/// Present trackers with ids in `start..start + count`, ascending
pub fn compose_trackers(store: &TrackerStore, start: u32, count: u32) -> Vec<(u16, TrackerPose)> {
    let end = start.saturating_add(count);
    store
        .ids()
        .into_iter()
        .filter(|&id| (start..end).contains(&(id as u32)))
        .filter_map(|id| store.get(id).map(|pose| (id, pose)))
        .collect()
}

/// Slice channels into universe-sized pieces addressed from `start`.
///
/// Pieces whose universe falls outside the protocol's id range are dropped.
pub fn split_channels(channels: &[u8], start: u32, protocol: Protocol) -> Vec<(u16, &[u8])> {
    let range = protocol.id_range();
    channels
        .chunks(DMX_CHANNELS)
        .enumerate()
        .filter_map(|(i, chunk)| {
            let universe = start.checked_add(i as u32)?;
            if range.contains(&universe) {
                Some((universe as u16, chunk))
            } else {
                None
            }
        })
        .collect()
}

/// Address trackers to consecutive ids from `start`
pub fn assign_trackers(poses: &[TrackerPose], start: u32) -> Vec<(u16, TrackerPose)> {
    poses
        .iter()
        .enumerate()
        .filter_map(|(i, pose)| {
            let id = u16::try_from(start.checked_add(i as u32)?).ok()?;
            Some((id, *pose))
        })
        .collect()
}
