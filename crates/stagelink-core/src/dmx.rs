//! DMX channel frames and protocol id ranges

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::DMX_CHANNELS;

/// One universe worth of channel values, always exactly 512 bytes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ChannelFrame([u8; DMX_CHANNELS]);

impl ChannelFrame {
    /// All channels at zero
    pub const fn zeroed() -> Self {
        Self([0u8; DMX_CHANNELS])
    }

    /// Build a frame from up to 512 values; the rest are zero
    pub fn from_slice(data: &[u8]) -> Self {
        let mut frame = Self::zeroed();
        frame.fill_from(data);
        frame
    }

    /// Overwrite the frame with `data`, zero-filling channels past its end.
    ///
    /// Values beyond channel 512 are ignored.
    pub fn fill_from(&mut self, data: &[u8]) {
        let n = data.len().min(DMX_CHANNELS);
        self.0[..n].copy_from_slice(&data[..n]);
        self.0[n..].fill(0);
    }

    pub fn as_bytes(&self) -> &[u8; DMX_CHANNELS] {
        &self.0
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8; DMX_CHANNELS] {
        &mut self.0
    }

    /// Channel value by 1-based DMX address
    pub fn channel(&self, address: u16) -> Option<u8> {
        match address {
            1..=512 => Some(self.0[(address - 1) as usize]),
            _ => None,
        }
    }
}

impl Default for ChannelFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl std::fmt::Debug for ChannelFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Trailing zeros are noise in logs
        let used = self.0.iter().rposition(|&v| v != 0).map_or(0, |i| i + 1);
        f.debug_struct("ChannelFrame")
            .field("channels", &&self.0[..used])
            .finish()
    }
}

impl AsRef<[u8]> for ChannelFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Clamp arbitrary integer channel values into the DMX byte range
pub fn clamp_channels(values: &[i32]) -> Vec<u8> {
    values.iter().map(|&v| v.clamp(0, 255) as u8).collect()
}

/// The protocols the engine speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    ArtNet,
    Sacn,
    Psn,
}

impl Protocol {
    /// Valid universe / tracker ids for this protocol
    pub fn id_range(self) -> RangeInclusive<u32> {
        match self {
            // 15-bit Port-Address
            Protocol::ArtNet => 0..=32767,
            Protocol::Sacn => 1..=63999,
            Protocol::Psn => 0..=65535,
        }
    }

    /// Check that `[start, start + count)` lies inside [`Protocol::id_range`]
    pub fn contains_range(self, start: u32, count: u32) -> bool {
        let range = self.id_range();
        if count == 0 {
            return range.contains(&start);
        }
        let last = match start.checked_add(count - 1) {
            Some(last) => last,
            None => return false,
        };
        range.contains(&start) && range.contains(&last)
    }

    pub fn default_port(self) -> u16 {
        match self {
            Protocol::ArtNet => crate::ARTNET_PORT,
            Protocol::Sacn => crate::SACN_PORT,
            Protocol::Psn => crate::PSN_PORT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::ArtNet => "Art-Net",
            Protocol::Sacn => "sACN",
            Protocol::Psn => "PSN",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
