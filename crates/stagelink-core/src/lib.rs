//! StageLink Core
//!
//! Wire-level primitives for the three show-control protocols StageLink
//! speaks. Everything in this crate is pure: byte buffers in, structured
//! records out (and back). No sockets, no clocks.
//!
//! This crate provides:
//! - Art-Net ArtDmx encoding/decoding ([`artnet`])
//! - sACN / E1.31 data, sync and discovery packets ([`sacn`])
//! - PosiStageNet data and info packets over a generic chunk walker ([`psn`])
//! - Bounds-checked byte reading ([`cursor`])
//! - DMX channel frames ([`ChannelFrame`]) and per-protocol sequence counters
//!   ([`SequenceCounter`])

pub mod artnet;
pub mod cursor;
pub mod dmx;
pub mod error;
pub mod psn;
pub mod sacn;
pub mod sequence;

pub use dmx::{clamp_channels, ChannelFrame, Protocol};
pub use error::{DecodeError, EncodeError, Result};
pub use sequence::{SequenceCounter, WrapRule};

/// Number of channels in one DMX512 universe
pub const DMX_CHANNELS: usize = 512;

/// Default Art-Net UDP port
pub const ARTNET_PORT: u16 = 6454;

/// Default sACN (ACN SDT multicast) UDP port
pub const SACN_PORT: u16 = 5568;

/// Default PosiStageNet UDP port
pub const PSN_PORT: u16 = 56565;

/// Default PosiStageNet multicast group
pub const PSN_MULTICAST_GROUP: std::net::Ipv4Addr = std::net::Ipv4Addr::new(236, 10, 10, 10);
