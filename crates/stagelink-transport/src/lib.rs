//! StageLink Transport Layer
//!
//! UDP plumbing shared by every protocol operator:
//! - socket construction with address reuse (`socket`)
//! - the background receive loop (`receive`)
//! - sACN multicast group membership (`multicast`)
//! - frame-rate pacing for senders (`pacer`)

pub mod error;
pub mod multicast;
pub mod pacer;
pub mod receive;
pub mod socket;

pub use error::{Result, TransportError};
pub use multicast::{universe_groups, MulticastMembership, MulticastSubscriptions, ReconcileReport};
pub use pacer::{TransmitPacer, MAX_PERIOD};
pub use receive::{DatagramHandler, LoopState, ReceiveConfig, ReceiveLoop};
pub use socket::{bind_udp, parse_ipv4, parse_local_ip, SocketOptions, ANY_ADDRESS};
