//! StageLink Engine
//!
//! Input and output operators for Art-Net, sACN/E1.31 and PosiStageNet:
//! - Inputs receive in the background and compose the latest data on pull
//! - Outputs split, encode and pace outgoing frames
//! - sACN discovery keeps a directory of announcing sources

pub mod compositor;
pub mod config;
pub mod dirty;
pub mod error;
pub mod input;
pub mod output;
pub mod reaper;
pub mod status;
pub mod store;
pub mod traits;

#[cfg(feature = "sacn")]
pub mod discovery;

pub use config::EngineConfig;
pub use dirty::{DirtySignal, DirtyWatch};
pub use error::{ConfigError, EngineError, Result};
pub use status::{Severity, StatusLog, StatusReporter, StatusSink, TracingStatus};
pub use store::{Store, TrackerStore, UniverseStore};
pub use traits::{Connectivity, Input, Output};

#[cfg(feature = "artnet")]
pub use input::artnet::ArtNetInput;
#[cfg(feature = "artnet")]
pub use output::artnet::ArtNetOutput;

#[cfg(feature = "sacn")]
pub use discovery::{SacnDiscovery, SourceDirectory, SourceInfo};
#[cfg(feature = "sacn")]
pub use input::sacn::SacnInput;
#[cfg(feature = "sacn")]
pub use output::sacn::SacnOutput;

#[cfg(feature = "psn")]
pub use input::psn::{PsnInput, TrackerNames};
#[cfg(feature = "psn")]
pub use output::psn::PsnOutput;
