//! Engine error types

use stagelink_core::Protocol;
use stagelink_transport::TransportError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("send failed to {target}: {source}")]
    Send {
        target: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Operator configuration rejected before use
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid address '{value}' for {field}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must not be 0")]
    ZeroPort(&'static str),

    #[error("{protocol} id range {start}+{count} is outside {min}..={max}")]
    IdRange {
        protocol: Protocol,
        start: u32,
        count: u32,
        min: u32,
        max: u32,
    },

    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("{field} must be at most {max}, got {value}")]
    TooLarge { field: &'static str, value: f64, max: f64 },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("failed to read config: {0}")]
    Read(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
