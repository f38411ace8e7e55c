//! Error types for StageLink codecs

use thiserror::Error;

/// Result type alias for decode operations
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Reasons a datagram is rejected by a decoder.
///
/// Receive loops treat every variant the same way (drop and continue); the
/// detail only shows up in debug logs and tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ended before a field could be read
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Packet identifier / magic string mismatch
    #[error("invalid packet identifier")]
    InvalidSignature,

    /// Art-Net opcode other than the one being decoded
    #[error("unsupported opcode: 0x{0:04x}")]
    UnsupportedOpcode(u16),

    /// Layer vector not recognised
    #[error("unsupported vector: 0x{0:08x}")]
    UnsupportedVector(u32),

    /// A length field points past the end of the buffer or exceeds the protocol limit
    #[error("length {declared} exceeds available {available}")]
    LengthOverflow { declared: usize, available: usize },

    /// Field value that the protocol forbids
    #[error("invalid {0}")]
    InvalidField(&'static str),

    /// PSN chunk with an id that does not belong at this level
    #[error("unexpected chunk id: 0x{0:04x}")]
    UnexpectedChunk(u16),
}

/// Errors raised while building outbound packets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// More channels than fit in one packet
    #[error("payload too large: {0} channels (max 512)")]
    PayloadTooLarge(usize),

    /// Chunk payload does not fit the 15-bit length field
    #[error("chunk too large: {0} bytes (max 32767)")]
    ChunkTooLarge(usize),

    /// Universe outside the protocol's valid range
    #[error("universe {0} out of range")]
    UniverseOutOfRange(u16),
}
