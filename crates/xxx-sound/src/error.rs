//! Error types for container splitting, bank parsing and patching.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("Invalid config: {0}")]
    Config(#[source] serde_json::Error),

    #[error("Manifest serialization failed: {0}")]
    Manifest(#[source] serde_json::Error),
}

/// Structural problems with the bytes themselves. Recoverable by abandoning
/// the current bank or container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid {what} magic: got {found:02X?}")]
    BadMagic { what: &'static str, found: [u8; 4] },

    #[error("Truncated {what}: needs {needed} bytes, only {available} available")]
    Truncated {
        what: &'static str,
        needed: u64,
        available: u64,
    },

    #[error("Sample count {count} outside sane range 1..={max}")]
    SampleCount { count: u32, max: u32 },

    #[error("{0} banks are recognised but not supported")]
    Unsupported(&'static str),
}

/// A computed range that falls outside the source it addresses.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Range 0x{offset:X}+{len} exceeds source length {source_len}")]
pub struct BoundsError {
    pub offset: u64,
    pub len: u64,
    pub source_len: u64,
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("New data for {name} is too large: {payload} bytes, slot holds {slot}")]
    TooLarge {
        name: String,
        payload: u64,
        slot: u64,
    },

    #[error("Sample {0} not found")]
    SampleNotFound(String),

    #[error("Bank index {index} out of range ({count} banks located)")]
    BankNotFound { index: usize, count: usize },

    #[error("Bank at 0x{0:X} could not be parsed")]
    UnparsedBank(u64),

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for PatchError {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => PatchError::Io(e),
            Error::Bounds(b) => PatchError::Bounds(b),
            Error::Patch(p) => p,
            other => PatchError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                other.to_string(),
            )),
        }
    }
}
