//! Error types for REL parsing and patching.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelError {
    /// The backing file could not be opened for read-write access.
    #[error("Unable to open {path:?}: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A structural read ran past the end of the store.
    #[error("Read of {len} bytes at offset {offset:#x} runs past the end of the store")]
    TruncatedStore { offset: u64, len: usize },

    #[error("Unsupported module version {version} (expected 1, 2 or 3)")]
    MalformedHeader { version: u32 },

    #[error("Section {0} does not exist or has no data in the file")]
    InvalidSectionId(u32),

    #[error("Offset {offset:#x} is outside of section {section}")]
    InvalidOffset { section: u32, offset: u32 },

    #[error("Value {value:#x} does not fit in {width} bits")]
    ValueOutOfRange { value: u32, width: u32 },

    /// A relocation names a section that cannot be resolved to file bytes.
    #[error("Relocation into section {dest_section} against section {symbol_section} cannot be resolved")]
    UnresolvableSymbol { dest_section: u32, symbol_section: u32 },

    #[error("Output file {0:?} already exists")]
    OutputExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelError>;
