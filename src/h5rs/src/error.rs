//! Structured error taxonomy. Every variant carries enough context for a
//! caller to act without re-parsing the file: the operation that failed, the
//! object path involved (if any), a detail string (offsets are rendered in
//! hex), and a list of recovery hints.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Hdf5Error>;

#[derive(Debug, Error)]
pub enum Hdf5Error {
    #[error("invalid signature during {operation}: {details}")]
    InvalidSignature {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("unsupported version during {operation}: {details}")]
    UnsupportedVersion {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("unsupported feature during {operation}: {details}")]
    UnsupportedFeature {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("unsupported datatype during {operation}: {details}")]
    UnsupportedDatatype {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("path not found: {path}")]
    PathNotFound {
        operation: &'static str,
        path: String,
        recovery_hints: Vec<String>,
    },

    #[error("dataset not found: {path}")]
    DatasetNotFound {
        operation: &'static str,
        path: String,
        recovery_hints: Vec<String>,
    },

    #[error("group not found: {path}")]
    GroupNotFound {
        operation: &'static str,
        path: String,
        recovery_hints: Vec<String>,
    },

    #[error("not a dataset: {path}")]
    NotADataset {
        operation: &'static str,
        path: String,
        recovery_hints: Vec<String>,
    },

    #[error("not a group: {path}")]
    NotAGroup {
        operation: &'static str,
        path: String,
        recovery_hints: Vec<String>,
    },

    #[error("circular link while resolving {path}: visited {}", .chain.join(" -> "))]
    CircularLink {
        operation: &'static str,
        path: String,
        chain: Vec<String>,
        recovery_hints: Vec<String>,
    },

    #[error("corrupted file during {operation}: {details}")]
    CorruptedFile {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("decompression error during {operation}: {details}")]
    DecompressionError {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("I/O error during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid chunk dimensions during {operation}: {details}")]
    InvalidChunkDimensions {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("invalid dataset name {name:?}: {details}")]
    InvalidDatasetName {
        operation: &'static str,
        name: String,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("group path conflict at {path}: {details}")]
    GroupPathConflict {
        operation: &'static str,
        path: String,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("data validation error during {operation}: {details}")]
    DataValidationError {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("attribute validation error during {operation}: {details}")]
    AttributeValidationError {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("insufficient space during {operation}: {details}")]
    InsufficientSpace {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },

    #[error("write interrupted during {operation}: {details}")]
    WriteInterrupted {
        operation: &'static str,
        details: String,
        recovery_hints: Vec<String>,
    },
}

impl Hdf5Error {
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Hdf5Error::Io { operation, source }
    }

    pub fn corrupted(operation: &'static str, details: impl Into<String>) -> Self {
        Hdf5Error::CorruptedFile {
            operation,
            details: details.into(),
            recovery_hints: vec!["the file may be truncated or written by an incompatible tool".into()],
        }
    }

    pub fn invalid_signature(operation: &'static str, offset: u64, expected: &str, found: &[u8]) -> Self {
        Hdf5Error::InvalidSignature {
            operation,
            details: format!("at offset 0x{offset:x}: expected {expected}, found {found:02x?}"),
            recovery_hints: vec!["confirm the file is HDF5 and not truncated".into()],
        }
    }

    pub fn unsupported_version(operation: &'static str, version: u32) -> Self {
        Hdf5Error::UnsupportedVersion {
            operation,
            details: format!("version {version} is not implemented"),
            recovery_hints: vec!["open the file with a tool supporting this version".into()],
        }
    }
}
