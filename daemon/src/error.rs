//! Control plane error taxonomy
//!
//! Setup errors (load, resolve, attach, publish) are fatal. Poll errors are
//! tolerated per slot until they persist. Detach errors are only logged.

use std::path::PathBuf;

use thiserror::Error;

/// Kind of named object looked up inside a loaded program image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Program,
    Table,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Program => f.write_str("program"),
            ObjectKind::Table => f.write_str("table"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to load program image {path:?}: {reason}")]
    ImageLoadFailed { path: PathBuf, reason: String },

    #[error("{kind} '{name}' not found in program image")]
    ObjectNotFound { kind: ObjectKind, name: String },

    #[error("failed to attach program to interface '{interface}': {reason}")]
    AttachFailed { interface: String, reason: String },

    #[error("failed to detach program '{program}': {reason}")]
    DetachFailed { program: String, reason: String },

    #[error("invalid IPv4 address: '{0}'")]
    InvalidAddress(String),

    #[error("invalid link address: '{0}'")]
    InvalidLinkAddress(String),

    #[error("backend list is empty")]
    EmptyBackendList,

    #[error("{count} backends exceed the table capacity of {capacity}")]
    CapacityExceeded { count: usize, capacity: u32 },

    #[error("failed to write table slot {slot}: {reason}")]
    TableWriteFailed { slot: u32, reason: String },

    #[error("failed to read table slot {slot}: {reason}")]
    TableReadFailed { slot: u32, reason: String },

    #[error("malformed destination record: expected {expected} bytes, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },

    #[error("failed to write status output: {0}")]
    Output(#[from] std::io::Error),
}

pub type Result<T, E = ControlError> = std::result::Result<T, E>;
