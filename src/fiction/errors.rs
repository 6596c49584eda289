use thiserror::Error;

use crate::fiction::types::Direction;

/// Which background operation a session is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOperation {
    Save,
    Load,
}

impl std::fmt::Display for IoOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoOperation::Save => write!(f, "save"),
            IoOperation::Load => write!(f, "load"),
        }
    }
}

/// Errors that can arise while persisting, restoring, or authoring a fiction graph.
#[derive(Debug, Error)]
pub enum FictionError {
    /// Wrapper around IO errors (save directory creation, slot files, locks).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around JSON snapshot encoding errors.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// A snapshot element is missing an attribute it cannot be decoded without.
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    /// A snapshot element is missing a required child node.
    #[error("<{element}> is missing required child <{child}>")]
    MissingNode {
        element: String,
        child: &'static str,
    },

    /// An attribute is present but cannot be parsed (bad coordinate, flag, direction).
    #[error("<{element}> attribute '{attribute}' has invalid value '{value}'")]
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },

    /// The decoder was pointed at the wrong kind of node.
    #[error("expected <{expected}>, found <{found}>")]
    UnexpectedElement {
        expected: &'static str,
        found: String,
    },

    /// Returned when a stored snapshot was written with an unsupported envelope version.
    #[error("snapshot schema mismatch: expected {expected}, got {found}")]
    SchemaMismatch { expected: u8, found: u8 },

    /// Stored payload no longer matches the checksum written alongside it.
    #[error("snapshot checksum mismatch in slot '{slot}'")]
    ChecksumMismatch { slot: String },

    /// Returned when reading a slot that is not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// Slot name failed validation.
    #[error("invalid slot name: {0}")]
    InvalidSlot(String),

    /// The opposing side of a door pair could not be located. Indicates an authoring bug.
    #[error("no opposing exit for door pair at room '{room}' facing {direction}")]
    DoorPair { room: String, direction: Direction },

    /// A save or load is already running.
    #[error("a {0} is already in progress")]
    Busy(IoOperation),

    /// Internal error (worker join errors, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

impl FictionError {
    /// True for errors caused by a malformed snapshot tree.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FictionError::MissingAttribute { .. }
                | FictionError::MissingNode { .. }
                | FictionError::InvalidAttribute { .. }
                | FictionError::UnexpectedElement { .. }
        )
    }
}
