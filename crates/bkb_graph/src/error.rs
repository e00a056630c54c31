//! Error types for the BKB graph store.

use std::path::PathBuf;

use thiserror::Error;

use crate::node::{InodeId, SnodeId};

/// A specialized `Result` type for graph store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines the errors that can occur while building or loading a graph store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The graph is malformed: a support cycle, a contradictory tail set,
    /// an invalid weight, or an empty name.
    #[error("structural error: {0}")]
    Structural(String),

    /// An S-node or lookup referenced an I-node id that does not exist.
    #[error("unknown instantiation node: {0}")]
    UnknownInode(InodeId),

    /// A lookup referenced an S-node id that does not exist.
    #[error("unknown support node: {0}")]
    UnknownSnode(SnodeId),

    /// A fusion loader could not produce a store from its source.
    #[error("failed to load {}: {message}", source_path.display())]
    Load {
        /// The source the loader was asked to read.
        source_path: PathBuf,
        /// What went wrong.
        message: String,
    },
}

impl Error {
    /// Convenience constructor for `Error::Load`.
    pub fn load(source_path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Load {
            source_path: source_path.into(),
            message: message.into(),
        }
    }
}
