//! Crate-wide error taxonomy for the playback engine.

use thiserror::Error;

/// Errors surfaced by the public playlist/sink API.
///
/// Errors that occur *inside* the decoder loop are logged and absorbed rather
/// than propagated (see [`crate::decoder`]); this enum is what the loop logs
/// internally and what the public API returns when a mutation cannot be
/// carried out.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("allocation failed while constructing {0}")]
    OutOfMemory(&'static str),

    #[error("failed to decode packet: {0}")]
    DecodeError(#[from] pmoflac::FlacError),

    #[error("filter graph error: {0}")]
    FilterGraphError(String),

    #[error("read error on decoded stream: {0}")]
    ReadError(String),

    #[error("seek error: {0}")]
    SeekError(String),

    #[error("playlist item not found")]
    ItemNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
