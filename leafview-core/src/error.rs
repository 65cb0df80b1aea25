use thiserror::Error;

use crate::barrier::BatchId;

/// Failures surfaced by the coordinator and its window controllers.
///
/// Losing an ownership claim is deliberately absent: the losing window gets
/// `false` or `None` and does nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("window handle did not become available in time")]
    HandleAcquisitionTimedOut,
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("open cancelled by user")]
    LoadCancelledByUser,
    #[error("a session restore is already in progress")]
    BatchAlreadyInProgress,
    #[error("restore batch {0} is not in progress")]
    UnknownBatch(BatchId),
    #[error("a restore batch needs at least one window")]
    EmptyBatch,
    #[error("restore slot {0} was abandoned")]
    SlotAbandoned(usize),
    #[error("window was closed before the file could be opened")]
    WindowClosed,
    #[error("failed to open file: {0}")]
    Load(String),
}

/// Errors reported by an [`ImageSource`](crate::host::ImageSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("file does not exist")]
    NotFound,
    #[error("archive is password protected")]
    PasswordRequired,
    #[error("wrong password")]
    WrongPassword,
    #[error("unsupported file type")]
    Unsupported,
    #[error("I/O error: {0}")]
    Io(String),
}
