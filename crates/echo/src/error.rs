//! Errors returned by replay sessions and the archive codec.

use thiserror::Error;
use tonic::Status;

use crate::context::Cancelled;
use crate::storage::StorageError;

/// Errors that end a replay call or an archive operation.
#[derive(Debug, Error)]
pub enum EchoError {
    /// Nothing is recorded at index 0 for the requested operation.
    ///
    /// Tests use this to simulate a provisioner that returned nothing.
    #[error("no state: {path}")]
    NoState {
        /// The last path probed for index 0.
        path: String,
    },
    /// Storage failed while probing or reading an entry
    #[error("read file {path:?}: {source}")]
    Storage {
        /// Path of the entry being accessed
        path: String,
        /// Underlying storage failure
        #[source]
        source: StorageError,
    },
    /// A stored entry is not a valid encoded response
    #[error("unmarshal {path:?}: {source}")]
    Decode {
        /// Path of the malformed entry
        path: String,
        /// Underlying decode failure
        #[source]
        source: prost::DecodeError,
    },
    /// Receiving from or sending on the stream failed
    #[error("transport: {0}")]
    Transport(#[from] Status),
    /// The client closed its side before sending a first request
    #[error("stream closed before first request")]
    EndOfStream,
    /// The stream's context ended
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    /// Writing or reading the archive container failed
    #[error("archive: {0}")]
    Archive(#[from] std::io::Error),
    /// An archive entry does not describe a valid recorded response
    #[error("invalid archive entry {name:?}: {reason}")]
    InvalidEntry {
        /// Entry name as stored in the archive
        name: String,
        /// What is wrong with it
        reason: String,
    },
}

impl EchoError {
    /// Whether this error is the "nothing recorded" configuration failure.
    pub fn is_no_state(&self) -> bool {
        matches!(self, Self::NoState { .. })
    }
}

impl From<EchoError> for Status {
    fn from(err: EchoError) -> Self {
        match err {
            EchoError::Transport(status) => status,
            EchoError::NoState { .. } => Status::failed_precondition(err.to_string()),
            EchoError::EndOfStream => Status::invalid_argument(err.to_string()),
            EchoError::Cancelled(Cancelled::Canceled) => Status::cancelled(err.to_string()),
            EchoError::Cancelled(Cancelled::DeadlineExceeded) => {
                Status::deadline_exceeded(err.to_string())
            }
            EchoError::Storage { .. }
            | EchoError::Decode { .. }
            | EchoError::Archive(_)
            | EchoError::InvalidEntry { .. } => Status::internal(err.to_string()),
        }
    }
}
