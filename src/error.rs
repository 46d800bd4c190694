//! Error types for communicator operations.
//!
//! Two layers: [`TransportError`] is what a transport reports about bytes on
//! the wire, and [`Error`] is what the public operation layer raises. A
//! transport failure during an otherwise valid call always surfaces as
//! [`Error::Communication`], carrying a description of the operation that
//! was in progress.

use thiserror::Error;

/// Result type for communicator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a message-passing transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The underlying socket or channel failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The peer's end of the transport has gone away.
    #[error("peer {0} is disconnected")]
    Disconnected(usize),

    /// A message addressed a process outside the transport's group.
    #[error("unknown peer {0}")]
    UnknownPeer(usize),

    /// An incoming message is longer than the fixed receive buffer.
    #[error("message of {count} values does not fit a buffer of {capacity}")]
    Truncated { capacity: usize, count: usize },

    /// A member gave up on a collective after rejecting its own arguments.
    #[error("process {0} abandoned the collective operation")]
    Abandoned(usize),

    /// Peers contributed different numbers of values to a collective.
    #[error("peer contributed {actual} values where {expected} were expected")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Errors raised by the public communicator operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The communicator cannot be used for the requested operation: it is
    /// the null communicator, it is too small for point-to-point traffic, or
    /// its backend is not recognized.
    #[error("invalid communicator: {0}")]
    InvalidCommunicator(String),

    /// The transport failed while carrying out a valid operation.
    #[error("{context}: {source}")]
    Communication {
        context: String,
        #[source]
        source: TransportError,
    },

    /// A fixed-size output view does not have the length the operation
    /// must write.
    #[error("invalid buffer: expected {expected} values, found room for {actual}")]
    InvalidBuffer { expected: usize, actual: usize },

    /// The process-wide session was used out of order.
    #[error("session error: {0}")]
    Session(String),
}

impl Error {
    pub(crate) fn invalid_communicator(message: impl Into<String>) -> Self {
        Error::InvalidCommunicator(message.into())
    }

    /// Returns `true` if this is a usage error raised before any transport
    /// call was made.
    pub fn is_invalid_communicator(&self) -> bool {
        matches!(self, Error::InvalidCommunicator(_))
    }

    /// Returns `true` if the transport reported a failure.
    pub fn is_communication_error(&self) -> bool {
        matches!(self, Error::Communication { .. })
    }
}

/// Attaches operation context to a transport failure, turning it into an
/// [`Error::Communication`].
pub(crate) trait WithContext<T> {
    fn context<F, S>(self, describe: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> WithContext<T> for std::result::Result<T, TransportError> {
    fn context<F, S>(self, describe: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Communication {
            context: describe().into(),
            source,
        })
    }
}
