//! Request handles for non-blocking operations.

use super::status::Status;
use crate::error::{Result, TransportError, WithContext};

/// Backend-specific state behind a [`Request`].
pub(crate) trait RequestImpl {
    /// Block until the operation completes (or report its cancellation).
    fn wait(self: Box<Self>) -> std::result::Result<Status, TransportError>;

    /// Try to cancel the operation. Whether it worked is reported by the
    /// status that `wait` returns.
    fn cancel(&mut self) -> std::result::Result<(), TransportError>;
}

/// A handle to one in-flight non-blocking operation.
///
/// A request borrows whatever buffer the operation writes into, so the
/// buffer cannot be read until the request has been waited on or dropped.
/// Waiting consumes the request; a request can be cancelled first, and the
/// status that `wait` then returns tells whether the cancellation took.
///
/// Dropping a receive request without waiting abandons it: the matching
/// message, if one arrives, stays queued for a later receive.
pub struct Request<'a> {
    imp: Box<dyn RequestImpl + 'a>,
}

impl<'a> Request<'a> {
    pub(crate) fn new(imp: impl RequestImpl + 'a) -> Self {
        Self { imp: Box::new(imp) }
    }

    /// Block until the operation completes, returning its status.
    pub fn wait(self) -> Result<Status> {
        self.imp
            .wait()
            .context(|| "a request was not able to wait for the operation to complete")
    }

    /// Ask for the operation to be cancelled. This is best-effort: check
    /// [`Status::cancelled`] on the status returned by [`Request::wait`].
    pub fn cancel(&mut self) -> Result<()> {
        self.imp
            .cancel()
            .context(|| "a request was not able to cancel the operation")
    }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request").finish_non_exhaustive()
    }
}
