//! Message status information.

use std::fmt;
use std::sync::Arc;

/// Backend-specific record behind a [`Status`].
pub(crate) trait StatusImpl: fmt::Debug + Send + Sync {
    fn cancelled(&self) -> bool;
    fn source(&self) -> i32;
    fn tag(&self) -> i32;
    fn count(&self) -> usize;
}

/// Information about a received, probed, or completed message.
///
/// A status either describes a message or carries no information at all;
/// the latter is what a non-blocking probe returns when nothing is waiting.
/// Statuses are created by communicator backends only and never change
/// afterwards, so copies are cheap and share one record.
#[derive(Debug, Clone, Default)]
pub struct Status {
    imp: Option<Arc<dyn StatusImpl>>,
}

impl Status {
    pub(crate) fn new(imp: impl StatusImpl + 'static) -> Self {
        Self {
            imp: Some(Arc::new(imp)),
        }
    }

    /// A status with no message details.
    pub(crate) fn empty() -> Self {
        Self { imp: None }
    }

    /// Returns `false` if this status carries no information.
    pub fn has_message_details(&self) -> bool {
        self.imp.is_some()
    }

    /// Returns `true` if the operation was cancelled before it matched a
    /// message.
    pub fn cancelled(&self) -> bool {
        self.imp.as_ref().map_or(false, |s| s.cancelled())
    }

    /// Rank of the sending process, or `-1` without message details.
    pub fn source(&self) -> i32 {
        self.imp.as_ref().map_or(-1, |s| s.source())
    }

    /// Tag of the message, or `-1` without message details.
    pub fn tag(&self) -> i32 {
        self.imp.as_ref().map_or(-1, |s| s.tag())
    }

    /// Number of values in the message. A container sent as one value
    /// counts once, however many elements it holds.
    pub fn count(&self) -> usize {
        self.imp.as_ref().map_or(0, |s| s.count())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_message_details() {
            write!(
                f,
                "Status (source={}, tag={}, count={}, cancelled={})",
                self.source(),
                self.tag(),
                self.count(),
                self.cancelled()
            )
        } else {
            write!(f, "Status (no message details)")
        }
    }
}
