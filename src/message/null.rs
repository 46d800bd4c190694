use super::comm::{Backend, CommHandle, Communicator};
use crate::error::Result;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

static NULL: Lazy<Arc<NullCommunicator>> = Lazy::new(|| Arc::new(NullCommunicator {}));

/// The communicator of a process that belongs to no group.
///
/// It is returned by a split in which this process opted out, or which
/// failed. Every communication operation on it is rejected, except the
/// barrier, which has no one to wait for.
pub struct NullCommunicator {}

impl NullCommunicator {
    /// Returns the process-wide null communicator.
    pub fn get() -> CommHandle {
        NULL.clone()
    }
}

impl Communicator for NullCommunicator {
    fn rank(&self) -> i32 {
        -1
    }

    fn size(&self) -> i32 {
        0
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn is_valid(&self) -> bool {
        false
    }

    fn uses_distributed_transport(&self) -> bool {
        false
    }

    fn is_identical(&self, other: &dyn Communicator) -> bool {
        matches!(other.backend(), Backend::Null)
    }

    fn split_with_key(&self, _color: i32, _key: i32) -> CommHandle {
        Self::get()
    }

    fn backend(&self) -> Backend<'_> {
        Backend::Null
    }
}

impl fmt::Display for NullCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Null Communicator")
    }
}
