use super::comm::{Backend, CommHandle, Communicator};
use crate::error::Result;
use log::warn;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

static SERIAL: Lazy<Arc<SerialCommunicator>> = Lazy::new(|| Arc::new(SerialCommunicator {}));

/// The communicator of a process that runs alone.
///
/// There is one serial communicator per process. It has rank 0 and size 1,
/// and answers every collective locally without touching a transport.
pub struct SerialCommunicator {}

impl SerialCommunicator {
    /// Returns the process-wide serial communicator.
    pub fn get() -> CommHandle {
        SERIAL.clone()
    }
}

impl Communicator for SerialCommunicator {
    fn rank(&self) -> i32 {
        0
    }

    fn size(&self) -> i32 {
        1
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn uses_distributed_transport(&self) -> bool {
        false
    }

    fn is_identical(&self, other: &dyn Communicator) -> bool {
        matches!(other.backend(), Backend::Serial)
    }

    fn split_with_key(&self, _color: i32, _key: i32) -> CommHandle {
        Self::get()
    }

    fn backend(&self) -> Backend<'_> {
        Backend::Serial
    }
}

impl fmt::Display for SerialCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Serial Communicator (rank=0, size=1)")
    }
}

/// Warn when a rooted collective on a single process names a root other
/// than 0.
pub(crate) fn ignore_root(operation: &str, root: i32) {
    if root != 0 {
        warn!(
            "the only process available for the {} operation is 0; the requested root process {} will be ignored",
            operation, root
        )
    }
}

/// Single-process `scatterv`: take `sizes[0]` input values starting at
/// `offsets[0]`, clamped to what the input holds and, for a fixed output
/// view, to `capacity`.
pub(crate) fn scatterv_local<T: Clone>(input: &[T], size: usize, offset: usize, capacity: Option<usize>) -> Vec<T> {
    let start = offset.min(input.len());
    let mut count = size.min(input.len() - start);

    if count < size {
        warn!(
            "scatterv was asked for {} values at offset {} of an input of {}; copying {}",
            size,
            offset,
            input.len(),
            count
        )
    }
    if let Some(capacity) = capacity {
        if count > capacity {
            warn!(
                "scatterv output only has room for {} of {} values; the rest will be ignored",
                capacity, count
            );
            count = capacity
        }
    }
    input[start..start + count].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::null::NullCommunicator;

    #[test]
    fn serial_communicator_is_a_group_of_one() {
        let serial = SerialCommunicator::get();
        assert_eq!(serial.rank(), 0);
        assert_eq!(serial.size(), 1);
        assert!(serial.is_valid());
        assert!(!serial.uses_distributed_transport());
        assert!(serial.barrier().is_ok());
        assert_eq!(serial.to_string(), "Serial Communicator (rank=0, size=1)");
    }

    #[test]
    fn splitting_returns_the_singleton() {
        let serial = SerialCommunicator::get();
        let group = serial.split(5);
        assert!(group.is_identical(serial.as_ref()));
        assert!(serial.is_identical(group.as_ref()));
        assert!(!serial.is_identical(NullCommunicator::get().as_ref()));
    }

    #[test]
    fn scatterv_local_clamps_to_input_and_output() {
        let input = [1, 2, 3, 4, 5];
        assert_eq!(scatterv_local(&input, 2, 1, None), vec![2, 3]);
        assert_eq!(scatterv_local(&input, 4, 3, None), vec![4, 5]);
        assert_eq!(scatterv_local(&input, 3, 0, Some(2)), vec![1, 2]);
        assert!(scatterv_local(&input, 1, 9, None).is_empty());
    }
}
