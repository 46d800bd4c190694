use super::distributed::DistributedCommunicator;
use super::null::NullCommunicator;
use super::serial::SerialCommunicator;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::timer::Timer;
use log::debug;
use std::fmt;
use std::sync::Arc;

/// Wildcard source rank for receives and probes.
pub const ANY_SOURCE: i32 = -1;

/// Wildcard tag for receives and probes.
pub const ANY_TAG: i32 = -1;

/// A shared, read-only communicator.
pub type CommHandle = Arc<dyn Communicator>;

/// Identifies which backend implements a communicator. The free functions
/// dispatch on this and on nothing else.
#[derive(Clone, Copy)]
pub enum Backend<'a> {
    Null,
    Serial,
    Distributed(&'a DistributedCommunicator),
    /// A communicator implemented outside this crate.
    Unknown,
}

/// Interface for a fixed group of cooperating processes.
///
/// A communicator never changes after construction: its rank, size, and
/// membership are fixed for its lifetime. Communication happens through the
/// free functions of [`crate::message`], which check the communicator
/// before any transport is touched.
pub trait Communicator: fmt::Display + Send + Sync {
    /// This process's 0-based rank within the group, or `-1` if the
    /// communicator is not valid.
    fn rank(&self) -> i32;

    /// The number of processes in the group. Zero for the null communicator.
    fn size(&self) -> i32;

    /// The value that matches messages from any source.
    fn any_source_value(&self) -> i32 {
        ANY_SOURCE
    }

    /// The value that matches messages with any tag.
    fn any_tag_value(&self) -> i32 {
        ANY_TAG
    }

    /// Block until every process in the group has entered the barrier. A
    /// no-op for groups of one or zero processes.
    fn barrier(&self) -> Result<()>;

    fn is_valid(&self) -> bool;

    /// Returns `true` if messages travel over a distributed transport.
    fn uses_distributed_transport(&self) -> bool;

    /// Returns `true` if both communicators address the same underlying
    /// group.
    fn is_identical(&self, other: &dyn Communicator) -> bool;

    /// Split into disjoint groups of the processes that pass the same
    /// `color`, ranked in their original order. Every process in the group
    /// must call this. A negative color opts the caller out and yields the
    /// null communicator.
    fn split(&self, color: i32) -> CommHandle {
        self.split_with_key(color, self.rank())
    }

    /// Like [`Communicator::split`], but ranks each new group by `key`,
    /// breaking ties by original rank.
    fn split_with_key(&self, color: i32, key: i32) -> CommHandle;

    fn create_timer(&self) -> Timer {
        Timer::new()
    }

    /// Which backend implements this communicator.
    fn backend(&self) -> Backend<'_> {
        Backend::Unknown
    }
}

/// Returns the communicator for the current process.
///
/// If the process-wide [`Session`] has an initialized, not yet finalized
/// transport, this is the distributed communicator over its whole group.
/// Otherwise it is the serial singleton.
pub fn default_communicator() -> CommHandle {
    match Session::world() {
        Some(world) if !Session::is_finalized() => {
            debug!("selected {}", world);
            let world: CommHandle = world;
            world
        }
        _ => {
            debug!("no distributed transport is available, running serially");
            SerialCommunicator::get()
        }
    }
}

/// How a collective reaches its participants.
pub(crate) enum Route<'a> {
    /// A single process; the operation is answered locally.
    Local,
    Distributed(&'a DistributedCommunicator),
}

/// Resolve the route for a collective operation. Any non-null group is
/// accepted; groups of one are answered locally.
pub(crate) fn collective_route(comm: &dyn Communicator) -> Result<Route<'_>> {
    if comm.size() > 1 {
        match comm.backend() {
            Backend::Distributed(distributed) => Ok(Route::Distributed(distributed)),
            _ => Err(unknown_backend()),
        }
    } else if comm.size() == 0 {
        Err(Error::invalid_communicator(
            "a null communicator (size == 0) was encountered",
        ))
    } else {
        Ok(Route::Local)
    }
}

/// Resolve the backend for a point-to-point or probe operation, which needs
/// a distributed group of at least two processes.
pub(crate) fn point_to_point_route<'a>(
    comm: &'a dyn Communicator,
    operation: &str,
) -> Result<&'a DistributedCommunicator> {
    if comm.size() <= 1 {
        return Err(Error::invalid_communicator(format!(
            "{} operations can only be done with communicators of size 2 or greater",
            operation
        )));
    }
    match comm.backend() {
        Backend::Distributed(distributed) => Ok(distributed),
        _ => Err(unknown_backend()),
    }
}

fn unknown_backend() -> Error {
    Error::invalid_communicator("an unknown communicator type was encountered")
}

/// Check that `rank` names a member of the group (or is the wildcard, where
/// `allow_any` says one is accepted).
pub(crate) fn check_rank(comm: &dyn Communicator, rank: i32, role: &str, allow_any: bool) -> Result<()> {
    if allow_any && rank == comm.any_source_value() {
        return Ok(());
    }
    if rank < 0 || rank >= comm.size() {
        return Err(Error::invalid_communicator(format!(
            "{} {} is not a member of {}",
            role, rank, comm
        )));
    }
    Ok(())
}

impl fmt::Debug for dyn Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
