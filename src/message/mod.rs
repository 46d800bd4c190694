//! A message-passing API over groups of cooperating processes.
//!
//! Application code obtains a [`Communicator`] from
//! [`default_communicator`] (or builds a [`DistributedCommunicator`] over a
//! [`Transport`] directly) and then calls the free functions of this module
//! against it. The same calls work whatever the backend: a group of one
//! process answers collectives locally, and the null communicator rejects
//! everything with [`crate::Error::InvalidCommunicator`].
//!
//! Two transports are included: [`LocalTransport`], which joins threads of
//! one process over channels, and (with the `tcp` feature) a pure-Rust
//! [`TcpTransport`].

mod buffer;
mod collective;
mod comm;
mod distributed;
mod local;
mod null;
mod point_to_point;
mod reduce_op;
mod request;
mod serial;
mod status;
#[cfg(feature = "tcp")]
mod tcp;
mod transport;
#[cfg_attr(not(feature = "tcp"), allow(dead_code))]
mod util;

pub use buffer::ValueBuffer;
pub use collective::{
    all_gather, all_reduce, all_reduce_in_place, all_reduce_value, all_to_all, broadcast,
    broadcast_value, gather, gatherv, gatherv_with_sizes, reduce, reduce_value, scan, scan_value,
    scatter, scatterv,
};
pub use comm::{default_communicator, Backend, CommHandle, Communicator, ANY_SOURCE, ANY_TAG};
pub use distributed::DistributedCommunicator;
pub use local::LocalTransport;
pub use null::NullCommunicator;
pub use point_to_point::{
    iprobe, iprobe_any, iprobe_source, iprobe_tag, ireceive, isend, probe, probe_any, probe_source,
    probe_tag, receive, receive_value, send, send_value, wait, wait_all,
};
pub use reduce_op::{
    BitwiseAnd, BitwiseOr, BitwiseXor, LogicalAnd, LogicalOr, LogicalXor, Maximum, Minimum,
    Multiplies, NativeOp, Plus, ReduceOperation,
};
pub use request::Request;
pub use serial::SerialCommunicator;
pub use status::Status;
#[cfg(feature = "tcp")]
pub use tcp::{TcpConfig, TcpTransport};
pub use transport::{Envelope, Frame, Kind, Transport};
