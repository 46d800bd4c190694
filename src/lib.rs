//! Process-to-process communication for distributed computations.
//!
//! The [`message`] module defines the [`message::Communicator`] contract,
//! its three backends (null, serial, and distributed), and the free
//! functions that move data between the processes of a group. The
//! process-wide [`Session`] owns the distributed transport, if there is
//! one; without it every default communicator is serial, so the same code
//! runs unchanged on one process or many.
//!
//! ```
//! use peercomm::message::{self, Plus};
//!
//! let comm = message::default_communicator();
//! let total = message::all_reduce_value(comm.as_ref(), &21, Plus).unwrap();
//! assert_eq!(total, 21);
//! ```

pub mod coder;
pub mod error;
pub mod logging;
pub mod message;
pub mod session;
pub mod timer;

pub use error::{Error, Result, TransportError};
pub use session::Session;
pub use timer::Timer;
