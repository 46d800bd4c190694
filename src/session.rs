//! The process-wide session that owns the distributed transport.
//!
//! A process installs at most one transport, once, and may tear it down
//! once. Until a transport is installed (and again after it has been torn
//! down) [`crate::message::default_communicator`] hands out the serial
//! communicator.

use crate::error::{Error, Result};
use crate::message::{Communicator, DistributedCommunicator, Transport};
use crate::timer::Timer;
use log::info;
use once_cell::sync::{Lazy, OnceCell};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

static WORLD: OnceCell<Arc<DistributedCommunicator>> = OnceCell::new();
static FINALIZED: AtomicBool = AtomicBool::new(false);
static STARTED: Lazy<Instant> = Lazy::new(Instant::now);

/// Process-wide queries about the distributed transport.
pub struct Session;

impl Session {
    /// Install the transport that every default communicator in this process
    /// will use.
    pub fn initialize(transport: impl Transport + 'static) -> Result<()> {
        Self::initialize_shared(Arc::new(transport))
    }

    pub fn initialize_shared(transport: Arc<dyn Transport>) -> Result<()> {
        Lazy::force(&STARTED);

        if Self::is_finalized() {
            return Err(Error::Session(
                "the session cannot be initialized after it has been finalized".to_string(),
            ));
        }
        let name = transport.name();
        let world = Arc::new(DistributedCommunicator::from_shared(transport));

        WORLD.set(world).map_err(|_| {
            Error::Session("the session has already been initialized".to_string())
        })?;
        info!(
            "session initialized over {} transport as rank {} of {}",
            name,
            Self::rank(),
            Self::size()
        );
        Ok(())
    }

    /// Install a TCP transport described by the `PEERCOMM_RANK` and
    /// `PEERCOMM_PEERS` environment variables. Returns `false`, leaving the
    /// session uninitialized, if they are not set.
    #[cfg(feature = "tcp")]
    pub fn initialize_from_env() -> Result<bool> {
        use crate::error::WithContext;
        use crate::message::{TcpConfig, TcpTransport};

        match TcpConfig::from_env()? {
            Some(config) => {
                let transport = TcpTransport::new(config)
                    .context(|| "the session was not able to open its TCP transport")?;
                Self::initialize(transport)?;
                Ok(true)
            }
            None => {
                log::debug!("no TCP configuration found in the environment");
                Ok(false)
            }
        }
    }

    /// Tear the transport down. Communicators created afterwards are serial;
    /// the session cannot be initialized again.
    pub fn finalize() -> Result<()> {
        if !Self::is_initialized() {
            return Err(Error::Session(
                "the session cannot be finalized before it has been initialized".to_string(),
            ));
        }
        if FINALIZED.swap(true, Ordering::SeqCst) {
            return Err(Error::Session("the session has already been finalized".to_string()));
        }
        info!("session finalized");
        Ok(())
    }

    pub fn is_initialized() -> bool {
        WORLD.get().is_some()
    }

    pub fn is_finalized() -> bool {
        FINALIZED.load(Ordering::SeqCst)
    }

    /// Returns `true` if a transport is installed and still live.
    pub fn is_distributed_transport_used() -> bool {
        Self::is_initialized() && !Self::is_finalized()
    }

    /// This process's rank in the transport group, or 0 without a live
    /// transport.
    pub fn rank() -> i32 {
        Self::live_world().map_or(0, |world| world.rank())
    }

    /// The number of processes in the transport group, or 1 without a live
    /// transport.
    pub fn size() -> i32 {
        Self::live_world().map_or(1, |world| world.size())
    }

    pub fn create_timer() -> Timer {
        Timer::new()
    }

    /// Seconds elapsed since the session was first touched.
    pub fn wall_time() -> f64 {
        STARTED.elapsed().as_secs_f64()
    }

    pub(crate) fn world() -> Option<Arc<DistributedCommunicator>> {
        WORLD.get().cloned()
    }

    fn live_world() -> Option<&'static Arc<DistributedCommunicator>> {
        WORLD.get().filter(|_| !Self::is_finalized())
    }
}
