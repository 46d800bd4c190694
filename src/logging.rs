//! Logging setup.
//!
//! The library itself only speaks to the `log` facade. Binaries and tests
//! that want to see the messages call one of these once at startup; the
//! `RUST_LOG` environment variable is honored as usual.

/// Initialize `env_logger` from the environment. Calling it more than once
/// is harmless.
pub fn init() {
    let _ = env_logger::Builder::from_default_env().try_init();
}

/// Initialize `env_logger` with a fixed maximum level.
pub fn init_with_level(level: log::LevelFilter) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}
