//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system.
///
/// Safe to call more than once (subsequent calls are no-ops), which makes
/// it usable from tests as well as application startup.
pub fn init() {
    let _ = env_logger::Builder::from_default_env().try_init();
}
