//! Logger construction for portal owners.
//!
//! The portal owns its logger instead of relying on a process-wide default:
//! construction fails without one, and every portal operation scopes the
//! owned dispatcher around itself.

use std::fmt;

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

/// An owned logging destination, handed to the portal at construction.
#[derive(Clone)]
pub struct Logger(pub(crate) Dispatch);

impl Logger {
    pub fn new(dispatch: Dispatch) -> Self {
        Self(dispatch)
    }
}

impl From<Dispatch> for Logger {
    fn from(dispatch: Dispatch) -> Self {
        Self(dispatch)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Logger")
    }
}

/// Build a logger writing formatted events to stderr, filtered by
/// `RUST_LOG` (default `info`).
pub fn new_logger() -> Logger {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    Logger(Dispatch::new(subscriber))
}
