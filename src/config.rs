//! Runtime configuration.
//!
//! Analogous to the teacher's `ListenerConfig` (`examples/ryanseipp-rask-old/src/listener.rs`),
//! with the `tls` field dropped since TLS is out of scope here.

use std::num::NonZeroUsize;

/// Tunables for a [`crate::reactor::Reactor`] run.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Number of reactor worker threads, including the one driving the caller's own thread.
    /// Defaults to the available parallelism.
    pub worker_threads: NonZeroUsize,
    /// Per-connection read buffer size, in bytes. Must be at least 1024 (spec invariant).
    pub read_buffer_capacity: usize,
    /// Maximum number of events drained from `mio::Poll::poll` per iteration.
    pub max_events: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let worker_threads = std::thread::available_parallelism()
            .unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            worker_threads,
            read_buffer_capacity: 1024,
            max_events: 1024,
        }
    }
}

impl ServerConfig {
    /// Creates a config with `n` worker threads and otherwise-default tunables.
    pub fn with_worker_threads(n: NonZeroUsize) -> Self {
        Self {
            worker_threads: n,
            ..Self::default()
        }
    }
}
