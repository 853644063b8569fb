//! `Reactor::run`: spins up the configured number of worker threads, each driving its own
//! independent event loop, and blocks the calling thread running one more.
//!
//! Grounded on the `nodecxx` `Server::run(numThreads)` (`examples/original_source/core.cpp`),
//! which does exactly this: spawn `numThreads - 1` additional threads, then run the same loop on
//! the calling thread so the call blocks until shutdown.

use std::thread;

use tracing::info;

use crate::error::TransportError;
use crate::listener::Listener;

/// Runs a bound [`Listener`] across `listener`'s configured worker thread count. Blocks the
/// calling thread, which drives one of the reactor workers itself; the other
/// `worker_threads - 1` run on spawned OS threads.
pub struct Reactor;

impl Reactor {
    /// Spawns `n - 1` additional worker threads (`n` taken from `listener`'s config) and runs the
    /// last worker on the calling thread. Returns once every worker's event loop exits (normally
    /// only on a fatal `Poll` error, since each loop otherwise runs forever).
    pub fn run(listener: Listener) -> Result<(), TransportError> {
        let worker_count = listener.config().worker_threads.get();
        info!(worker_count, "starting reactor");

        let mut join_handles = Vec::with_capacity(worker_count.saturating_sub(1));
        for i in 1..worker_count {
            let worker = listener.spawn_worker()?;
            join_handles.push(
                thread::Builder::new()
                    .name(format!("evhttp-reactor-{i}"))
                    .spawn(move || worker.run())?,
            );
        }

        // The calling thread drives one worker itself rather than only supervising, matching
        // `run(numThreads)` blocking the caller in the original.
        let this_worker = listener.spawn_worker()?;
        this_worker.run();

        for handle in join_handles {
            let _ = handle.join();
        }

        Ok(())
    }
}
