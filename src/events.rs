//! Typed per-emitter event registries.
//!
//! The original `nodecxx` source composes an emitter's event set from a variadic list of marker
//! types (`EmittingEvents<close_t, data_t, error_t, drain_t>`, see
//! `examples/original_source/events.hpp`). Spec §9's REDESIGN FLAGS calls for replacing that with
//! a fixed enum of event kinds per emitter, each carrying its own typed handler slot — this module
//! is that replacement: one [`Registry<F>`] per event kind, composed by hand into each emitter
//! (`Connection`, `Listener`, `IncomingMessage`).
//!
//! Handlers registered during a `fire` do not run in that same firing — `fire` snapshots the
//! handler count up front and only invokes handlers that existed before it started.

/// An ordered list of handlers for one event kind on one emitter.
pub struct Registry<F: ?Sized> {
    handlers: Vec<Box<F>>,
}

impl<F: ?Sized> Default for Registry<F> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<F: ?Sized> Registry<F> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler, to be run after any already registered.
    pub fn on(&mut self, handler: Box<F>) {
        self.handlers.push(handler);
    }

    /// Empties the registry.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Returns whether any handler is currently registered.
    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Returns the handlers registered at this instant, snapshotted so that handlers added while
    /// firing do not themselves fire for the current event.
    pub fn snapshot_len(&self) -> usize {
        self.handlers.len()
    }

    /// Runs `run` against each handler present at the time this is called (up to
    /// `snapshot_len`), in registration order.
    pub fn for_each(&mut self, mut run: impl FnMut(&mut F)) -> bool {
        let n = self.snapshot_len();
        let had_handlers = n > 0;
        for handler in self.handlers.iter_mut().take(n) {
            run(handler);
        }
        had_handlers
    }

    /// Moves `other`'s handlers onto the end of this registry, in `other`'s order. Used by
    /// emitters to fold back any handler registered while a firing that temporarily moved this
    /// registry out of `self` was still in progress (see each emitter's `fire_*` methods).
    pub fn append_from(&mut self, mut other: Registry<F>) {
        self.handlers.append(&mut other.handlers);
    }
}

#[cfg(test)]
mod test {
    use super::Registry;

    #[test]
    fn for_each_reports_whether_any_handler_ran() {
        let mut r: Registry<dyn FnMut(&mut i32)> = Registry::new();
        assert!(!r.for_each(|_| {}));
        r.on(Box::new(|n: &mut i32| *n += 1));
        assert!(r.for_each(|_| {}));
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut r: Registry<dyn FnMut(&mut Vec<i32>)> = Registry::new();
        r.on(Box::new(|log: &mut Vec<i32>| log.push(1)));
        r.on(Box::new(|log: &mut Vec<i32>| log.push(2)));
        let mut log = Vec::new();
        r.for_each(|h| h(&mut log));
        assert_eq!(vec![1, 2], log);
    }

    #[test]
    fn handlers_added_during_fire_do_not_run_in_that_firing_but_persist_for_the_next() {
        // Mirrors the mem::take / append_from dance each emitter's fire_* method does.
        let mut registry: Registry<dyn FnMut(&mut Vec<i32>)> = Registry::new();
        registry.on(Box::new(|log: &mut Vec<i32>| log.push(1)));

        let mut taken = std::mem::take(&mut registry);
        let mut log = Vec::new();
        taken.for_each(|h| {
            h(&mut log);
            // A handler registering another handler mid-firing mirrors calling
            // `conn.on_data(...)` from inside a `data` callback.
            registry.on(Box::new(|log: &mut Vec<i32>| log.push(2)));
        });
        taken.append_from(registry);
        registry = taken;

        assert_eq!(vec![1], log, "the handler added mid-firing must not run yet");

        let mut log = Vec::new();
        registry.for_each(|h| h(&mut log));
        assert_eq!(vec![1, 2], log, "but must run, in order, on the next firing");
    }

    #[test]
    fn clear_removes_all_handlers() {
        let mut r: Registry<dyn FnMut(&mut i32)> = Registry::new();
        r.on(Box::new(|n: &mut i32| *n += 1));
        r.clear();
        assert!(!r.has_handlers());
        assert!(!r.for_each(|_| {}));
    }
}
