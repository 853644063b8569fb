//! `Listener`: resolves a host/port, binds one acceptor per resolved address, and hands off
//! accepted connections to a user-supplied callback.
//!
//! Grounded on the teacher's `Listener` (`examples/ryanseipp-rask-old/src/listener.rs`) for the
//! `Poll` + `Slab` + event-loop shape, and on `MultiListener`
//! (`examples/ryanseipp-rask-old/src/multilistener.rs`, since removed from this tree once its
//! design was folded in here) for the thread-per-core pattern: rather than a single listener
//! thread fanning work out to a pool of worker threads over a channel guarded by
//! `Mutex<Connection>` (the teacher's `Listener`+`Worker` split, whose own `worker.rs` carries a
//! long comment on the mutex-contention risk that design runs), each reactor worker thread owns
//! an independent `mio::Poll` and `Slab<Connection>`, all sharing the same listening socket(s) via
//! `TcpListener::try_clone`. No connection is ever touched by more than one thread, so no
//! connection-level lock is needed at all.

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener, ToSocketAddrs};
use std::sync::Arc;

use mio::net::TcpListener as MioTcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{ResolutionError, TransportError};

/// A connection-handler callback, run once per accepted connection, on whichever reactor worker
/// thread accepted it. Typically attaches an [`crate::http::driver::HttpDriver`]
/// (see [`crate::server::Server`]).
pub type ConnectionHandler = dyn Fn(&mut Connection) + Send + Sync;

/// Binds to a host/port and, once [`Listener::run`][crate::reactor::Reactor::run] starts, accepts
/// connections across every reactor worker thread.
pub struct Listener {
    config: ServerConfig,
    acceptors: Vec<StdTcpListener>,
    connection_handler: Option<Arc<ConnectionHandler>>,
}

impl Listener {
    /// Creates a listener with no bound address yet.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            acceptors: Vec::new(),
            connection_handler: None,
        }
    }

    /// Registers the `connection` handler, replacing any previously registered one (spec §4.2).
    /// Must be called before [`Listener::listen`]'s sockets start accepting, i.e. before
    /// `Reactor::run`.
    pub fn on_connection(&mut self, handler: impl Fn(&mut Connection) + Send + Sync + 'static) {
        self.connection_handler = Some(Arc::new(handler));
    }

    /// Resolves `(host, port)` via the OS resolver and binds one non-blocking acceptor per
    /// resulting address. A resolution failure, or a resolution that yields no addresses, is
    /// returned as a [`ResolutionError`] and leaves this listener with whatever acceptors (if
    /// any) were already bound by earlier calls.
    pub fn listen(&mut self, host: &str, port: u16) -> Result<(), ResolutionError> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(ResolutionError::NoAddresses);
        }
        for addr in addrs {
            let acceptor = StdTcpListener::bind(addr)?;
            acceptor.set_nonblocking(true)?;
            debug!(%addr, "bound acceptor");
            self.acceptors.push(acceptor);
        }
        Ok(())
    }

    /// The addresses this listener is bound to, after a successful `listen`.
    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.acceptors.iter().map(|a| a.local_addr()).collect()
    }

    pub(crate) fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Builds one `ReactorWorker` for the calling thread, cloning every acceptor socket. Used by
    /// [`crate::reactor::Reactor::run`] once per worker thread.
    pub(crate) fn spawn_worker(&self) -> Result<ReactorWorker, TransportError> {
        let mut acceptors = Vec::with_capacity(self.acceptors.len());
        for (i, std_listener) in self.acceptors.iter().enumerate() {
            let cloned = std_listener.try_clone()?;
            let mio_listener = MioTcpListener::from_std(cloned);
            acceptors.push((Token(usize::MAX - 1 - i), mio_listener));
        }

        let poll = Poll::new()?;
        for (token, listener) in acceptors.iter_mut() {
            poll.registry()
                .register(listener, *token, Interest::READABLE)?;
        }

        Ok(ReactorWorker {
            poll,
            acceptors,
            connections: Slab::new(),
            connection_handler: self.connection_handler.clone(),
            read_buffer_capacity: self.config.read_buffer_capacity,
            max_events: self.config.max_events,
        })
    }
}

/// One reactor worker's independent event loop: its own `Poll`, its own `Slab<Connection>`, and
/// clones of every acceptor socket. Runs entirely on the thread that calls [`ReactorWorker::run`].
pub(crate) struct ReactorWorker {
    poll: Poll,
    acceptors: Vec<(Token, MioTcpListener)>,
    connections: Slab<Connection>,
    connection_handler: Option<Arc<ConnectionHandler>>,
    read_buffer_capacity: usize,
    max_events: usize,
}

impl ReactorWorker {
    /// Runs this worker's event loop until `poll` returns a fatal error. Blocks the calling
    /// thread.
    pub(crate) fn run(mut self) {
        let mut events = Events::with_capacity(self.max_events);
        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "reactor poll failed, worker exiting");
                return;
            }

            for event in events.iter() {
                let token = event.token();
                if let Some(acceptor_index) = self.acceptor_index(token) {
                    self.accept(acceptor_index);
                    continue;
                }

                let Some(conn) = self.connections.get_mut(token.0) else {
                    continue;
                };

                if event.is_readable() {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        conn.handle_readable();
                    }));
                    if result.is_err() {
                        let err = TransportError::HandlerPanic { token };
                        error!(%err, "closing connection");
                        conn.force_close_after_panic();
                    }
                }
                if !conn.is_closed() && event.is_writable() {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        conn.handle_writable();
                    }));
                    if result.is_err() {
                        let err = TransportError::HandlerPanic { token };
                        error!(%err, "closing connection");
                        conn.force_close_after_panic();
                    }
                }

                self.finish_event(token);
            }
        }
    }

    fn acceptor_index(&self, token: Token) -> Option<usize> {
        self.acceptors
            .iter()
            .position(|(t, _)| *t == token)
    }

    fn accept(&mut self, acceptor_index: usize) {
        loop {
            let (stream, _peer) = match self.acceptors[acceptor_index].1.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            };

            let entry = self.connections.vacant_entry();
            let token = Token(entry.key());
            let mut connection = Connection::new(stream, token, self.read_buffer_capacity);

            if let Err(e) = connection.register(self.poll.registry()) {
                warn!(error = %e, "failed to register accepted connection");
                continue;
            }

            if let Some(handler) = &self.connection_handler {
                let handler = handler.clone();
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler(&mut connection);
                }));
                if result.is_err() {
                    let err = TransportError::HandlerPanic { token };
                    error!(%err, "dropping freshly accepted connection");
                    continue;
                }
            }

            entry.insert(connection);
        }
    }

    fn finish_event(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(token.0) else {
            return;
        };

        if conn.is_closed() {
            let _ = conn.deregister(self.poll.registry());
            self.connections.remove(token.0);
        } else if let Err(e) = conn.reregister(self.poll.registry()) {
            warn!(error = %e, ?token, "failed to reregister connection");
        }
    }
}
