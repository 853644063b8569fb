//! The user-facing façade: `Server`, mirroring the `createServer`/`listen`/`on` surface spec §6
//! enumerates. Internally this just wires an [`HttpDriver`] onto every connection a [`Listener`]
//! accepts and hands the whole thing to [`Reactor::run`].

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::{ResolutionError, TransportError};
use crate::http::driver::{HttpDriver, HttpHandlers};
use crate::http::message::IncomingMessage;
use crate::http::response::Response;
use crate::listener::Listener;
use crate::reactor::Reactor;

/// An HTTP server: a `Listener` plus the `request`/`upgrade` handler set every accepted
/// connection's `HttpDriver` shares.
pub struct Server {
    listener: Listener,
    handlers: HttpHandlers,
}

impl Server {
    /// Creates a server with no handlers and no bound address yet.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            listener: Listener::new(config),
            handlers: HttpHandlers::new(),
        }
    }

    /// Registers a `request` handler, run with every fully-parsed request on any connection this
    /// server accepts, on whichever reactor worker thread accepted it.
    pub fn on_request(
        &mut self,
        handler: impl Fn(&mut IncomingMessage, &mut Response) + Send + Sync + 'static,
    ) {
        self.handlers.on_request(handler);
    }

    /// Registers an `upgrade` handler. Without one, an upgrade request's connection is closed
    /// (spec §4.4).
    pub fn on_upgrade(
        &mut self,
        handler: impl Fn(&mut IncomingMessage, &mut Response, &[u8]) + Send + Sync + 'static,
    ) {
        self.handlers.on_upgrade(handler);
    }

    /// Resolves `(host, port)` and binds an acceptor for every resulting address. Must be called
    /// before `run`.
    pub fn listen(&mut self, host: &str, port: u16) -> Result<(), ResolutionError> {
        self.listener.listen(host, port)
    }

    /// The addresses this server is bound to, after a successful `listen`.
    pub fn local_addrs(&self) -> io::Result<Vec<std::net::SocketAddr>> {
        self.listener.local_addrs()
    }

    /// Freezes the handler set, attaches an `HttpDriver` factory to the listener, and runs the
    /// reactor. Blocks the calling thread; see [`Reactor::run`].
    pub fn run(mut self) -> Result<(), TransportError> {
        let handlers = Arc::new(std::mem::take(&mut self.handlers));
        self.listener.on_connection(move |conn| {
            let driver = Rc::new(RefCell::new(HttpDriver::new(handlers.clone())));
            HttpDriver::attach(driver, conn);
        });
        Reactor::run(self.listener)
    }
}

/// Creates a server with default configuration and `handler` registered as its `request` handler
/// — the common case, mirroring `http.createServer(cb)`.
pub fn create_server(
    handler: impl Fn(&mut IncomingMessage, &mut Response) + Send + Sync + 'static,
) -> Server {
    let mut server = Server::new(ServerConfig::default());
    server.on_request(handler);
    server
}
