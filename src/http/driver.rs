//! Wires a [`crate::connection::Connection`]'s byte stream through the [`Parser`] to produce
//! `request`/`upgrade` events, and recycles the `IncomingMessage`/`Response`/`Parser` triple
//! across pipelined requests on a keep-alive connection.
//!
//! Grounded on the `nodecxx` `Server<Protocol>::onData` path (`examples/original_source/http/http.cpp`),
//! which feeds socket bytes to `http_parser_execute` and reacts to its callbacks by building up a
//! request object and eventually emitting it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::connection::Connection;

use super::message::IncomingMessage;
use super::parser::{Callbacks, Parser};
use super::response::Response;
use super::types::{Method, Version};

/// A `request` handler: the paired request and response for one HTTP exchange. Reactor worker
/// threads each call into the same handler set concurrently, so handlers are `Fn` (not `FnMut`)
/// and must be `Send + Sync`; any handler-local mutable state goes through interior mutability,
/// the same way it would have to in any multi-threaded acceptor loop.
pub type RequestHandler = dyn Fn(&mut IncomingMessage, &mut Response) + Send + Sync;

/// An `upgrade` handler: the request, its paired response, and any bytes the parser had already
/// buffered past the request's header block (the start of the upgraded protocol's own framing).
pub type UpgradeHandler = dyn Fn(&mut IncomingMessage, &mut Response, &[u8]) + Send + Sync;

/// Handlers shared across every connection every reactor worker accepts, invoked once per parsed
/// request or upgrade. Unlike `Connection`'s or `IncomingMessage`'s per-connection event
/// registries (single-threaded, `FnMut`, accumulate-and-fire-in-order via
/// `crate::events::Registry`), this set is read concurrently from every worker thread, so it is
/// built up once before `Reactor::run` and treated as read-only afterwards.
#[derive(Default)]
pub struct HttpHandlers {
    request_handlers: Vec<Arc<RequestHandler>>,
    upgrade_handlers: Vec<Arc<UpgradeHandler>>,
}

impl HttpHandlers {
    /// Creates an empty handler set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `request` handler, run with every fully-parsed request on any connection.
    pub fn on_request(&mut self, handler: impl Fn(&mut IncomingMessage, &mut Response) + Send + Sync + 'static) {
        self.request_handlers.push(Arc::new(handler));
    }

    /// Registers an `upgrade` handler. If at least one is registered, an upgrade request is
    /// handed to all of them instead of being closed for lack of a handler (spec §4.4).
    pub fn on_upgrade(
        &mut self,
        handler: impl Fn(&mut IncomingMessage, &mut Response, &[u8]) + Send + Sync + 'static,
    ) {
        self.upgrade_handlers.push(Arc::new(handler));
    }
}

struct Accumulator {
    field: Vec<u8>,
    value: Vec<u8>,
    in_value: bool,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            field: Vec::with_capacity(32),
            value: Vec::with_capacity(64),
            in_value: false,
        }
    }

    fn reset(&mut self) {
        self.field.clear();
        self.value.clear();
        self.in_value = false;
    }
}

/// Owns one request's parser state and the `IncomingMessage`/`Response` pair it drives, attached
/// to a single connection for that connection's lifetime.
pub struct HttpDriver {
    handlers: Arc<HttpHandlers>,
    parser: Parser,
    message: IncomingMessage,
    response: Response,
    acc: Accumulator,
    /// Handle to this driver's own `Rc<RefCell<_>>`, set by `attach`. Used to re-register a raw
    /// passthrough `data` handler on the connection once a request upgrades (see
    /// `finish_message`), without needing the caller to thread the `Rc` back in.
    self_ref: Weak<RefCell<HttpDriver>>,
}

impl HttpDriver {
    /// Creates a driver sharing `handlers` with every other connection on every reactor thread.
    pub fn new(handlers: Arc<HttpHandlers>) -> Self {
        Self {
            handlers,
            parser: Parser::new(),
            message: IncomingMessage::new(),
            response: Response::new(),
            acc: Accumulator::new(),
            self_ref: Weak::new(),
        }
    }

    /// Attaches this driver to `connection`'s `data` events, so every byte read from the socket
    /// is fed to the HTTP parser.
    pub fn attach(driver: Rc<RefCell<HttpDriver>>, connection: &mut Connection) {
        driver.borrow_mut().self_ref = Rc::downgrade(&driver);

        let d = driver.clone();
        connection.on_data(move |conn, bytes| {
            d.borrow_mut().feed(conn, bytes);
        });
        let d = driver.clone();
        connection.on_close(move |_conn, _had_error| {
            d.borrow_mut().message.fire_close();
        });
    }

    fn feed(&mut self, conn: &mut Connection, mut data: &[u8]) {
        while !data.is_empty() {
            if self.parser.is_complete() {
                // A previous request on this pipelined connection finished parsing but its
                // response has not been dispatched yet (shouldn't normally happen since we
                // dispatch synchronously in on_headers_complete); guard against feeding it more.
                break;
            }

            let consumed = {
                let mut ctx = ParserCtx {
                    message: &mut self.message,
                    acc: &mut self.acc,
                    response: &mut self.response,
                    handlers: &self.handlers,
                    conn: &mut *conn,
                };
                match self.parser.execute(&mut ctx, data) {
                    Ok(n) => n,
                    Err(e) => {
                        self.message.fire_error(&e);
                        let _ = conn.end(Vec::new());
                        return;
                    }
                }
            };
            data = &data[consumed..];

            if self.parser.is_complete() {
                let upgraded = self.parser.upgrade;
                self.finish_message(conn, data);
                if upgraded {
                    // `finish_message` already replaced this connection's `data` handler with a
                    // raw passthrough and handed it every byte still in `data`; nothing HTTP-shaped
                    // remains to parse on this connection.
                    return;
                }
            }
        }
    }

    /// Runs once a request finishes parsing (spec §4.4's `message_complete`): either fires the
    /// `upgrade` handlers and detaches this driver from the connection's raw byte stream, or, for
    /// an ordinary request, recycles the parser/message/response for the next pipelined request
    /// if the connection is being kept alive.
    fn finish_message(&mut self, conn: &mut Connection, leftover: &[u8]) {
        if self.parser.upgrade {
            self.response.bind(conn.io_handle(), self.message.version, false);
            if self.handlers.upgrade_handlers.is_empty() {
                let _ = conn.end(Vec::new());
                return;
            }
            self.fire_upgrade(leftover);

            // Detach from HTTP framing (spec §4.4: "the Connection's bytes no longer belong to
            // the HTTP layer"). Any bytes that arrive in a later read are handed straight to the
            // same upgrade handlers instead of re-entering `feed`, which would otherwise discard
            // them once `self.parser.is_complete()` is already true.
            if let Some(driver) = self.self_ref.upgrade() {
                conn.clear_data_handlers();
                conn.on_data(move |_conn, bytes| {
                    driver.borrow_mut().fire_upgrade(bytes);
                });
            }
            return;
        }

        let keep_alive = self.message.keep_alive && self.response.is_message_ended();
        if keep_alive {
            self.message.reset();
            self.response.reset();
            self.parser.reset();
            self.acc.reset();
        }
        // If the handler never called `end`, or the connection is not being kept alive, the
        // connection closes once the response (if any) finishes flushing — see
        // `Response::end` and `Connection::handle_writable`.
    }

    fn fire_upgrade(&mut self, bytes: &[u8]) {
        for handler in self.handlers.upgrade_handlers.iter() {
            handler(&mut self.message, &mut self.response, bytes);
        }
    }
}

/// Adapts [`Callbacks`] onto the pieces an [`HttpDriver`] needs mutable access to while parsing,
/// without borrowing the whole driver (which also holds the immutable, thread-shared `handlers`).
/// Also carries the connection being fed, so `on_headers_complete` can bind the response and
/// dispatch the `request` handlers as soon as headers are done — before any body bytes arrive —
/// rather than waiting for the whole message to finish parsing.
struct ParserCtx<'a> {
    message: &'a mut IncomingMessage,
    acc: &'a mut Accumulator,
    response: &'a mut Response,
    handlers: &'a HttpHandlers,
    conn: &'a mut Connection,
}

impl Callbacks for ParserCtx<'_> {
    fn on_url(&mut self, data: &[u8]) {
        self.message.url.push_str(&String::from_utf8_lossy(data));
    }

    fn on_header_field(&mut self, data: &[u8]) {
        if self.acc.in_value {
            commit_header(self.message, &mut self.acc.field, &mut self.acc.value);
            self.acc.in_value = false;
        }
        self.acc.field.extend_from_slice(data);
    }

    fn on_header_value(&mut self, data: &[u8]) {
        self.acc.in_value = true;
        self.acc.value.extend_from_slice(data);
    }

    fn on_headers_complete(&mut self, method: Method, version: Version, keep_alive: bool, upgrade: bool) {
        if !self.acc.field.is_empty() {
            commit_header(self.message, &mut self.acc.field, &mut self.acc.value);
            self.acc.in_value = false;
        }
        self.message.method = Some(method);
        self.message.version = version;
        self.message.keep_alive = keep_alive;

        if upgrade {
            // An upgraded request never fires a `request` handler (spec §4.4); `finish_message`
            // fires `upgrade` once the message — and any bytes the parser scans past it — is
            // fully consumed.
            return;
        }

        self.response.bind(self.conn.io_handle(), version, keep_alive);
        for handler in self.handlers.request_handlers.iter() {
            handler(&mut *self.message, &mut *self.response);
        }
    }

    fn on_body(&mut self, data: &[u8]) {
        self.message.fire_data(data);
    }

    fn on_message_complete(&mut self, keep_alive: bool) {
        self.message.keep_alive = keep_alive;
    }
}

fn commit_header(message: &mut IncomingMessage, field: &mut Vec<u8>, value: &mut Vec<u8>) {
    let name = String::from_utf8_lossy(field).into_owned();
    let val = String::from_utf8_lossy(value).into_owned();
    message.headers.append(name, val);
    field.clear();
    value.clear();
}
