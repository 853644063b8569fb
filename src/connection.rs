//! `Connection`: a user-facing wrapper around one accepted socket with events and a send queue.
//!
//! Grounded on `PlainConnection` (this crate's teacher, `examples/ryanseipp-rask-old/src/connection.rs`)
//! and the `nodecxx` `Socket<Protocol>` (`examples/original_source/net/net.hpp`), generalized to the
//! spec's explicit event-callback and backpressure model. TLS is dropped entirely — out of scope
//! per spec §1 — so there is exactly one connection type rather than the teacher's `Plain`/`Tls`
//! split, and HTTP framing moves out into `http::driver` rather than living inside `Connection`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::rc::Rc;

use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::events::Registry as EventRegistry;

type DataHandler = dyn FnMut(&mut Connection, &[u8]);
type ErrorHandler = dyn FnMut(&mut Connection, &io::Error);
type DrainHandler = dyn FnMut(&mut Connection);
type CloseHandler = dyn FnMut(&mut Connection, bool);

/// The shared, reference-counted send queue backing a `Connection`'s writes. `Response` holds a
/// clone of this handle so it can enqueue bytes without borrowing `Connection` itself — see
/// DESIGN.md for why this replaces the implicit `this`-capturing closures the original used.
#[derive(Debug, Default)]
pub(crate) struct ConnectionIo {
    queue: VecDeque<(Vec<u8>, bool)>,
    /// Set once an end-flagged write has been enqueued. Spec §4.3: "subsequent writes are
    /// undefined behavior"; this crate's documented choice is to reject them.
    ended: bool,
}

impl ConnectionIo {
    pub(crate) fn buffer_size(&self) -> usize {
        self.queue.iter().map(|(b, _)| b.len()).sum()
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.ended
    }

    pub(crate) fn enqueue(&mut self, bytes: Vec<u8>, end: bool) -> Result<(), WriteAfterEndError> {
        if self.ended {
            return Err(WriteAfterEndError);
        }
        if end {
            self.ended = true;
        }
        if !bytes.is_empty() || end {
            self.queue.push_back((bytes, end));
        }
        Ok(())
    }
}

/// Returned when `write` or `end` is called after a previous `end` already enqueued its terminal
/// chunk.
#[derive(Debug, Clone, Copy)]
pub struct WriteAfterEndError;

impl std::fmt::Display for WriteAfterEndError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("write called after end() on this connection")
    }
}

impl std::error::Error for WriteAfterEndError {}

/// One accepted TCP connection: owns the socket, a reusable read buffer, an ordered send queue,
/// and the `{data, error, drain, close}` event registries.
pub struct Connection {
    stream: TcpStream,
    token: Token,
    read_buf: crate::buffer::Buffer,
    io: Rc<RefCell<ConnectionIo>>,
    closed: bool,

    data_handlers: EventRegistry<DataHandler>,
    /// Set by `clear_data_handlers` while a `fire_data` call is in progress (i.e. from inside a
    /// `data` handler itself). Tells `fire_data` to drop the handlers it snapshotted at the start
    /// of this firing instead of folding them back in underneath whatever handler `clear_data_handlers`'s
    /// caller installs next — otherwise the discarded handler would reappear, a no-op forever since
    /// it only ever ran again to find nothing left to do, but still dead weight on every future read.
    data_cleared: bool,
    error_handlers: EventRegistry<ErrorHandler>,
    drain_handlers: EventRegistry<DrainHandler>,
    close_handlers: EventRegistry<CloseHandler>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("token", &self.token)
            .field("closed", &self.closed)
            .field("buffered", &self.buffer_size())
            .finish()
    }
}

impl Connection {
    /// Wraps a freshly accepted stream. `read_buffer_capacity` must be at least 1024 per spec §3.
    pub fn new(stream: TcpStream, token: Token, read_buffer_capacity: usize) -> Self {
        Self {
            stream,
            token,
            read_buf: crate::buffer::Buffer::with_capacity(read_buffer_capacity.max(1024)),
            io: Rc::new(RefCell::new(ConnectionIo::default())),
            closed: false,
            data_handlers: EventRegistry::new(),
            data_cleared: false,
            error_handlers: EventRegistry::new(),
            drain_handlers: EventRegistry::new(),
            close_handlers: EventRegistry::new(),
        }
    }

    /// The slab token identifying this connection to its owning `Listener`.
    pub fn token(&self) -> Token {
        self.token
    }

    /// A handle to this connection's send queue, for objects (like `Response`) that need to
    /// enqueue writes without holding a `&mut Connection`.
    pub(crate) fn io_handle(&self) -> Rc<RefCell<ConnectionIo>> {
        self.io.clone()
    }

    /// Total bytes currently queued to be written. Callers use this as a backpressure signal
    /// (spec §4.3).
    pub fn buffer_size(&self) -> usize {
        self.io.borrow().buffer_size()
    }

    /// Registers a `data` handler, fired with each chunk of bytes read from the socket.
    pub fn on_data(&mut self, handler: impl FnMut(&mut Connection, &[u8]) + 'static) {
        self.data_handlers.on(Box::new(handler));
    }

    /// Empties the `data` handler registry. Used by the HTTP layer's upgrade path (spec §4.4):
    /// once a connection upgrades, its bytes no longer belong to the HTTP framing layer, so the
    /// parser-feeding handler installed at accept time must be removed before a replacement
    /// (raw passthrough to the `upgrade` handler) is installed in its place.
    pub fn clear_data_handlers(&mut self) {
        self.data_handlers.clear();
        self.data_cleared = true;
    }

    /// Registers an `error` handler, fired on any transport error.
    pub fn on_error(&mut self, handler: impl FnMut(&mut Connection, &io::Error) + 'static) {
        self.error_handlers.on(Box::new(handler));
    }

    /// Registers a `drain` handler, fired each time the send queue transitions from non-empty to
    /// empty.
    pub fn on_drain(&mut self, handler: impl FnMut(&mut Connection) + 'static) {
        self.drain_handlers.on(Box::new(handler));
    }

    /// Registers a `close` handler, fired exactly once, as the last event this connection emits.
    pub fn on_close(&mut self, handler: impl FnMut(&mut Connection, bool) + 'static) {
        self.close_handlers.on(Box::new(handler));
    }

    /// Enqueues `bytes` for writing, beginning a send if none is in flight. Errs if `end` has
    /// already been called on this connection.
    pub fn write(&mut self, bytes: Vec<u8>) -> Result<(), WriteAfterEndError> {
        self.io.borrow_mut().enqueue(bytes, false)
    }

    /// Enqueues `bytes` as the final chunk; once sent, the connection closes. Errs if `end` has
    /// already been called.
    pub fn end(&mut self, bytes: Vec<u8>) -> Result<(), WriteAfterEndError> {
        self.io.borrow_mut().enqueue(bytes, true)
    }

    /// True once `close` has fired (or is about to).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The `Interest` this connection currently needs registered: always readable, plus writable
    /// while bytes are queued (mirrors the teacher's `event_set`).
    pub(crate) fn interest(&self) -> Interest {
        if self.io.borrow().queue.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    pub(crate) fn register(&mut self, registry: &Registry) -> io::Result<()> {
        let interest = self.interest();
        registry.register(&mut self.stream, self.token, interest)
    }

    pub(crate) fn reregister(&mut self, registry: &Registry) -> io::Result<()> {
        let interest = self.interest();
        registry.reregister(&mut self.stream, self.token, interest)
    }

    pub(crate) fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        Source::deregister(&mut self.stream, registry)
    }

    /// Reads as much as is available without blocking, firing `data` for each chunk. At most one
    /// outstanding read is ever in flight: this is called only in response to a single
    /// readable-ready notification, and the next read only happens on the next notification.
    pub(crate) fn handle_readable(&mut self) {
        loop {
            match self.read_buf.fill_from(&mut self.stream) {
                Ok(0) => {
                    self.begin_close(false);
                    return;
                }
                Ok(_) => {
                    let chunk = self.read_buf.take_filled();
                    self.fire_data(&chunk);
                    if self.closed {
                        return;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.fire_error(&e);
                    self.begin_close(true);
                    return;
                }
            }
        }
    }

    /// Drives the send queue: writes the head of the queue, and on completion either closes (if
    /// the head was end-flagged) or pops it and continues / fires `drain`.
    pub(crate) fn handle_writable(&mut self) {
        loop {
            let head = self.io.borrow().queue.front().cloned();
            let Some((bytes, end)) = head else {
                break;
            };

            match self.stream.write(&bytes) {
                Ok(n) if n == bytes.len() => {
                    self.io.borrow_mut().queue.pop_front();
                    if end {
                        self.begin_close(false);
                        return;
                    }
                    if self.io.borrow().queue.is_empty() {
                        self.fire_drain();
                        break;
                    }
                }
                Ok(n) => {
                    let mut io = self.io.borrow_mut();
                    if let Some(front) = io.queue.front_mut() {
                        front.0.drain(0..n);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.fire_error(&e);
                    self.begin_close(true);
                    return;
                }
            }
        }
    }

    /// Forces this connection closed after a panic was caught unwinding out of one of its event
    /// handlers. Per spec §7, a handler panic is treated as if a transport error occurred:
    /// logged by the caller, and this connection closed rather than the reactor torn down.
    pub(crate) fn force_close_after_panic(&mut self) {
        self.begin_close(true);
    }

    fn begin_close(&mut self, had_error: bool) {
        if self.closed {
            return;
        }
        let _ = self.stream.flush();
        self.closed = true;
        self.fire_close(had_error);
    }

    fn fire_data(&mut self, bytes: &[u8]) {
        let mut handlers = std::mem::take(&mut self.data_handlers);
        handlers.for_each(|h| h(self, bytes));
        if self.data_cleared {
            // A handler replaced the whole registry mid-firing (the HTTP upgrade path); whatever
            // it installed is already sitting in `self.data_handlers`, and `handlers` is the stale
            // snapshot from before the clear, so it must not be folded back in.
            self.data_cleared = false;
        } else {
            handlers.append_from(std::mem::take(&mut self.data_handlers));
            self.data_handlers = handlers;
        }
    }

    fn fire_error(&mut self, err: &io::Error) {
        let mut handlers = std::mem::take(&mut self.error_handlers);
        handlers.for_each(|h| h(self, err));
        handlers.append_from(std::mem::take(&mut self.error_handlers));
        self.error_handlers = handlers;
    }

    fn fire_drain(&mut self) {
        let mut handlers = std::mem::take(&mut self.drain_handlers);
        handlers.for_each(|h| h(self));
        handlers.append_from(std::mem::take(&mut self.drain_handlers));
        self.drain_handlers = handlers;
    }

    fn fire_close(&mut self, had_error: bool) {
        let mut handlers = std::mem::take(&mut self.close_handlers);
        handlers.for_each(|h| h(self, had_error));
        handlers.append_from(std::mem::take(&mut self.close_handlers));
        self.close_handlers = handlers;
    }
}
