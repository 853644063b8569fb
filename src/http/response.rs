//! `Response`: the outgoing half of one HTTP exchange.
//!
//! Grounded on `examples/ryanseipp-rask-old/src/parser/h1/response.rs` for the builder shape
//! (status line + header serialization) and on the `nodecxx` `Socket::write`/`end` pair
//! (`examples/original_source/net/net.hpp`) for the write/end semantics. Unlike the teacher's
//! `Response`, which only ever gets fully built then serialized once, this one streams: `write`
//! may be called any number of times before `end`, and headers are flushed lazily on first write,
//! per spec §4.5.

use std::cell::RefCell;
use std::rc::Rc;

use crate::connection::{ConnectionIo, WriteAfterEndError};
use crate::headers::HeaderMap;

use super::status::default_message;
use super::types::Version;

/// The outgoing response paired with one `IncomingMessage`. Recycled across requests on a
/// keep-alive connection via `reset`.
pub struct Response {
    /// The status code to send. Defaults to 200.
    pub status_code: u16,
    status_message: Option<String>,
    /// Response headers, serialized in insertion order after the fixed leading headers below.
    pub headers: HeaderMap,
    /// Whether to emit a `Date` header automatically. Defaults to `true`.
    pub send_date: bool,
    version: Version,
    send_close_header: bool,
    headers_sent: bool,
    /// Set once `end` has been called. Distinct from the connection's own end-of-stream: on a
    /// keep-alive connection the HTTP message ends here but the TCP connection stays open for the
    /// next pipelined request.
    message_ended: bool,
    io: Option<Rc<RefCell<ConnectionIo>>>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status_code", &self.status_code)
            .field("headers_sent", &self.headers_sent)
            .finish()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates a response with no connection attached yet; `bind` must be called before `write`
    /// or `end` will do anything.
    pub fn new() -> Self {
        Self {
            status_code: 200,
            status_message: None,
            headers: HeaderMap::new(),
            send_date: true,
            version: Version::HTTP_11,
            send_close_header: false,
            headers_sent: false,
            message_ended: false,
            io: None,
        }
    }

    /// Attaches this response to a connection's send queue and records the framing decisions
    /// (protocol version, whether the connection will close after this response) the driver made
    /// while parsing the paired request.
    pub(crate) fn bind(&mut self, io: Rc<RefCell<ConnectionIo>>, version: Version, keep_alive: bool) {
        self.io = Some(io);
        self.version = version;
        self.send_close_header = !keep_alive;
    }

    /// Resets all per-request state so this response can be reused for the next request on the
    /// same keep-alive connection. Does not touch the attached connection handle.
    pub fn reset(&mut self) {
        self.status_code = 200;
        self.status_message = None;
        self.headers.clear();
        self.send_date = true;
        self.send_close_header = false;
        self.headers_sent = false;
        self.message_ended = false;
    }

    /// Whether `end` has been called on this response yet.
    pub(crate) fn is_message_ended(&self) -> bool {
        self.message_ended
    }

    /// Overrides the default reason phrase for `status_code`.
    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    /// Sets a header, replacing any existing value(s) for the same name (case-insensitive).
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Returns the last value set for `name` (case-insensitive), per P7.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Removes a header set earlier. Has no effect on the fixed leading headers (`Date`,
    /// `Server`, `Connection`, `Content-Length`), which are controlled by the dedicated fields.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    /// Whether the header block has already been written to the wire.
    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Writes a chunk of the response body, sending the header block first if this is the first
    /// write. Returns an error if `end` was already called.
    pub fn write(&mut self, bytes: impl Into<Vec<u8>>) -> Result<(), WriteAfterEndError> {
        self.ensure_headers_sent(None)?;
        self.enqueue(bytes.into(), false)
    }

    /// Writes the final chunk of the response body (may be empty) and closes out the response.
    /// `Content-Length` is set to `bytes.len()` automatically if the caller never set it or
    /// `Transfer-Encoding` explicitly, per spec §4.5. Only tears down the underlying TCP
    /// connection if this response is not being kept alive — on a keep-alive connection, `end`
    /// finishes this HTTP message and leaves the connection open for the next pipelined request.
    pub fn end(&mut self, bytes: impl Into<Vec<u8>>) -> Result<(), WriteAfterEndError> {
        let bytes = bytes.into();
        if !self.headers_sent {
            self.ensure_headers_sent(Some(bytes.len()))?;
        }
        self.message_ended = true;
        let close = self.send_close_header;
        self.enqueue(bytes, close)
    }

    fn ensure_headers_sent(&mut self, content_length: Option<usize>) -> Result<(), WriteAfterEndError> {
        if self.headers_sent {
            return Ok(());
        }
        let head = self.prepare_send(content_length);
        self.headers_sent = true;
        self.enqueue(head, false)
    }

    fn enqueue(&mut self, bytes: Vec<u8>, end: bool) -> Result<(), WriteAfterEndError> {
        match &self.io {
            Some(io) => io.borrow_mut().enqueue(bytes, end),
            None => Ok(()),
        }
    }

    /// Serializes the status line and header block, in the exact order spec §4.5 mandates:
    /// status line, then `Date` (if `send_date`), then `Server` (unless the caller already set
    /// one), then `Connection: close` (if this connection won't be kept alive), then
    /// `Content-Length` (if known), then every user header in insertion order, then the
    /// terminating blank line.
    fn prepare_send(&self, content_length: Option<usize>) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);

        let message = self
            .status_message
            .as_deref()
            .unwrap_or_else(|| default_message(self.status_code));
        // Spec §4.5 item 1: echo the request's version verbatim unless it's major >= 2, in which
        // case this HTTP/1.x-only response line always reads HTTP/1.1.
        let version = if self.version.major < 2 {
            self.version
        } else {
            Version::HTTP_11
        };
        out.extend_from_slice(
            format!("{} {} {}\r\n", version, self.status_code, message).as_bytes(),
        );

        if self.send_date {
            out.extend_from_slice(b"Date: ");
            out.extend_from_slice(httpdate::fmt_http_date(std::time::SystemTime::now()).as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        if self.headers.get("Server").is_none() {
            out.extend_from_slice(b"Server: Nodecxx/0.1\r\n");
        }

        if self.send_close_header {
            out.extend_from_slice(b"Connection: close\r\n");
        }

        if let Some(len) = content_length {
            if self.headers.get("Content-Length").is_none()
                && self.headers.get("Transfer-Encoding").is_none()
            {
                out.extend_from_slice(format!("Content-Length: {len}\r\n").as_bytes());
            }
        }

        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"\r\n");
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::connection::ConnectionIo;

    fn bound(keep_alive: bool) -> (Response, Rc<RefCell<ConnectionIo>>) {
        let io = Rc::new(RefCell::new(ConnectionIo::default()));
        let mut res = Response::new();
        res.send_date = false;
        res.bind(io.clone(), Version::HTTP_11, keep_alive);
        (res, io)
    }

    #[test]
    fn default_status_is_200() {
        let res = Response::new();
        assert_eq!(200, res.status_code);
    }

    #[test]
    fn end_on_keep_alive_connection_does_not_end_the_io_queue() {
        let (mut res, io) = bound(true);
        res.end(b"ok".to_vec()).unwrap();
        assert!(res.is_message_ended());
        assert!(!io.borrow().is_ended(), "keep-alive must not close the TCP connection");
    }

    #[test]
    fn end_on_non_keep_alive_connection_ends_the_io_queue() {
        let (mut res, io) = bound(false);
        res.end(b"ok".to_vec()).unwrap();
        assert!(io.borrow().is_ended());
    }

    #[test]
    fn write_then_end_only_flushes_headers_once() {
        let (mut res, _io) = bound(true);
        res.write(b"a".to_vec()).unwrap();
        assert!(res.headers_sent());
        res.write(b"b".to_vec()).unwrap();
        res.end(b"c".to_vec()).unwrap();
    }

    #[test]
    fn end_after_end_is_rejected() {
        let (mut res, _io) = bound(false);
        res.end(Vec::new()).unwrap();
        let err = res.write(b"late".to_vec());
        assert!(err.is_err());
    }

    #[test]
    fn prepare_send_orders_fixed_headers_before_user_headers() {
        let mut res = Response::new();
        res.send_date = false;
        res.set_header("X-Custom", "1");
        let head = res.prepare_send(Some(5));
        let text = String::from_utf8(head).unwrap();
        let server_idx = text.find("Server:").unwrap();
        let length_idx = text.find("Content-Length:").unwrap();
        let custom_idx = text.find("X-Custom:").unwrap();
        assert!(server_idx < length_idx);
        assert!(length_idx < custom_idx);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn explicit_content_length_header_is_not_duplicated() {
        let mut res = Response::new();
        res.send_date = false;
        res.set_header("Content-Length", "42");
        let head = res.prepare_send(Some(5));
        let text = String::from_utf8(head).unwrap();
        assert_eq!(1, text.matches("Content-Length").count());
        assert!(text.contains("Content-Length: 42"));
    }

    #[test]
    fn unknown_status_code_falls_back_to_default_message() {
        let mut res = Response::new();
        res.send_date = false;
        res.status_code = 799;
        let head = res.prepare_send(None);
        let text = String::from_utf8(head).unwrap();
        assert!(text.starts_with("HTTP/1.1 799 Unknown\r\n"));
    }

    #[test]
    fn http_2_or_later_request_version_is_clamped_to_1_1_on_the_status_line() {
        let mut res = Response::new();
        res.send_date = false;
        res.version = Version { major: 2, minor: 0 };
        let head = res.prepare_send(None);
        let text = String::from_utf8(head).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn reset_clears_state_for_reuse_on_keep_alive() {
        let (mut res, io) = bound(true);
        res.set_header("X-A", "1");
        res.end(Vec::new()).unwrap();
        res.reset();
        assert!(!res.is_message_ended());
        assert!(!res.headers_sent());
        assert_eq!(200, res.status_code);
        assert_eq!(None, res.get_header("X-A"));
        let _ = io;
    }
}
