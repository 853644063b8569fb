//! `IncomingMessage`: a parsed HTTP request associated with a `Connection`.

use crate::events::Registry;
use crate::headers::HeaderMap;

use super::types::{Method, Version};
use super::ParseError;

type DataHandler = dyn FnMut(&mut IncomingMessage, &[u8]);
type ErrorHandler = dyn FnMut(&mut IncomingMessage, &ParseError);
type CloseHandler = dyn FnMut(&mut IncomingMessage);

/// One per HTTP request on a `Connection`. Reset and reused for each subsequent request on a
/// keep-alive connection; destroyed when the underlying `Connection` fires `close`.
pub struct IncomingMessage {
    /// The request target, exactly as it appeared on the wire (origin-form, typically).
    pub url: String,
    /// The request method.
    pub method: Option<Method>,
    /// Request headers: case-preserving names, duplicates allowed, insertion order preserved.
    pub headers: HeaderMap,
    /// HTTP version as sent by the client.
    pub version: Version,
    /// Whether this connection should remain open for another request after this one completes.
    pub keep_alive: bool,

    data_handlers: Registry<DataHandler>,
    error_handlers: Registry<ErrorHandler>,
    close_handlers: Registry<CloseHandler>,
}

impl std::fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("version", &self.version)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

impl Default for IncomingMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl IncomingMessage {
    /// Creates a message with no request parsed into it yet.
    pub fn new() -> Self {
        Self {
            url: String::new(),
            method: None,
            headers: HeaderMap::new(),
            version: Version::HTTP_11,
            keep_alive: true,
            data_handlers: Registry::new(),
            error_handlers: Registry::new(),
            close_handlers: Registry::new(),
        }
    }

    /// Resets all per-request fields and handler registries so this message can be reused for the
    /// next request on the same keep-alive connection.
    pub fn reset(&mut self) {
        self.url.clear();
        self.method = None;
        self.headers.clear();
        self.version = Version::HTTP_11;
        self.keep_alive = true;
        self.data_handlers.clear();
        self.error_handlers.clear();
        self.close_handlers.clear();
    }

    /// Registers a `data` handler, fired with each chunk of body bytes.
    pub fn on_data(&mut self, handler: impl FnMut(&mut IncomingMessage, &[u8]) + 'static) {
        self.data_handlers.on(Box::new(handler));
    }

    /// Registers an `error` handler, fired on malformed input.
    pub fn on_error(&mut self, handler: impl FnMut(&mut IncomingMessage, &ParseError) + 'static) {
        self.error_handlers.on(Box::new(handler));
    }

    /// Registers a `close` handler, fired once the underlying connection closes.
    pub fn on_close(&mut self, handler: impl FnMut(&mut IncomingMessage) + 'static) {
        self.close_handlers.on(Box::new(handler));
    }

    pub(crate) fn fire_data(&mut self, bytes: &[u8]) {
        let mut handlers = std::mem::take(&mut self.data_handlers);
        handlers.for_each(|h| h(self, bytes));
        handlers.append_from(std::mem::take(&mut self.data_handlers));
        self.data_handlers = handlers;
    }

    pub(crate) fn fire_error(&mut self, err: &ParseError) {
        let mut handlers = std::mem::take(&mut self.error_handlers);
        handlers.for_each(|h| h(self, err));
        handlers.append_from(std::mem::take(&mut self.error_handlers));
        self.error_handlers = handlers;
    }

    pub(crate) fn fire_close(&mut self) {
        let mut handlers = std::mem::take(&mut self.close_handlers);
        handlers.for_each(|h| h(self));
        handlers.append_from(std::mem::take(&mut self.close_handlers));
        self.close_handlers = handlers;
    }
}
