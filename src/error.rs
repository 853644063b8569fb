//! The crate's error taxonomy.
//!
//! The teacher writes a single hand-rolled `ParseError` (`examples/ryanseipp-rask-old/src/parser/mod.rs`)
//! with a manual `Display` and `std::error::Error` impl. This crate keeps that shape for
//! [`crate::http::ParseError`] (grounded directly on the teacher) but expresses the *layered*
//! errors — the ones that wrap a lower error, like a socket failure wrapping `std::io::Error` —
//! with `thiserror`, following the pattern contributed by the other repos in the retrieval pack
//! that reach for it for exactly this case.

use std::net::AddrParseError;

use mio::Token;

/// Failure binding or accepting on a listening socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying socket operation failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    /// A handler invocation panicked; the connection identified by `token` was closed as a
    /// result. See §7's documented policy: isolate the panic, don't tear down the worker.
    #[error("handler panicked on connection {token:?}")]
    HandlerPanic {
        /// The connection whose handler panicked.
        token: Token,
    },
}

/// Failure resolving a host/port pair to socket addresses.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// `ToSocketAddrs` resolution itself failed.
    #[error("could not resolve address: {0}")]
    Io(#[from] std::io::Error),
    /// The host string was not a valid address or hostname.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddrParseError),
    /// Resolution succeeded but produced no usable addresses.
    #[error("address resolved to no usable socket addresses")]
    NoAddresses,
}
