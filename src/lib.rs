//! A small event-driven TCP reactor with a streaming HTTP/1.x server core on top.
//!
//! The layering, bottom to top: [`reactor`] drives [`listener`]'s accept loop across a
//! thread-per-core pool of independent `mio` event loops; each accepted [`connection::Connection`]
//! exposes a Node-`net.Socket`-shaped `{data, error, drain, close}` event API; [`http::driver`]
//! feeds a connection's bytes through [`http::parser`] to build [`http::IncomingMessage`]/
//! [`http::Response`] pairs and dispatch them to user `request`/`upgrade` handlers via
//! [`server::Server`].

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod headers;
pub mod http;
pub mod listener;
pub mod reactor;
pub mod server;

pub use config::ServerConfig;
pub use connection::Connection;
pub use reactor::Reactor;
pub use server::{create_server, Server};
