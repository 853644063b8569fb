//! Bare byte-stream echo server: no HTTP layer, just `Connection::on_data` writing back whatever
//! it reads, and `"close\r\n"` triggering a graceful `end`. Mirrors spec.md §8 scenario 1.

use std::num::NonZeroUsize;

use evhttp::listener::Listener;
use evhttp::reactor::Reactor;
use evhttp::{Connection, ServerConfig};
use tracing_subscriber::EnvFilter;

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::with_worker_threads(NonZeroUsize::new(1).unwrap());
    let mut listener = Listener::new(config);
    listener.on_connection(|conn: &mut Connection| {
        tracing::info!(token = ?conn.token(), "accepted connection");
        conn.on_data(|conn, bytes| {
            if bytes.starts_with(b"close") {
                let _ = conn.end(bytes.to_vec());
            } else {
                let _ = conn.write(bytes.to_vec());
            }
        });
        conn.on_close(|conn, had_error| {
            tracing::info!(token = ?conn.token(), had_error, "connection closed");
        });
    });

    listener.listen("127.0.0.1", 7878).expect("bind failed");
    tracing::info!("echo server listening on 127.0.0.1:7878");

    Reactor::run(listener).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}
