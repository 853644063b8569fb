//! Minimal HTTP/1.x server: responds `hi` to every request. Mirrors spec.md §8 scenario 2.

use evhttp::create_server;
use tracing_subscriber::EnvFilter;

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut server = create_server(|req, res| {
        tracing::debug!(method = %req.method.map(|m| m.to_string()).unwrap_or_default(), url = %req.url, "request");
        let _ = res.end(b"hi".to_vec());
    });

    server.listen("127.0.0.1", 8080).expect("bind failed");
    tracing::info!(addrs = ?server.local_addrs()?, "listening");

    server.run().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}
