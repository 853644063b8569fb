//! End-to-end HTTP/1.x scenarios from spec.md §8 (2-5), driving a real `evhttp::Server` over
//! loopback TCP. See `tests/echo_socket.rs` for why the reactor thread is detached, not joined.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use evhttp::{create_server, Server, ServerConfig};

fn connect_with_timeout(addr: std::net::SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect failed");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

/// Reads from `stream` until `done` returns true of the accumulated bytes, or EOF. The response
/// head and body are enqueued as separate `Connection` writes (`Response::ensure_headers_sent`
/// then `Response::end`), so they can arrive as more than one TCP segment even on loopback; a
/// length- or pattern-based predicate avoids racing that.
fn read_until(stream: &mut TcpStream, done: impl Fn(&[u8]) -> bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    while !done(&out) {
        let n = stream.read(&mut chunk).expect("read failed");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    out
}

/// Scenario 2: a minimal HTTP/1.1 GET, handler calls `end("hi")`, connection stays open.
#[test]
fn minimal_http_11_get() {
    let mut server = create_server(|_req, res| {
        let _ = res.end(b"hi".to_vec());
    });
    server.listen("127.0.0.1", 0).unwrap();
    let addr = server.local_addrs().unwrap()[0];
    thread::spawn(move || {
        let _ = server.run();
    });

    let mut stream = connect_with_timeout(addr);
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let resp = read_until(&mut stream, |buf| buf.ends_with(b"hi"));
    let text = String::from_utf8(resp).unwrap();

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Server: Nodecxx/0.1\r\n"));
    assert!(text.contains("Content-Length: 2\r\n"));
    assert!(text.ends_with("\r\n\r\nhi"));
    assert!(!text.contains("Connection: close"));

    // The connection stays open: a second request on the same socket still gets a response.
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let resp2 = read_until(&mut stream, |buf| buf.ends_with(b"hi"));
    assert!(String::from_utf8(resp2).unwrap().starts_with("HTTP/1.1 200 OK\r\n"));
}

/// Scenario 3: two pipelined requests over one TCP connection are delivered to the `request`
/// handler in order, each with the right URL.
#[test]
fn keep_alive_sequence_preserves_request_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let mut server = create_server(move |req, res| {
        seen_cb.lock().unwrap().push(req.url.clone());
        let _ = res.end(Vec::new());
    });
    server.listen("127.0.0.1", 0).unwrap();
    let addr = server.local_addrs().unwrap()[0];
    thread::spawn(move || {
        let _ = server.run();
    });

    let mut stream = connect_with_timeout(addr);
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nGET /second HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    // Two status lines should eventually arrive; poll until both handlers have run.
    for _ in 0..200 {
        if seen.lock().unwrap().len() >= 2 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    let urls = seen.lock().unwrap().clone();
    assert_eq!(vec!["/".to_string(), "/second".to_string()], urls);
}

/// Scenario 4: `Connection: close` on the request produces a `Connection: close` response header
/// and the TCP socket closes once the body finishes.
#[test]
fn connection_close_header_closes_the_socket() {
    let mut server = create_server(|_req, res| {
        let _ = res.end(b"bye".to_vec());
    });
    server.listen("127.0.0.1", 0).unwrap();
    let addr = server.local_addrs().unwrap()[0];
    thread::spawn(move || {
        let _ = server.run();
    });

    let mut stream = connect_with_timeout(addr);
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();

    let mut resp = Vec::new();
    stream.read_to_end(&mut resp).unwrap();
    let text = String::from_utf8(resp).unwrap();

    assert!(text.contains("Connection: close\r\n"));
    assert!(text.ends_with("bye"));
}

/// Scenario 5: an `Upgrade` request with a registered `upgrade` handler hands the handler the
/// leftover bytes past the header block instead of dispatching a `request` event.
#[test]
fn upgrade_handler_receives_leftover_bytes() {
    let leftover: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
    let leftover_cb = leftover.clone();

    let mut server = Server::new(ServerConfig::with_worker_threads(
        NonZeroUsize::new(1).unwrap(),
    ));
    server.on_request(|_req, res| {
        let _ = res.end(Vec::new());
    });
    server.on_upgrade(move |_req, _res, bytes| {
        *leftover_cb.lock().unwrap() = Some(bytes.to_vec());
    });
    server.listen("127.0.0.1", 0).unwrap();
    let addr = server.local_addrs().unwrap()[0];
    thread::spawn(move || {
        let _ = server.run();
    });

    let mut stream = connect_with_timeout(addr);
    stream
        .write_all(
            b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\nPAYLOAD",
        )
        .unwrap();

    for _ in 0..200 {
        if leftover.lock().unwrap().is_some() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(Some(b"PAYLOAD".to_vec()), leftover.lock().unwrap().clone());
}

/// Scenario 5b: bytes belonging to the upgraded protocol that arrive in a *second* TCP read (after
/// the header block and its trailing leftover already triggered the `upgrade` handler once) must
/// still reach the `upgrade` handler, not be silently dropped by the HTTP framing layer.
#[test]
fn upgrade_handler_receives_bytes_from_a_later_read_too() {
    let chunks: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let chunks_cb = chunks.clone();

    let mut server = Server::new(ServerConfig::with_worker_threads(
        NonZeroUsize::new(1).unwrap(),
    ));
    server.on_request(|_req, res| {
        let _ = res.end(Vec::new());
    });
    server.on_upgrade(move |_req, _res, bytes| {
        if !bytes.is_empty() {
            chunks_cb.lock().unwrap().push(bytes.to_vec());
        }
    });
    server.listen("127.0.0.1", 0).unwrap();
    let addr = server.local_addrs().unwrap()[0];
    thread::spawn(move || {
        let _ = server.run();
    });

    let mut stream = connect_with_timeout(addr);
    stream
        .write_all(b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\nFIRST")
        .unwrap();
    for _ in 0..200 {
        if !chunks.lock().unwrap().is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    // A second read, well after the handshake: must reach the same handler, raw, not be dropped.
    stream.write_all(b"SECOND").unwrap();
    for _ in 0..200 {
        if chunks.lock().unwrap().len() >= 2 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    let seen = chunks.lock().unwrap().clone();
    assert_eq!(vec![b"FIRST".to_vec(), b"SECOND".to_vec()], seen);
}

/// Scenario 2b (spec §4.4 dispatch timing): `message.on_data` registered inside the `request`
/// handler — which now runs at headers-complete — must see body bytes that arrive afterward,
/// confirming the handler is installed before the parser starts firing `on_body`.
#[test]
fn request_handler_can_register_on_data_before_body_arrives() {
    let body: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let body_cb = body.clone();

    let mut server = create_server(move |req, res| {
        let body_cb = body_cb.clone();
        req.on_data(move |_msg, chunk| {
            body_cb.lock().unwrap().extend_from_slice(chunk);
        });
        let _ = res.end(Vec::new());
    });
    server.listen("127.0.0.1", 0).unwrap();
    let addr = server.local_addrs().unwrap()[0];
    thread::spawn(move || {
        let _ = server.run();
    });

    let mut stream = connect_with_timeout(addr);
    stream
        .write_all(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello")
        .unwrap();
    let _ = read_until(&mut stream, |buf| buf.ends_with(b"\r\n\r\n"));

    for _ in 0..200 {
        if body.lock().unwrap().len() >= 5 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(b"hello".to_vec(), body.lock().unwrap().clone());
}

/// Without an `upgrade` handler registered, the spec requires the socket to close.
#[test]
fn upgrade_without_a_handler_closes_the_socket() {
    let mut server = create_server(|_req, res| {
        let _ = res.end(Vec::new());
    });
    server.listen("127.0.0.1", 0).unwrap();
    let addr = server.local_addrs().unwrap()[0];
    thread::spawn(move || {
        let _ = server.run();
    });

    let mut stream = connect_with_timeout(addr);
    stream
        .write_all(
            b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
        )
        .unwrap();

    let mut resp = Vec::new();
    stream.read_to_end(&mut resp).unwrap();
    assert!(resp.is_empty(), "expected the socket to close with no upgrade handler registered");
}
