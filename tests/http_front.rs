//! End-to-end scenarios from SPEC_FULL.md §8, driving the HTTP front
//! over a real loopback TCP connection (no process spawn): a client
//! thread writes a raw request and reads the response while the test
//! thread runs `atophttpd::http::drive` on the accepted connection,
//! matching the teacher's placement of integration tests in a
//! top-level `tests/` directory with `tempfile`-built fixtures.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::Duration;

use atophttpd::{http, AtopHttpd};
use atophttpd_conn::{ConnectionType, TcpConnType};
use atophttpd_rawlog::testutil::write_fixture_log;
use tempfile::tempdir;

// Each test binds its own loopback port; a monotonically increasing
// counter avoids cross-test collisions without needing a real
// ephemeral-port lookup.
static NEXT_PORT: AtomicU16 = AtomicU16::new(18970);

fn next_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// Starts a listener, spawns `request` on a client thread, accepts
/// exactly one connection and drives it, then returns what the client
/// read back.
fn serve_one(ctx: &mut AtopHttpd, request: &'static [u8]) -> Vec<u8> {
    let port = next_port();
    let tcp = TcpConnType;
    let fd = tcp.conn_create().unwrap();
    tcp.listen(fd, "127.0.0.1", port).unwrap();

    let client = thread::spawn(move || {
        // Give the server a moment to reach accept().
        thread::sleep(Duration::from_millis(50));
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.write_all(request).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut out = Vec::new();
        let _ = stream.read_to_end(&mut out);
        out
    });

    let conn = tcp.accept(fd).unwrap();
    http::drive(ctx, conn);

    client.join().unwrap()
}

#[test]
fn scenario_1_missing_sample_on_empty_directory() {
    let dir = tempdir().unwrap();
    let mut ctx = AtopHttpd::new(dir.path(), false);
    ctx.engine.parse_all().unwrap();

    let resp = serve_one(
        &mut ctx,
        b"GET /showsamp?timestamp=1000&lables=CPU HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    let text = String::from_utf8_lossy(&resp);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.ends_with("missing sample\r\n"));
}

#[test]
fn scenario_2_sample_has_expected_top_level_keys() {
    let dir = tempdir().unwrap();
    write_fixture_log(&dir.path().join("atop_fixture"), &[100, 101, 102]);

    let mut ctx = AtopHttpd::new(dir.path(), false);
    ctx.engine.parse_all().unwrap();

    let resp = serve_one(
        &mut ctx,
        b"GET /showsamp?timestamp=101&lables=CPU,MEM&encoding=none HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    let text = String::from_utf8_lossy(&resp);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(!text.contains("Content-Encoding"));

    let body_start = text.find("\r\n\r\n").unwrap() + 4;
    let body = &text[body_start..];
    let value: serde_json::Value = serde_json::from_str(body.trim()).unwrap();
    assert_eq!(value["timestamp"], 101);
    assert!(value.get("host").is_some());
    assert!(value.get("elapsed").is_some());
    assert!(value.get("CPU").is_some());
    assert!(value.get("MEM").is_some());
}

#[test]
fn scenario_3_unknown_label_reports_error_body() {
    let dir = tempdir().unwrap();
    write_fixture_log(&dir.path().join("atop_fixture"), &[100, 101, 102]);

    let mut ctx = AtopHttpd::new(dir.path(), false);
    ctx.engine.parse_all().unwrap();

    let resp = serve_one(
        &mut ctx,
        b"GET /showsamp?timestamp=101&lables=FOO HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    let text = String::from_utf8_lossy(&resp);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("json lables not supported: FOO"));
}

#[test]
fn scenario_4_ping_returns_pong() {
    let dir = tempdir().unwrap();
    let mut ctx = AtopHttpd::new(dir.path(), false);
    ctx.engine.parse_all().unwrap();

    let resp = serve_one(&mut ctx, b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n");
    let text = String::from_utf8_lossy(&resp);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.ends_with("pong\r\n"));
}

#[test]
fn scenario_5_unknown_route_is_404() {
    let dir = tempdir().unwrap();
    let mut ctx = AtopHttpd::new(dir.path(), false);
    ctx.engine.parse_all().unwrap();

    let resp = serve_one(&mut ctx, b"GET /nonexistent HTTP/1.1\r\nHost: x\r\n\r\n");
    let text = String::from_utf8_lossy(&resp);
    assert!(text.starts_with("HTTP/1.1 404 Not Found"));
}
