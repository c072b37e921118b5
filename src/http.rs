//! Per-connection request/response state machine, SPEC_FULL.md §4.6
//! and §4.7. Expressed as an explicit enum so a response can't be
//! written before dispatch and a connection can't be driven twice
//! past `Closed` -- the typestate flavour `tracing` spans below track.

use std::io::{IoSlice, Write};
use std::time::{Duration, Instant};

use atophttpd_conn::Connection;
use atophttpd_output::OutputSink;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use tracing::{debug, info, warn};

use crate::context::AtopHttpd;

const MAX_HEADER_BYTES: usize = 4096;
const MAX_PATH_BYTES: usize = 1024;
const HEADER_DEADLINE: Duration = Duration::from_millis(100);

pub enum ConnState {
    Accepted {
        conn: Box<dyn Connection>,
    },
    HeaderReading {
        conn: Box<dyn Connection>,
        buf: Vec<u8>,
        deadline: Instant,
    },
    Dispatching {
        conn: Box<dyn Connection>,
        request: Request,
    },
    Responding {
        conn: Box<dyn Connection>,
        body: Vec<u8>,
    },
    Closed,
}

pub struct Request {
    pub path: String,
    pub query: String,
}

/// Drives one accepted connection through `Accepted -> ... -> Closed`,
/// serving exactly one request (SPEC_FULL.md §5: no keep-alive, no
/// pipelining).
pub fn drive(ctx: &mut AtopHttpd, conn: Box<dyn Connection>) {
    let peer = conn.peer_addr();
    let span = tracing::info_span!("connection", peer = %peer);
    let _enter = span.enter();

    let mut state = ConnState::Accepted { conn };
    loop {
        state = match state {
            ConnState::Accepted { conn } => accept_to_reading(conn),
            ConnState::HeaderReading { conn, buf, deadline } => {
                read_header(conn, buf, deadline)
            }
            ConnState::Dispatching { conn, request } => dispatch(ctx, conn, request),
            ConnState::Responding { mut conn, body } => {
                if let Err(e) = write_response(conn.as_mut(), &body) {
                    warn!(error = %e, "failed to write response");
                }
                let _ = conn.shutdown();
                let _ = conn.close();
                ConnState::Closed
            }
            ConnState::Closed => break,
        };
    }
}

fn accept_to_reading(mut conn: Box<dyn Connection>) -> ConnState {
    if let Err(e) = conn.set_nonblocking(true) {
        warn!(error = %e, "failed to switch connection to non-blocking");
        return ConnState::Closed;
    }
    ConnState::HeaderReading {
        conn,
        buf: Vec::with_capacity(MAX_HEADER_BYTES),
        deadline: Instant::now() + HEADER_DEADLINE,
    }
}

fn read_header(mut conn: Box<dyn Connection>, mut buf: Vec<u8>, deadline: Instant) -> ConnState {
    loop {
        if contains_terminator(&buf) {
            return match parse_request(&buf) {
                Some(request) => ConnState::Dispatching { conn, request },
                None => ConnState::Closed,
            };
        }

        if buf.len() >= MAX_HEADER_BYTES {
            debug!("request header exceeded 4096 bytes without terminator");
            return ConnState::Closed;
        }

        if Instant::now() >= deadline {
            debug!("header read deadline exceeded");
            return ConnState::Closed;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if !poll_readable(conn.raw_fd(), remaining) {
            continue; // timed out on this poll, loop re-checks the deadline
        }

        let mut chunk = [0u8; 512];
        match conn.read(&mut chunk) {
            Ok(0) => return ConnState::Closed,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(atophttpd_conn::ConnError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                continue;
            }
            Err(e) => {
                debug!(error = %e, "read error while reading header");
                return ConnState::Closed;
            }
        }
    }
}

/// Waits up to `timeout` for `fd` to become readable, matching the
/// source's `poll`-with-deadline request reader (SPEC_FULL.md §4.6,
/// §5). Returns `false` on timeout or poll error; the caller re-checks
/// the overall deadline on every iteration.
fn poll_readable(fd: std::os::unix::io::RawFd, timeout: Duration) -> bool {
    use nix::poll::{poll, PollFd, PollFlags};
    use std::os::fd::BorrowedFd;

    let borrowed: BorrowedFd = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut fds = [PollFd::new(&borrowed, PollFlags::POLLIN)];
    let timeout_ms: i32 = timeout.as_millis().min(i32::MAX as u128) as i32;
    match poll(&mut fds, timeout_ms) {
        Ok(n) if n > 0 => fds[0]
            .revents()
            .is_some_and(|r| r.contains(PollFlags::POLLIN)),
        _ => false,
    }
}

fn contains_terminator(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Parses `GET <path>[?<query>] HTTP/1.1\r\n...`. Only `GET` and only
/// `HTTP/1.1` are accepted; the path (before `?`) must fit in 1024
/// bytes.
fn parse_request(buf: &[u8]) -> Option<Request> {
    let text = std::str::from_utf8(buf).ok()?;
    let line = text.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;

    if method != "GET" || version != "HTTP/1.1" {
        return None;
    }

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };

    if path.len() > MAX_PATH_BYTES {
        return None;
    }

    Some(Request {
        path: path.trim_start_matches('/').to_string(),
        query: query.to_string(),
    })
}

/// Finds `name=` in `query` and returns the substring up to the next
/// `&` or end of string (SPEC_FULL.md §4.6: "by substring needle").
/// `%2C` is decoded to `,` for the `lables` argument only, matching
/// the source's targeted, non-general percent-decoding.
fn query_param(query: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=");
    let start = query.find(&needle)? + needle.len();
    let rest = &query[start..];
    let end = rest.find('&').unwrap_or(rest.len());
    let raw = &rest[..end];
    if name == "lables" {
        Some(raw.replace("%2C", ","))
    } else {
        Some(raw.to_string())
    }
}

fn dispatch(ctx: &mut AtopHttpd, conn: Box<dyn Connection>, request: Request) -> ConnState {
    info!(path = %request.path, "dispatching request");

    let (content_type, body) = match request.path.as_str() {
        "" | "index.html" => ("text/html", atophttpd_assets::index_html().into_owned()),
        "ping" => ("text/plain", b"pong\r\n".to_vec()),
        "favicon.ico" => ("image/x-icon", atophttpd_assets::favicon().into_owned()),
        "help" => ("text/html", atophttpd_assets::help_html().into_owned()),
        "showsamp" => return dispatch_showsamp(ctx, conn, &request.query),
        "js/atop.js" | "js/atop_parse.js" | "js/atop_compare_fc.js" => {
            match atophttpd_assets::lookup(&request.path) {
                Some((bytes, _)) => ("application/javascript", bytes.into_owned()),
                None => return not_found(conn),
            }
        }
        "css/atop.css" => match atophttpd_assets::lookup(&request.path) {
            Some((bytes, _)) => ("text/css", bytes.into_owned()),
            None => return not_found(conn),
        },
        "template_header" => ("text/html", atophttpd_assets::template_header().into_owned()),
        _ if request.path.starts_with("template") => {
            let kind = query_param(&request.query, "type").unwrap_or_default();
            match atophttpd_assets::template(&kind) {
                Some(bytes) => ("text/html", bytes.into_owned()),
                None => return not_found(conn),
            }
        }
        _ => return not_found(conn),
    };

    maybe_refresh_index(ctx);

    let response = build_ok_response(content_type, &body, false);
    ConnState::Responding {
        conn,
        body: response,
    }
}

fn dispatch_showsamp(ctx: &mut AtopHttpd, conn: Box<dyn Connection>, query: &str) -> ConnState {
    let result = (|| -> Result<Vec<u8>, String> {
        let ts: i64 = query_param(query, "timestamp")
            .ok_or_else(|| "missing timestamp".to_string())?
            .parse()
            .map_err(|_| "missing timestamp".to_string())?;

        let labels = query_param(query, "lables").ok_or_else(|| "missing labels".to_string())?;

        let encoding = query_param(query, "encoding").unwrap_or_else(|| "deflate".to_string());
        if encoding != "none" && encoding != "deflate" {
            return Err("unknown encoding".to_string());
        }

        let record = ctx
            .engine
            .get_record(ts)
            .map_err(|_| "missing sample".to_string())?;

        let mut sink = OutputSink::buffer();
        atophttpd_json::emit(&mut sink, &record, &labels, ctx.hide_cmdline, &ctx.hostname)
            .map_err(|e| e.to_string())?;

        Ok(sink.as_bytes().to_vec())
    })();

    maybe_refresh_index(ctx);

    // Error bodies (bad arguments, unknown encoding, missing sample,
    // unsupported label) always go out uncompressed, matching the
    // source's use of `http_content_type_none` for every error path in
    // `httpd.c`; only a successful JSON payload honours `encoding=`.
    let (body, deflate) = match result {
        Ok(json) => {
            let deflate =
                query_param(query, "encoding").unwrap_or_else(|| "deflate".to_string()) == "deflate";
            (json, deflate)
        }
        Err(msg) => (format!("{msg}\r\n").into_bytes(), false),
    };

    let response = match build_showsamp_response(&body, deflate) {
        Some(r) => r,
        None => return not_found(conn),
    };

    ConnState::Responding {
        conn,
        body: response,
    }
}

fn maybe_refresh_index(ctx: &mut AtopHttpd) {
    const REFRESH_INTERVAL: Duration = Duration::from_secs(3);
    if ctx.last_scan.elapsed() >= REFRESH_INTERVAL {
        if let Err(e) = ctx.engine.parse_all() {
            warn!(error = %e, "periodic index refresh failed");
        }
        ctx.last_scan = Instant::now();
    }
}

fn not_found(mut conn: Box<dyn Connection>) -> ConnState {
    let _ = conn.write(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
    let _ = conn.shutdown();
    let _ = conn.close();
    ConnState::Closed
}

fn build_ok_response(content_type: &str, body: &[u8], deflate: bool) -> Vec<u8> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nServer: atop\r\n{}Content-Type: {content_type}; charset=utf-8\r\nContent-Length: {}\r\n\r\n",
        if deflate { "Content-Encoding: deflate\r\n" } else { "" },
        body.len(),
    );
    let mut out = header.into_bytes();
    out.extend_from_slice(body);
    out
}

/// `encoding=deflate` (the default) compresses the body, falling back
/// to `404` if compression itself fails (SPEC_FULL.md §7).
fn build_showsamp_response(body: &[u8], deflate: bool) -> Option<Vec<u8>> {
    if !deflate {
        return Some(build_ok_response("text/html", body, false));
    }

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(body).is_err() {
        return None;
    }
    let compressed = encoder.finish().ok()?;
    Some(build_ok_response("text/html", &compressed, true))
}

/// Switches the socket to blocking mode with a conceptual 5-second
/// send timeout and writes the header+body as a single `writev`
/// (SPEC_FULL.md §5 "suspension points").
fn write_response(conn: &mut dyn Connection, body: &[u8]) -> atophttpd_conn::Result<()> {
    conn.set_nonblocking(false)?;
    let iov = [IoSlice::new(body)];
    conn.writev(&iov)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_query_string() {
        let req = parse_request(b"GET /showsamp?timestamp=100&lables=CPU HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(req.path, "showsamp");
        assert_eq!(req.query, "timestamp=100&lables=CPU");
    }

    #[test]
    fn rejects_non_get_method() {
        assert!(parse_request(b"POST / HTTP/1.1\r\n\r\n").is_none());
    }

    #[test]
    fn rejects_non_http11_version() {
        assert!(parse_request(b"GET / HTTP/1.0\r\n\r\n").is_none());
    }

    #[test]
    fn query_param_stops_at_ampersand() {
        assert_eq!(
            query_param("timestamp=100&lables=CPU,MEM", "timestamp"),
            Some("100".to_string())
        );
        assert_eq!(
            query_param("timestamp=100&lables=CPU,MEM", "lables"),
            Some("CPU,MEM".to_string())
        );
    }

    #[test]
    fn lables_percent_decodes_comma_only() {
        assert_eq!(
            query_param("lables=CPU%2CMEM", "lables"),
            Some("CPU,MEM".to_string())
        );
    }

    #[test]
    fn missing_param_is_none() {
        assert_eq!(query_param("foo=bar", "timestamp"), None);
    }

    #[test]
    fn contains_terminator_detects_blank_line() {
        assert!(contains_terminator(b"GET / HTTP/1.1\r\n\r\n"));
        assert!(!contains_terminator(b"GET / HTTP/1.1\r\n"));
    }
}
