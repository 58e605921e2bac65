//! Minimal HTTP/1.1 server for year probing tests.
//!
//! Answers `/<year>/` with 200 for the configured years and 404 otherwise.
//! With `head_allowed` false every HEAD gets 405, forcing the GET fallback.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Default)]
pub struct RequestLog {
    pub heads: AtomicUsize,
    pub gets: AtomicUsize,
}

/// Starts a server in a background thread. Returns the URL template
/// (e.g. "http://127.0.0.1:12345/{year}/") and the request counters.
pub fn start(years: &[i32], head_allowed: bool) -> (String, Arc<RequestLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let years: Arc<HashSet<i32>> = Arc::new(years.iter().copied().collect());
    let log = Arc::new(RequestLog::default());

    let server_log = Arc::clone(&log);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let years = Arc::clone(&years);
            let log = Arc::clone(&server_log);
            thread::spawn(move || handle(stream, &years, head_allowed, &log));
        }
    });

    (format!("http://127.0.0.1:{}/{{year}}/", port), log)
}

fn handle(
    mut stream: std::net::TcpStream,
    years: &HashSet<i32>,
    head_allowed: bool,
    log: &RequestLog,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let mut parts = request.lines().next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let is_head = method.eq_ignore_ascii_case("HEAD");
    if is_head {
        log.heads.fetch_add(1, Ordering::SeqCst);
    } else {
        log.gets.fetch_add(1, Ordering::SeqCst);
    }

    let year: Option<i32> = path.trim_matches('/').parse().ok();
    let body = "<html><body>rankings</body></html>";
    let status = if is_head && !head_allowed {
        "405 Method Not Allowed"
    } else if year.map(|y| years.contains(&y)).unwrap_or(false) {
        "200 OK"
    } else {
        "404 Not Found"
    };

    let response = if is_head {
        format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        )
    } else {
        format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    };
    let _ = stream.write_all(response.as_bytes());
}
