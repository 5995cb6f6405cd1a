//! Minimal HTTP query API over the publisher.
//!
//! Uses `std::net::TcpListener`; one request per connection.
//! Endpoints:
//!
//! - `GET /` — every known series with its query locator (JSON)
//! - `GET /series?q=<name>&q=<name>...` — retained points of the named
//!   series (JSON object keyed by name; unknown names are omitted)
//!
//! Every request is counted and its handling time recorded through the
//! pipeline itself.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use pulse::{Counter, PublisherClient, Recorder};

/// Request handler state shared by all connections.
pub struct Api {
    client: PublisherClient,
    requests: Counter,
    latency: Recorder,
}

impl Api {
    /// Creates the API over `client`, instrumented with `requests` and
    /// `latency` (milliseconds).
    pub fn new(client: PublisherClient, requests: Counter, latency: Recorder) -> Self {
        Self {
            client,
            requests,
            latency,
        }
    }

    /// Serves connections until the listener fails (blocking).
    pub fn serve(&self, listener: &TcpListener) {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("accept error: {e}");
                    continue;
                }
            };
            self.handle_connection(&stream);
        }
    }

    /// Reads one request from `stream` and writes the response.
    pub fn handle_connection(&self, stream: &TcpStream) {
        let started = Instant::now();
        self.requests.inc();

        // Set a short read timeout so we don't block forever on slow clients
        let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
        if let Err(e) = self.handle_request(stream) {
            tracing::debug!("request error: {e}");
        }

        self.latency.observe(started.elapsed().as_secs_f64() * 1000.0);
    }

    fn handle_request(&self, stream: &TcpStream) -> Result<(), Box<dyn std::error::Error>> {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;

        // Parse: "GET /path?query HTTP/1.x"
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            return send_response(stream, 400, r#"{"error":"bad request"}"#);
        }
        if parts[0] != "GET" {
            return send_response(stream, 405, r#"{"error":"method not allowed"}"#);
        }

        // Drain remaining headers (we don't need them)
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
                break;
            }
        }

        let (status, body) = self.route(parts[1]);
        send_response(stream, status, &body)
    }

    /// Maps a request target to a status code and JSON body.
    fn route(&self, target: &str) -> (u16, String) {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        let result = match path {
            "/" => self.client.series().map(|series| serde_json::to_string(&series)),
            "/series" => {
                let names: Vec<String> = parse_query(query)
                    .into_iter()
                    .filter(|(key, _)| key == "q")
                    .map(|(_, value)| value)
                    .collect();
                self.client.select(&names).map(|selected| serde_json::to_string(&selected))
            }
            _ => return (404, r#"{"error":"not found"}"#.to_string()),
        };

        match result {
            Ok(Ok(body)) => (200, body),
            Ok(Err(e)) => (500, serde_json::json!({ "error": e.to_string() }).to_string()),
            Err(e) => (503, serde_json::json!({ "error": e.to_string() }).to_string()),
        }
    }
}

/// Sends an HTTP response with a JSON body.
fn send_response(mut stream: &TcpStream, status: u16, body: &str) -> Result<(), Box<dyn std::error::Error>> {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };

    write!(
        stream,
        "HTTP/1.1 {status} {status_text}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
    )?;

    Ok(())
}

/// Parses a query string into key-value pairs, keeping repeated keys.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect()
}

/// Decodes `%XX` escapes and `+` as space. Malformed escapes are kept as-is.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => match s.get(i + 1..i + 3).filter(|hex| hex.bytes().all(|h| h.is_ascii_hexdigit())) {
                Some(hex) => {
                    out.push(u8::from_str_radix(hex, 16).unwrap_or(b'?'));
                    i += 2;
                }
                None => out.push(b'%'),
            },
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
