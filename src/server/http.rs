//! Minimal HTTP/1.1 primitives: request-head parsing, fixed-length responses and chunked bodies.
//!
//! Only what the streaming endpoints need. Every response is sent with `Connection: close`.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};

/// Longest request line or header line accepted.
const MAX_LINE: usize = 8 * 1024;
const MAX_HEADERS: usize = 100;

/// A parsed request head. Bodies are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Raw (still percent-encoded) query string.
    pub query: String,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Decoded query pairs. A repeated key keeps its last value.
    pub fn query_params(&self) -> HashMap<String, String> {
        parse_query(&self.query)
    }
}

/// Read a request head from `stream`.
///
/// Returns `Ok(None)` when the peer closed the connection before sending anything.
pub fn parse_request<R: Read>(stream: R) -> io::Result<Option<HttpRequest>> {
    let mut reader = BufReader::new(stream);

    let Some(request_line) = read_line(&mut reader)? else {
        return Ok(None);
    };
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(invalid("malformed request line"));
    };
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, q),
        None => (target, ""),
    };

    let mut headers = HashMap::new();
    loop {
        let line = read_line(&mut reader)?.ok_or_else(|| invalid("unexpected end of headers"))?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(invalid("too many headers"));
        }
        if let Some((key, val)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), val.trim().to_string());
        }
    }

    Ok(Some(HttpRequest {
        method: method.to_string(),
        path: percent_decode(path, false),
        query: query.to_string(),
        headers,
    }))
}

fn read_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader
        .by_ref()
        .take(MAX_LINE as u64 + 1)
        .read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    if n > MAX_LINE {
        return Err(invalid("header line too long"));
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Split `a=1&b=x%20y` into decoded pairs. `+` decodes to a space.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k, true), percent_decode(v, true))
        })
        .collect()
}

/// Decode `%XX` escapes; invalid escapes are kept literally.
pub fn percent_decode(input: &str, plus_as_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' if plus_as_space => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Write a complete response with a `Content-Length` body.
pub fn send_response<W: Write>(
    stream: &mut W,
    status: u16,
    headers: &[(&str, &str)],
    body: &str,
) -> io::Result<()> {
    let mut resp = format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status));
    for (k, v) in headers {
        resp.push_str(&format!("{k}: {v}\r\n"));
    }
    resp.push_str(&format!("Content-Length: {}\r\n", body.len()));
    resp.push_str("Connection: close\r\n\r\n");
    resp.push_str(body);
    stream.write_all(resp.as_bytes())?;
    stream.flush()
}

/// Writes a chunked (`Transfer-Encoding: chunked`) response body.
///
/// The status line goes out on [`ChunkedWriter::start`]; [`ChunkedWriter::finish`] writes the
/// terminating zero-length chunk. Dropping the writer without `finish` leaves the body
/// unterminated, which is how mid-stream failures are signalled to the client.
pub struct ChunkedWriter<'a, W: Write> {
    stream: &'a mut W,
}

impl<'a, W: Write> ChunkedWriter<'a, W> {
    pub fn start(stream: &'a mut W, status: u16, content_type: &str) -> io::Result<Self> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
            status,
            reason_phrase(status),
            content_type
        );
        stream.write_all(head.as_bytes())?;
        stream.flush()?;
        Ok(Self { stream })
    }

    /// Send one chunk and flush, so each frame reaches the client as soon as it is produced.
    pub fn send(&mut self, data: &str) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        write!(self.stream, "{:x}\r\n", data.len())?;
        self.stream.write_all(data.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()
    }

    pub fn finish(self) -> io::Result<()> {
        self.stream.write_all(b"0\r\n\r\n")?;
        self.stream.flush()
    }
}
