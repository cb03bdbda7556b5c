use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use csv_ndjson_stream::config::ServerConfig;
use csv_ndjson_stream::server::{Server, ServerHandle};
use serde_json::{json, Value as Json};

fn start() -> ServerHandle {
    let config = ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        workers: 2,
        ..Default::default()
    };
    Server::bind(config).unwrap().spawn().unwrap()
}

fn get(addr: SocketAddr, target: &str) -> (u16, String, String) {
    let mut client = TcpStream::connect(addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    write!(client, "GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    client.flush().unwrap();

    let mut buf = Vec::new();
    client.read_to_end(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let status: u16 = head
        .split_whitespace()
        .nth(1)
        .unwrap()
        .parse()
        .unwrap();
    (status, head.to_string(), body.to_string())
}

/// Decode a chunked body; panics if the terminating chunk is missing.
fn dechunk(mut body: &str) -> String {
    let mut out = String::new();
    loop {
        let (size, rest) = body.split_once("\r\n").expect("chunk size line");
        let size = usize::from_str_radix(size, 16).unwrap();
        if size == 0 {
            return out;
        }
        out.push_str(&rest[..size]);
        body = rest[size..].strip_prefix("\r\n").unwrap();
    }
}

fn frames(body: &str) -> Vec<Json> {
    dechunk(body)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn streams_grouped_frames_over_http() {
    let server = start();
    let (status, head, body) = get(
        server.local_addr(),
        "/stream?path=tests/fixtures/sample.csv&chunksize=2&groupby=category",
    );
    assert_eq!(status, 200);
    assert!(head.contains("Content-Type: application/x-ndjson"));
    assert!(head.contains("Transfer-Encoding: chunked"));
    assert!(head.contains("Connection: close"));

    let frames = frames(&body);
    assert_eq!(frames.len(), 6);
    assert_eq!(frames[0]["type"], "data");
    assert_eq!(
        frames[5],
        json!({"type": "progress", "running_counts": {"a": 2, "b": 2, "c": 1}})
    );
    server.stop();
}

#[test]
fn filter_and_scale_over_http() {
    let server = start();
    let (status, _, body) = get(
        server.local_addr(),
        "/stream/rows?path=tests/fixtures/sample.csv&query=value+%3E+10\
         &scale_src=value&scale_factor=2&scale_out=value_scaled",
    );
    assert_eq!(status, 200);
    let frames = frames(&body);
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0]["rows"],
        json!([
            {"category": "b", "value": 20, "value_scaled": 40.0},
            {"category": "a", "value": 30, "value_scaled": 60.0},
            {"category": "b", "value": 15, "value_scaled": 30.0},
        ])
    );
    server.stop();
}

#[test]
fn errors_before_streaming_get_status_codes() {
    let server = start();
    let addr = server.local_addr();

    let (status, _, body) = get(addr, "/stream?path=tests/fixtures/missing.csv");
    assert_eq!(status, 404);
    let err: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(err["error"], "SourceNotFound");

    let (status, _, body) = get(addr, "/stream?path=tests/fixtures/sample.csv&chunksize=0");
    assert_eq!(status, 400);
    assert!(body.contains("InvalidConfiguration"));

    let (status, _, body) = get(addr, "/stream?path=tests/fixtures/sample.csv&query=value+%3E");
    assert_eq!(status, 400);
    assert!(body.contains("InvalidPredicate"));

    let (status, _, body) = get(addr, "/stream?path=tests/fixtures/empty.csv");
    assert_eq!(status, 422);
    assert!(body.contains("MalformedInput"));

    let (status, _, _) = get(addr, "/nowhere");
    assert_eq!(status, 404);

    server.stop();
}

#[test]
fn mid_stream_failure_leaves_body_unterminated() {
    let server = start();
    let (status, _, body) = get(
        server.local_addr(),
        "/stream?path=tests/fixtures/malformed.csv&chunksize=1",
    );
    assert_eq!(status, 200);
    assert!(body.starts_with(&format!("{:x}\r\n", r#"{"type":"data","rows":[{"a":1,"b":2}]}"#.len() + 1)));
    assert!(!body.ends_with("0\r\n\r\n"));
    server.stop();
}

#[test]
fn header_only_file_is_an_empty_stream() {
    let server = start();
    let (status, _, body) = get(server.local_addr(), "/stream?path=tests/fixtures/header_only.csv");
    assert_eq!(status, 200);
    assert_eq!(body, "0\r\n\r\n");
    server.stop();
}

#[test]
fn oversized_chunk_size_streams_whole_file() {
    let server = start();
    let (status, _, body) = get(
        server.local_addr(),
        &format!("/stream?path=tests/fixtures/sample.csv&chunksize={}", usize::MAX),
    );
    assert_eq!(status, 200);
    let frames = frames(&body);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["rows"].as_array().unwrap().len(), 5);

    // The workers survived and still serve requests.
    let (status, _, _) = get(server.local_addr(), "/");
    assert_eq!(status, 200);
    server.stop();
}

#[test]
fn deeply_nested_query_is_a_bad_request() {
    let server = start();
    let target = format!(
        "/stream?path=tests/fixtures/sample.csv&query={}value+%3E+1{}",
        "(".repeat(1000),
        ")".repeat(1000)
    );
    let (status, _, body) = get(server.local_addr(), &target);
    assert_eq!(status, 400);
    let err: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(err["error"], "InvalidPredicate");

    let (status, _, _) = get(server.local_addr(), "/");
    assert_eq!(status, 200);
    server.stop();
}

#[test]
fn group_counts_match_across_chunk_sizes() {
    let server = start();
    for chunk_size in [1, 3] {
        let target =
            format!("/stream?path=tests/fixtures/numeric_keys.csv&chunksize={chunk_size}&groupby=k");
        let (status, _, body) = get(server.local_addr(), &target);
        assert_eq!(status, 200);
        assert_eq!(
            frames(&body).last().unwrap()["running_counts"],
            json!({"1": 2, "2.5": 1})
        );
    }
    server.stop();
}

#[test]
fn stalled_client_releases_its_worker() {
    let path = std::env::temp_dir()
        .join(format!("csv_ndjson_stream_stall_{}.csv", std::process::id()));
    let mut csv = String::from("id,category\n");
    for i in 0..500_000 {
        csv.push_str(&format!("{i},category_{}\n", i % 7));
    }
    std::fs::write(&path, csv).unwrap();

    let config = ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        workers: 1,
        write_timeout_ms: 200,
        ..Default::default()
    };
    let server = Server::bind(config).unwrap().spawn().unwrap();

    // Request a large stream and never read it, so the only worker blocks on write.
    let mut stalled = TcpStream::connect(server.local_addr()).unwrap();
    write!(
        stalled,
        "GET /stream?path={}&chunksize=1000 HTTP/1.1\r\n\r\n",
        path.display()
    )
    .unwrap();

    let (status, _, _) = get(server.local_addr(), "/");
    assert_eq!(status, 200);

    drop(stalled);
    server.stop();
    let _ = std::fs::remove_file(path);
}
