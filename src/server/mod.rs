//! Blocking HTTP front end.
//!
//! A fixed pool of worker threads accepts connections from one shared listener. Each connection
//! carries exactly one request; a streaming request owns its [`StreamPipeline`] for the lifetime
//! of the response and pulls the next frame only after the previous one was written, so a slow
//! client slows the reader down instead of growing a buffer.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::config::ServerConfig;
use crate::error::StreamError;
use crate::pipeline::{PipelineOptions, StreamObserver, StreamPipeline, TracingObserver};

pub mod http;
pub mod params;

pub use http::{ChunkedWriter, HttpRequest};
pub use params::StreamParams;

const NDJSON: &str = "application/x-ndjson";
const JSON: &str = "application/json";
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

struct AppState {
    config: ServerConfig,
    pipeline: PipelineOptions,
}

/// A bound, not yet serving, server.
pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    /// Bind the listener. Stream outcomes are logged through [`TracingObserver`] unless another
    /// observer is installed with [`Server::with_observer`].
    pub fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.bind)?;
        listener.set_nonblocking(true)?;
        let pipeline = PipelineOptions {
            observer: Some(Arc::new(TracingObserver)),
            alert_at_or_above: config.alert_at_or_above,
        };
        Ok(Self {
            listener,
            state: AppState { config, pipeline },
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn StreamObserver>) -> Self {
        self.state.pipeline.observer = Some(observer);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start the worker threads and return immediately.
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let addr = self.listener.local_addr()?;
        let workers = self.state.config.workers.max(1);
        let listener = Arc::new(self.listener);
        let state = Arc::new(self.state);
        let running = Arc::new(AtomicBool::new(true));

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let l = Arc::clone(&listener);
            let r = Arc::clone(&running);
            let s = Arc::clone(&state);
            let h = thread::Builder::new()
                .name(format!("stream-worker-{i}"))
                .spawn(move || worker_loop(&l, &r, &s))?;
            handles.push(h);
        }
        tracing::info!(%addr, workers, "server listening");

        Ok(ServerHandle {
            addr,
            running,
            workers: handles,
        })
    }

    /// Serve until every worker exits.
    pub fn run(self) -> io::Result<()> {
        self.spawn()?.join();
        Ok(())
    }
}

/// Handle to a running server. Dropping it stops accepting new connections.
pub struct ServerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait for in-flight responses to finish.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_workers();
    }

    fn join(mut self) {
        self.join_workers();
    }

    fn join_workers(&mut self) {
        for h in self.workers.drain(..) {
            if h.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn worker_loop(listener: &TcpListener, running: &AtomicBool, state: &AppState) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    tracing::warn!(%peer, error = %e, "could not switch connection to blocking");
                    continue;
                }
                handle_connection(stream, peer, state);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
}

fn handle_connection(mut stream: TcpStream, peer: SocketAddr, state: &AppState) {
    let _ = stream.set_read_timeout(Some(state.config.read_timeout()));
    let _ = stream.set_write_timeout(Some(state.config.write_timeout()));
    let _ = stream.set_nodelay(true);

    let request = match http::parse_request(&stream) {
        Ok(Some(req)) => req,
        Ok(None) => return,
        Err(e) => {
            tracing::debug!(%peer, error = %e, "unreadable request");
            let _ = send_error_body(&mut stream, 400, "BadRequest", &e.to_string());
            return;
        }
    };

    let span = tracing::info_span!("request", %peer, method = %request.method, path = %request.path);
    let _enter = span.enter();
    let status = route(&mut stream, &request, state);
    tracing::info!(status, "request served");
}

/// Dispatch one request and return the status that was sent.
fn route<W: Write>(stream: &mut W, req: &HttpRequest, state: &AppState) -> u16 {
    let result = match req.path.as_str() {
        "/" | "/stream" | "/stream/rows" if req.method != "GET" => send_error_body(
            stream,
            405,
            "MethodNotAllowed",
            &format!("{} is not allowed on {}", req.method, req.path),
        ),
        "/" => send_index(stream),
        "/stream" | "/stream/rows" => return handle_stream(stream, req, state),
        _ => send_error_body(
            stream,
            404,
            "NotFound",
            &format!("no route for {}", req.path),
        ),
    };
    match result {
        Ok(status) => status,
        Err(e) => {
            tracing::debug!(error = %e, "client disconnected before response was written");
            0
        }
    }
}

fn send_index<W: Write>(stream: &mut W) -> io::Result<u16> {
    let body = json!({
        "message": "CSV to NDJSON streaming service",
        "usage": "GET /stream?path=<csv>[&chunksize=N][&cols=a,b][&query=<expr>]\
                  [&scale_src=<col>&scale_factor=<num>&scale_out=<col>][&groupby=<col>]",
        "examples": [
            "/stream?path=data/sales.csv&chunksize=2",
            "/stream?path=data/sales.csv&chunksize=2&groupby=category",
            "/stream?path=data/sales.csv&query=value%20%3E%2010",
            "/stream?path=data/sales.csv&scale_src=value&scale_factor=2&scale_out=value_scaled",
        ],
    });
    http::send_response(stream, 200, &[("Content-Type", JSON)], &body.to_string())?;
    Ok(200)
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

fn send_error_body<W: Write>(stream: &mut W, status: u16, kind: &str, message: &str) -> io::Result<u16> {
    let body = serde_json::to_string(&ErrorBody {
        error: kind,
        message,
    })?;
    http::send_response(stream, status, &[("Content-Type", JSON)], &body)?;
    Ok(status)
}

fn send_stream_error<W: Write>(stream: &mut W, e: &StreamError) -> u16 {
    let status = e.status_code();
    if status >= 500 {
        tracing::error!(kind = e.kind(), "stream could not start: {e}");
    } else {
        tracing::debug!(kind = e.kind(), "rejected stream request: {e}");
    }
    send_error_body(stream, status, e.kind(), &e.to_string()).unwrap_or(status)
}

fn handle_stream<W: Write>(stream: &mut W, req: &HttpRequest, state: &AppState) -> u16 {
    let params = StreamParams::from_query(&req.query_params());
    let opened = params
        .into_config(
            state.config.default_chunk_size,
            state.config.data_root.as_deref(),
        )
        .and_then(|config| StreamPipeline::open(&config, &state.pipeline));
    let mut pipeline = match opened {
        Ok(p) => p,
        Err(e) => return send_stream_error(stream, &e),
    };

    // Pull the first frame before committing to 200 so early failures still get a status code.
    let mut next = match pipeline.next() {
        Some(Err(e)) => return send_stream_error(stream, &e),
        first => first,
    };

    let mut body = match ChunkedWriter::start(stream, 200, NDJSON) {
        Ok(w) => w,
        Err(e) => {
            tracing::debug!(error = %e, "client disconnected");
            return 200;
        }
    };
    let delay = state.config.frame_delay();
    while let Some(item) = next {
        match item {
            Ok(line) => {
                if let Err(e) = body.send(&line) {
                    tracing::debug!(error = %e, stats = %pipeline.stats(), "client disconnected");
                    return 200;
                }
                if let Some(d) = delay.filter(|_| is_data_frame(&line)) {
                    thread::sleep(d);
                }
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), "stream aborted mid-response: {e}");
                return 200;
            }
        }
        next = pipeline.next();
    }
    if let Err(e) = body.finish() {
        tracing::debug!(error = %e, "client disconnected before end of stream");
    }
    200
}

/// `frame_delay` throttles once per batch, so only data frames are followed by a pause.
fn is_data_frame(line: &str) -> bool {
    line.starts_with(r#"{"type":"data""#)
}
