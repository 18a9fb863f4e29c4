//! Helpers for testing the web server and the cache service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - When using [`tempdir`] as a storage root, hold the handle for the
//!    entire lifetime of the test. When dropped too early the storage root
//!    silently disappears under the service, which recreates it lazily and
//!    leaks the directory.
//!
//!  - Keep the [`Upstream`] alive until all requests to it have been made.
//!    If it is dropped, the port closes and pending connections time out.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Response, StatusCode, Uri, header};
use bytes::Bytes;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: the logger only captures logs from the mirrorcache
///    crates and mutes everything else.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("mirrorcache_service=trace,mirrorcache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped. Use it
/// as a guard to automatically clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// A test server that binds to a random localhost port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a
/// `tokio::test`. It automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Spawns the given app on an ephemeral port.
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.socket.port()
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "http://127.0.0.1:{}/{}",
            self.port(),
            path.trim_start_matches('/')
        )
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Clone)]
enum Served {
    Full(Bytes),
    /// Announces the full length but drops the connection halfway through.
    Truncated(Bytes),
    /// Trickles the body out in small delayed chunks.
    Slow(Bytes),
}

#[derive(Clone, Default)]
struct UpstreamState {
    files: Arc<Mutex<BTreeMap<String, Served>>>,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

/// A mock origin serving in-memory files and counting per-path hits.
///
/// Besides the registered files, `/respond_statuscode/<code>/...` answers
/// with the given status code and an empty body.
pub struct Upstream {
    server: Server,
    state: UpstreamState,
}

impl Upstream {
    pub fn new() -> Self {
        let state = UpstreamState::default();
        let router = Router::new().fallback(serve).with_state(state.clone());

        Self {
            server: Server::with_router(router),
            state,
        }
    }

    /// Registers a file body served at `path`.
    pub fn insert(&self, path: &str, body: impl Into<Bytes>) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(keyed(path), Served::Full(body.into()));
    }

    /// Registers a file whose transfer always breaks off halfway through.
    pub fn insert_truncated(&self, path: &str, body: impl Into<Bytes>) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(keyed(path), Served::Truncated(body.into()));
    }

    /// Registers a file that is streamed slowly, in 16 delayed chunks.
    ///
    /// Useful for racing client-side events against an in-flight transfer,
    /// or for tripping download timeouts.
    pub fn insert_slow(&self, path: &str, body: impl Into<Bytes>) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(keyed(path), Served::Slow(body.into()));
    }

    /// Number of requests made for `path` so far.
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(&keyed(path))
            .copied()
            .unwrap_or(0)
    }

    /// Total number of requests across all paths.
    pub fn accesses(&self) -> usize {
        self.state.hits.lock().unwrap().values().sum()
    }

    /// Base URL of the mock origin.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.server.port())
    }
}

impl Default for Upstream {
    fn default() -> Self {
        Self::new()
    }
}

fn keyed(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

async fn serve(State(state): State<UpstreamState>, uri: Uri) -> Response<Body> {
    let path = uri.path().to_string();

    {
        let mut hits = state.hits.lock().unwrap();
        *hits.entry(path.clone()).or_default() += 1;
    }

    if let Some(code) = path
        .strip_prefix("/respond_statuscode/")
        .and_then(|rest| rest.split('/').next())
        .and_then(|code| code.parse::<u16>().ok())
    {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Response::builder()
            .status(status)
            .body(Body::empty())
            .unwrap();
    }

    let served = state.files.lock().unwrap().get(&path).cloned();
    match served {
        Some(Served::Full(bytes)) => Response::builder()
            .header(header::CONTENT_LENGTH, bytes.len())
            .body(Body::from(bytes))
            .unwrap(),
        Some(Served::Truncated(bytes)) => {
            let announced = bytes.len();
            let half = bytes.slice(..announced / 2);
            let chunks: Vec<Result<Bytes, std::io::Error>> =
                vec![Ok(half), Err(std::io::Error::other("connection reset"))];

            Response::builder()
                .header(header::CONTENT_LENGTH, announced)
                .body(Body::from_stream(futures::stream::iter(chunks)))
                .unwrap()
        }
        Some(Served::Slow(bytes)) => {
            let total = bytes.len();
            let step = total.div_ceil(16).max(1);

            let stream = futures::stream::unfold(bytes, move |rest| async move {
                if rest.is_empty() {
                    return None;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                let take = step.min(rest.len());
                Some((Ok::<_, std::io::Error>(rest.slice(..take)), rest.slice(take..)))
            });

            Response::builder()
                .header(header::CONTENT_LENGTH, total)
                .body(Body::from_stream(stream))
                .unwrap()
        }
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap(),
    }
}
