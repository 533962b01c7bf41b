//! Shared helpers for downloader integration tests: a loopback HTTP server and
//! recording collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::StreamExt;
use mediavault_downloader::config::DownloaderConfig;
use mediavault_downloader::decoder::DirectUrlDecoder;
use mediavault_downloader::events::DownloadEvent;
use mediavault_downloader::task::{CompletedDownload, CompletionHandler, MediaKind, ResolvedMedia, Resolver};
use mediavault_downloader::{DownloadError, DownloadManager};
use mediavault_library::memory_store::InMemoryMetadataStore;
use mediavault_library::MetadataStore;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Loopback HTTP server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Route {
    /// 200 with the given body and its Content-Length.
    Body(Vec<u8>),
    /// Always 403.
    Forbidden,
    /// Announces a large body, sends a few bytes, then stalls forever.
    Stall,
}

#[derive(Clone)]
struct ServerState {
    routes: Arc<HashMap<String, Route>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    /// Serve `routes` on an ephemeral port. Unknown paths answer 404.
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = ServerState {
            routes: Arc::new(routes.into_iter().map(|(p, r)| (p.to_string(), r)).collect()),
            hits: Arc::new(Mutex::new(HashMap::new())),
        };
        let hits = Arc::clone(&state.hits);

        let app = Router::new().fallback(serve_route).with_state(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

async fn serve_route(State(state): State<ServerState>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    *state.hits.lock().unwrap().entry(path.clone()).or_default() += 1;

    match state.routes.get(&path) {
        Some(Route::Body(body)) => ([(header::CONTENT_TYPE, "video/mp4")], body.clone()).into_response(),
        Some(Route::Forbidden) => StatusCode::FORBIDDEN.into_response(),
        Some(Route::Stall) => {
            let stream = futures::stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(b"stalled...")) })
                .chain(futures::stream::pending());
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "video/mp4")
                .header(header::CONTENT_LENGTH, "1000000")
                .body(Body::from_stream(stream))
                .unwrap()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Completion handler remembering each finished file and its contents.
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<(String, Vec<u8>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionHandler for Recorder {
    async fn on_complete(&self, completed: &CompletedDownload) -> Result<(), DownloadError> {
        let bytes = tokio::fs::read(&completed.file).await?;
        self.seen.lock().unwrap().push((completed.origin_url.clone(), bytes));
        Ok(())
    }
}

/// Resolver handing out a different URL list on each call, repeating the
/// last one when exhausted.
pub struct SequenceResolver {
    answers: Vec<ResolvedMedia>,
    calls: AtomicUsize,
}

impl SequenceResolver {
    pub fn single_files(urls: &[String]) -> Self {
        Self {
            answers: urls
                .iter()
                .map(|u| ResolvedMedia {
                    urls: vec![u.clone()],
                    kind: MediaKind::SingleFile,
                })
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for SequenceResolver {
    async fn resolve(&self, _origin_url: &str) -> Result<ResolvedMedia, DownloadError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.answers.len() - 1);
        Ok(self.answers[index].clone())
    }
}

// ---------------------------------------------------------------------------
// Manager setup
// ---------------------------------------------------------------------------

pub fn config(dir: &Path, workers: usize) -> DownloaderConfig {
    DownloaderConfig {
        workers,
        work_dir: dir.join("downloads"),
        queue_file: dir.join("userConfig").join("queue.json"),
        shutdown_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        ..DownloaderConfig::default()
    }
}

pub fn start_manager(dir: &Path, workers: usize) -> (Arc<DownloadManager>, Arc<InMemoryMetadataStore>) {
    let store = Arc::new(InMemoryMetadataStore::new());
    let manager = DownloadManager::start(
        config(dir, workers),
        Arc::clone(&store) as Arc<dyn MetadataStore>,
        Arc::new(DirectUrlDecoder),
        Arc::new(Recorder::default()),
    )
    .unwrap();
    (manager, store)
}

/// Wait for the next event matching `pred`, failing the test after 10 s.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<DownloadEvent>, pred: F) -> DownloadEvent
where
    F: Fn(&DownloadEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for download event")
}

pub fn is_finished(event: &DownloadEvent) -> bool {
    matches!(event, DownloadEvent::Completed { .. } | DownloadEvent::Failed { .. })
}

pub fn part_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with("part-"))
                .collect()
        })
        .unwrap_or_default()
}
