#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tempfile::TempDir;

use neuronbox_server::{config::Config, router, AppState};

pub const SMALL_LEN: usize = 200_000;
pub const MEDIUM_CHUNK: usize = 32 * 1024;
pub const MEDIUM_CHUNKS: usize = 128;
pub const MEDIUM_LEN: usize = MEDIUM_CHUNK * MEDIUM_CHUNKS;
pub const LARGE_ADVERTISED: usize = 1_000_000;
pub const LARGE_SENT: usize = 64 * 1024;
pub const NOLENGTH_LEN: usize = 50_000;
pub const STALL_SENT: usize = 16 * 1024;
pub const TRANSLATE_FILE_LEN: usize = 2_000;
/// The one translation file the mock upstream refuses to serve
pub const MISSING_TRANSLATE_FILE: (&str, &str) = ("opus-mt-de-en", "source.spm");

/// A local stand-in for the model hosts, laid out like a mirror.
pub struct Upstream {
    pub base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl Upstream {
    /// Request paths served so far, in order
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

pub async fn spawn_upstream() -> Upstream {
    let hits = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new()
        .route("/whisper/small.pt", get(small))
        .route("/whisper/medium.pt", get(medium))
        .route("/whisper/large.pt", get(large))
        .route("/nolength", get(nolength))
        .route("/stall", get(stall))
        .route("/translate/:model/:file", get(translate_file))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream {
        base_url: format!("http://{}", addr),
        hits,
    }
}

type Hits = State<Arc<Mutex<Vec<String>>>>;

async fn small(State(hits): Hits) -> Vec<u8> {
    hits.lock().unwrap().push("/whisper/small.pt".to_string());
    vec![1u8; SMALL_LEN]
}

// Slow enough that a test can observe progress and cancel mid-way.
async fn medium(State(hits): Hits) -> Response {
    hits.lock().unwrap().push("/whisper/medium.pt".to_string());
    let stream = futures::stream::unfold(0usize, |sent| async move {
        if sent == MEDIUM_CHUNKS {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
        Some((Ok::<_, std::io::Error>(Bytes::from(vec![2u8; MEDIUM_CHUNK])), sent + 1))
    });
    (
        [(header::CONTENT_LENGTH, MEDIUM_LEN.to_string())],
        Body::from_stream(stream),
    )
        .into_response()
}

// Advertises more than it sends, then breaks the connection.
async fn large(State(hits): Hits) -> Response {
    hits.lock().unwrap().push("/whisper/large.pt".to_string());
    let stream = futures::stream::unfold(false, |sent| async move {
        if sent {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Some((Err(std::io::Error::other("upstream reset")), true))
        } else {
            Some((Ok(Bytes::from(vec![3u8; LARGE_SENT])), true))
        }
    });
    (
        [(header::CONTENT_LENGTH, LARGE_ADVERTISED.to_string())],
        Body::from_stream(stream),
    )
        .into_response()
}

// Sends a little, then goes silent for far longer than any test waits.
async fn stall(State(hits): Hits) -> Response {
    hits.lock().unwrap().push("/stall".to_string());
    let stream = futures::stream::unfold(false, |sent| async move {
        if sent {
            tokio::time::sleep(Duration::from_secs(300)).await;
            None
        } else {
            Some((Ok::<_, std::io::Error>(Bytes::from(vec![6u8; STALL_SENT])), true))
        }
    });
    (
        [(header::CONTENT_LENGTH, (STALL_SENT * 4).to_string())],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn nolength(State(hits): Hits) -> Response {
    hits.lock().unwrap().push("/nolength".to_string());
    let chunks = vec![
        Ok::<_, std::io::Error>(Bytes::from(vec![4u8; NOLENGTH_LEN / 2])),
        Ok(Bytes::from(vec![4u8; NOLENGTH_LEN / 2])),
    ];
    Body::from_stream(futures::stream::iter(chunks)).into_response()
}

async fn translate_file(State(hits): Hits, Path((model, file)): Path<(String, String)>) -> Response {
    hits.lock()
        .unwrap()
        .push(format!("/translate/{}/{}", model, file));
    if (model.as_str(), file.as_str()) == MISSING_TRANSLATE_FILE {
        return StatusCode::NOT_FOUND.into_response();
    }
    vec![5u8; TRANSLATE_FILE_LEN].into_response()
}

/// A running server over a fresh config root, downloading from `upstream`.
pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub client: reqwest::Client,
    _root: TempDir,
}

pub async fn spawn_app(upstream: &Upstream) -> TestApp {
    spawn_app_with(upstream, |_| {}).await
}

pub async fn spawn_app_with<F>(upstream: &Upstream, tweak: F) -> TestApp
where
    F: FnOnce(&mut Config),
{
    let root = TempDir::new().unwrap();
    let mut config = Config::with_root(root.path().to_path_buf());
    config.mirror_url = Some(upstream.base_url.clone());
    config.poll_interval_ms = 50;
    tweak(&mut config);

    let state = AppState::new(config).unwrap();
    spawn_state(state, root).await
}

pub async fn spawn_state(state: AppState, root: TempDir) -> TestApp {
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{}", addr),
        state,
        client: reqwest::Client::new(),
        _root: root,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn config_root(&self) -> &std::path::Path {
        self._root.path()
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> serde_json::Value {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    pub async fn get_json(&self, path: &str) -> serde_json::Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}
