//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use url::Url;

use mylora_mirror::{
    Catalog, CatalogError, Credentials, EventSource, EventSourceError, FsEvent, ManualClock,
};

/// Catalog served from memory, counting calls
#[derive(Default)]
pub struct MemoryCatalog {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fetches: Mutex<HashMap<String, usize>>,
    pub logins: AtomicUsize,
    pub listings: AtomicUsize,
    pub reject_login: AtomicBool,
    pub fail_listing: AtomicBool,
}

impl MemoryCatalog {
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        let catalog = Self::default();
        for (name, data) in files {
            catalog.insert(name, data);
        }
        catalog
    }

    pub fn insert(&self, name: impl Into<String>, data: Vec<u8>) {
        self.files.lock().insert(name.into(), data);
    }

    pub fn fetch_count(&self, name: &str) -> usize {
        self.fetches.lock().get(name).copied().unwrap_or(0)
    }

    fn error(status: StatusCode) -> CatalogError {
        CatalogError::Status {
            status,
            url: Url::parse("http://memory.test/").unwrap(),
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<(), CatalogError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.reject_login.load(Ordering::SeqCst) {
            Err(CatalogError::LoginRejected(StatusCode::UNAUTHORIZED))
        } else {
            Ok(())
        }
    }

    async fn list_entries(&self) -> Result<Vec<String>, CatalogError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::error(StatusCode::INTERNAL_SERVER_ERROR));
        }
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn fetch(&self, filename: &str) -> Result<Bytes, CatalogError> {
        *self.fetches.lock().entry(filename.to_string()).or_default() += 1;
        self.files
            .lock()
            .get(filename)
            .map(|data| Bytes::from(data.clone()))
            .ok_or_else(|| Self::error(StatusCode::NOT_FOUND))
    }
}

/// Event source replaying a fixed script.
///
/// Each call advances the manual clock by `step`. Once the script runs out
/// it sleeps for the timeout and returns empty batches.
pub struct ScriptedSource {
    script: VecDeque<Result<Vec<FsEvent>, EventSourceError>>,
    clock: Arc<ManualClock>,
    step: Duration,
}

impl ScriptedSource {
    pub fn new(clock: Arc<ManualClock>, step: Duration) -> Self {
        Self {
            script: VecDeque::new(),
            clock,
            step,
        }
    }

    pub fn then(mut self, batch: Vec<FsEvent>) -> Self {
        self.script.push_back(Ok(batch));
        self
    }

    pub fn then_fail(mut self, error: EventSourceError) -> Self {
        self.script.push_back(Err(error));
        self
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn next_batch(&mut self, timeout: Duration) -> Result<Vec<FsEvent>, EventSourceError> {
        self.clock.advance(self.step);
        match self.script.pop_front() {
            Some(next) => next,
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }
}

// ==================== HTTP stand-in for the remote gallery ====================

#[derive(Default)]
pub struct RemoteState {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub downloads: AtomicUsize,
    pub require_cookie: AtomicBool,
    /// Abort the transfer of this file halfway through
    pub truncated: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct SearchQuery {
    query: String,
}

const SESSION_COOKIE: &str = "session=ok";

async fn login(Form(form): Form<LoginForm>) -> Response {
    if form.username == "alice" && form.password == "secret" {
        (
            StatusCode::SEE_OTHER,
            [
                (header::LOCATION, "/"),
                (header::SET_COOKIE, "session=ok; Path=/"),
            ],
        )
            .into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn search(
    State(state): State<Arc<RemoteState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    if query.query != "*" {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let mut names: Vec<String> = state.files.lock().keys().cloned().collect();
    names.sort();
    let entries: Vec<serde_json::Value> = names
        .into_iter()
        .map(|name| serde_json::json!({ "filename": name, "name": "model", "tags": [] }))
        .collect();
    Json(entries).into_response()
}

async fn upload(
    State(state): State<Arc<RemoteState>>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
) -> Response {
    if state.require_cookie.load(Ordering::SeqCst) {
        let has_cookie = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains(SESSION_COOKIE));
        if !has_cookie {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    state.downloads.fetch_add(1, Ordering::SeqCst);
    let Some(data) = state.files.lock().get(&name).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if state.truncated.lock().as_deref() == Some(name.as_str()) {
        // half the body, then the connection dies mid-transfer
        let half = Bytes::from(data[..data.len() / 2].to_vec());
        let chunks = futures::stream::iter(vec![
            Ok(half),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "transfer interrupted",
            )),
        ]);
        return axum::body::Body::from_stream(chunks).into_response();
    }
    data.into_response()
}

/// Serve a fake gallery on an ephemeral port and return its base URL.
pub async fn spawn_remote(state: Arc<RemoteState>) -> Url {
    let app = Router::new()
        .route("/login", post(login))
        .route("/search", get(search))
        .route("/uploads/:name", get(upload))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("http://{}", addr)).unwrap()
}

pub fn remote_with_files<I, S>(files: I) -> Arc<RemoteState>
where
    I: IntoIterator<Item = (S, Vec<u8>)>,
    S: Into<String>,
{
    let state = RemoteState::default();
    {
        let mut map = state.files.lock();
        for (name, data) in files {
            map.insert(name.into(), data);
        }
    }
    Arc::new(state)
}
