#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use quaver_mirror::catalog::Mapset;
use quaver_mirror::{
    ArchiveSink, CatalogApi, MetadataStore, MirrorError, Session, SessionProvider, SyncOptions,
};

/// テスト用アーカイブ本体（UTF-8として不正なバイトを含む）
pub fn archive_bytes(id: i64) -> Vec<u8> {
    let mut bytes = vec![0x50, 0x4b, 0x03, 0x04, 0xff, 0xfe, 0x00, 0x80];
    bytes.extend_from_slice(&id.to_le_bytes());
    bytes
}

pub fn fast_options() -> SyncOptions {
    SyncOptions {
        initial_backoff: Duration::from_millis(1),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// ダウンロードサーバー
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub id: i64,
    pub cookie: String,
    pub user_agent: String,
}

#[derive(Clone)]
struct ArchiveServerState {
    accepted_token: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct ArchiveServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl ArchiveServer {
    /// `quaver_session=<accepted_token>` が付いたリクエストにだけアーカイブを返す
    pub async fn start(accepted_token: &str) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ArchiveServerState {
            accepted_token: accepted_token.to_string(),
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/download/mapset/:id", get(download))
            .with_state(state);
        let (addr, handle) = serve(app).await;

        Self {
            base_url: format!("http://{}", addr),
            requests,
            _handle: handle,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requested_ids(&self) -> Vec<i64> {
        self.requests().iter().map(|r| r.id).collect()
    }
}

async fn download(
    State(state): State<ArchiveServerState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let accepted = cookie.contains(&format!("quaver_session={}", state.accepted_token));
    state.requests.lock().unwrap().push(RecordedRequest {
        id,
        cookie,
        user_agent,
    });

    if accepted {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            archive_bytes(id),
        )
            .into_response()
    } else {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=UTF-8")],
            "<html><body>Please log in</body></html>",
        )
            .into_response()
    }
}

pub async fn serve(app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

// ---------------------------------------------------------------------------
// セッション
// ---------------------------------------------------------------------------

pub fn session(token: &str, user_agent: &str) -> Session {
    Session::new("clearance", token, user_agent, false).unwrap()
}

type ErrorFactory = Box<dyn Fn() -> MirrorError + Send + Sync>;

/// 呼ばれるたびに次のトークンを返すセッション
///
/// `fail_with` があればトークンを使い切った後は常に失敗する。
pub struct ScriptedSessionProvider {
    tokens: Vec<String>,
    next: usize,
    current: Option<Session>,
    fail_with: Option<ErrorFactory>,
    calls: Arc<Mutex<Vec<bool>>>,
}

impl ScriptedSessionProvider {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            next: 0,
            current: None,
            fail_with: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(fail_with: impl Fn() -> MirrorError + Send + Sync + 'static) -> Self {
        Self::new(&[]).then_fail(fail_with)
    }

    pub fn then_fail(mut self, fail_with: impl Fn() -> MirrorError + Send + Sync + 'static) -> Self {
        self.fail_with = Some(Box::new(fail_with));
        self
    }

    /// `acquire` に渡された `reuse_existing` の履歴
    pub fn calls(&self) -> Arc<Mutex<Vec<bool>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl SessionProvider for ScriptedSessionProvider {
    async fn acquire(&mut self, reuse_existing: bool) -> Result<Session, MirrorError> {
        self.calls.lock().unwrap().push(reuse_existing);
        self.current = None;

        if let Some(fail_with) = &self.fail_with {
            if self.next >= self.tokens.len() {
                return Err(fail_with());
            }
        }

        let index = self.next.min(self.tokens.len().saturating_sub(1));
        let token = self.tokens[index].clone();
        self.next += 1;

        let session = session(&token, &format!("agent-{}", self.next));
        self.current = Some(session.clone());
        Ok(session)
    }

    fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }
}

// ---------------------------------------------------------------------------
// 保存先
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct SharedSink {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl SharedSink {
    pub fn with_keys(keys: &[&str]) -> Self {
        let sink = Self::default();
        for key in keys {
            sink.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), b"existing".to_vec());
        }
        sink
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ArchiveSink for SharedSink {
    async fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    async fn store(&mut self, key: &str, bytes: &[u8]) -> Result<(), MirrorError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// 書き込みが常に失敗する保存先
pub struct BrokenSink;

#[async_trait]
impl ArchiveSink for BrokenSink {
    async fn contains(&self, _key: &str) -> bool {
        false
    }

    async fn store(&mut self, key: &str, _bytes: &[u8]) -> Result<(), MirrorError> {
        Err(MirrorError::Storage(format!("{} is read-only", key)))
    }
}

// ---------------------------------------------------------------------------
// カタログ・DB
// ---------------------------------------------------------------------------

pub struct FakeCatalog {
    ids: Vec<i64>,
    mapsets: HashMap<i64, Mapset>,
    detail_calls: Arc<Mutex<Vec<i64>>>,
}

impl FakeCatalog {
    pub fn new(ids: &[i64]) -> Self {
        Self {
            ids: ids.to_vec(),
            mapsets: ids.iter().map(|&id| (id, Mapset::with_id(id))).collect(),
            detail_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 詳細取得が失敗するIDを指定する
    pub fn without_detail(mut self, id: i64) -> Self {
        self.mapsets.remove(&id);
        self
    }

    pub fn detail_calls(&self) -> Arc<Mutex<Vec<i64>>> {
        self.detail_calls.clone()
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn ranked_mapset_ids(&self) -> Result<Vec<i64>, MirrorError> {
        Ok(self.ids.clone())
    }

    async fn mapset(&self, id: i64) -> Result<Mapset, MirrorError> {
        self.detail_calls.lock().unwrap().push(id);
        self.mapsets
            .get(&id)
            .cloned()
            .ok_or_else(|| MirrorError::Catalog(format!("mapset {} not found", id)))
    }
}

pub struct FakeMetadataStore {
    existing: HashSet<i64>,
    upserted: Arc<Mutex<Vec<i64>>>,
}

impl FakeMetadataStore {
    pub fn new(existing: &[i64]) -> Self {
        Self {
            existing: existing.iter().copied().collect(),
            upserted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn upserted(&self) -> Arc<Mutex<Vec<i64>>> {
        self.upserted.clone()
    }
}

#[async_trait]
impl MetadataStore for FakeMetadataStore {
    async fn existing_mapset_ids(&self) -> Result<HashSet<i64>, MirrorError> {
        Ok(self.existing.clone())
    }

    async fn upsert_mapset(&self, mapset: &Mapset) -> Result<(), MirrorError> {
        self.upserted.lock().unwrap().push(mapset.id);
        Ok(())
    }
}
