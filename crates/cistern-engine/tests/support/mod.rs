//! In-process mock bridge + mirror for engine integration tests
//!
//! One axum server plays both roles: the bridge endpoints manage frames,
//! registrations, file records and pointers; the `/s/...` and `/alt/s/...`
//! endpoints are the mirrors. Fault injection knobs simulate failing
//! pushes, corrupted or unreachable shards, and slow mirrors, keyed by
//! shard hash or shard key so tests can arm them deterministically.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use cistern_core::config::ClientConfig;
use cistern_engine::{Cistern, DownloadResult, MasterSecret, UploadResult};
use cistern_engine::{DownloadEvents, UploadEvents};

pub const BUCKET: &str = "5c1b3c70a100262b970883a0";

pub fn test_master() -> MasterSecret {
    MasterSecret::from_bytes([7u8; 32])
}

pub fn test_client(mock: &MockNet) -> Cistern {
    test_client_with(mock, |_| {})
}

pub fn test_client_with(mock: &MockNet, tweak: impl FnOnce(&mut ClientConfig)) -> Cistern {
    let mut config = ClientConfig::default();
    config.bridge.url = mock.url.clone();
    config.bridge.timeout_secs = 10;
    tweak(&mut config);
    Cistern::new(config, test_master()).expect("client construction")
}

// ── Event recorder ───────────────────────────────────────────────────────

/// Counts every event and keeps the last payloads; implements both event
/// traits so one recorder serves uploads and downloads.
#[derive(Default)]
pub struct Recorder {
    pub begin: AtomicU32,
    pub progress: AtomicU32,
    pub finish: AtomicU32,
    pub fail: AtomicU32,
    pub cancel: AtomicU32,
    pub total: AtomicU64,
    pub last_fraction: Mutex<f32>,
    pub last_reason: Mutex<Option<String>>,
    pub upload_result: Mutex<Option<UploadResult>>,
    pub download_result: Mutex<Option<DownloadResult>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn terminal_count(&self) -> u32 {
        self.finish.load(Ordering::SeqCst)
            + self.fail.load(Ordering::SeqCst)
            + self.cancel.load(Ordering::SeqCst)
    }
}

impl UploadEvents for Recorder {
    fn on_begin(&self, file_size: u64) {
        self.begin.fetch_add(1, Ordering::SeqCst);
        self.total.store(file_size, Ordering::SeqCst);
    }
    fn on_progress(&self, fraction: f32) {
        self.progress.fetch_add(1, Ordering::SeqCst);
        *self.last_fraction.lock().unwrap() = fraction;
    }
    fn on_finish(&self, result: &UploadResult) {
        self.finish.fetch_add(1, Ordering::SeqCst);
        *self.upload_result.lock().unwrap() = Some(result.clone());
    }
    fn on_fail(&self, reason: &str) {
        self.fail.fetch_add(1, Ordering::SeqCst);
        *self.last_reason.lock().unwrap() = Some(reason.to_string());
    }
    fn on_cancel(&self) {
        self.cancel.fetch_add(1, Ordering::SeqCst);
    }
}

impl DownloadEvents for Recorder {
    fn on_begin(&self, total_size: u64) {
        self.begin.fetch_add(1, Ordering::SeqCst);
        self.total.store(total_size, Ordering::SeqCst);
    }
    fn on_progress(&self, fraction: f32) {
        self.progress.fetch_add(1, Ordering::SeqCst);
        *self.last_fraction.lock().unwrap() = fraction;
    }
    fn on_finish(&self, result: &DownloadResult) {
        self.finish.fetch_add(1, Ordering::SeqCst);
        *self.download_result.lock().unwrap() = Some(result.clone());
    }
    fn on_fail(&self, reason: &str) {
        self.fail.fetch_add(1, Ordering::SeqCst);
        *self.last_reason.lock().unwrap() = Some(reason.to_string());
    }
    fn on_cancel(&self) {
        self.cancel.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Mock network state ───────────────────────────────────────────────────

use cistern_bridge::types::{FileInfo, FileRecord, FinalizeFrame, Frame, Pointer, RegisterShard};

pub struct RegisteredShard {
    pub hash: String,
    pub size: u64,
}

#[derive(Default)]
pub struct FrameState {
    pub shards: HashMap<u64, RegisteredShard>,
}

pub struct StoredShard {
    pub key: String,
    pub hash: String,
    pub size: u64,
}

pub struct StoredFile {
    pub bucket: String,
    pub name: String,
    pub index: String,
    pub size: u64,
    pub content_hash: String,
    pub shards: Vec<StoredShard>,
}

/// Fault injection knobs, armed by tests.
#[derive(Default)]
pub struct Faults {
    /// Mirror PUTs for shards with these hashes always fail with 503
    pub fail_push_hashes: Mutex<HashSet<String>>,
    /// Mirror PUTs for these hashes fail N more times, then succeed
    pub flaky_push_hashes: Mutex<HashMap<String, u32>>,
    /// GETs for these shard keys serve corrupted bytes (both routes)
    pub corrupt_keys: Mutex<HashSet<String>>,
    /// GETs for these shard keys fail with 503 on the primary route only
    pub fail_get_keys: Mutex<HashSet<String>>,
    /// Delay applied to every mirror transfer, in milliseconds
    pub transfer_delay_ms: AtomicU64,
}

#[derive(Default)]
pub struct MockState {
    next_id: AtomicU64,
    pub frames: Mutex<HashMap<String, FrameState>>,
    pub files: Mutex<HashMap<String, StoredFile>>,
    pub shards: Mutex<HashMap<String, Vec<u8>>>,
    /// Mirror PUT attempts per registered shard hash
    pub push_attempts: Mutex<HashMap<String, u32>>,
    /// Pointer-list pages served
    pub pointer_pages: AtomicU64,
    pub faults: Faults,
    base_url: Mutex<String>,
}

impl MockState {
    fn mint(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn base(&self) -> String {
        self.base_url.lock().unwrap().clone()
    }

    fn token_for(frame: &str, index: u64) -> String {
        format!("tok-{frame}-{index}")
    }

    /// Shard keys of a stored file, in order (for arming faults).
    pub fn shard_keys_of(&self, file_id: &str) -> Vec<String> {
        self.files.lock().unwrap()[file_id]
            .shards
            .iter()
            .map(|s| s.key.clone())
            .collect()
    }
}

pub struct MockNet {
    pub state: Arc<MockState>,
    pub url: String,
}

pub async fn spawn_mock() -> MockNet {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let state = Arc::new(MockState::default());
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock addr");
    let url = format!("http://{addr}");
    *state.base_url.lock().unwrap() = url.clone();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });

    MockNet { state, url }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/frames", post(open_frame))
        .route("/frames/{id}", put(register_shard).delete(delete_frame))
        .route("/buckets/{bucket}/files", post(finalize_frame))
        .route("/buckets/{bucket}/files/{file}/info", get(file_info))
        .route("/buckets/{bucket}/files/{file}/pointers", get(list_pointers))
        .route("/s/{frame}/{index}", put(put_shard).get(get_shard_primary))
        .route("/alt/s/{frame}/{index}", get(get_shard_alt))
        .with_state(state)
}

// ── Bridge handlers ──────────────────────────────────────────────────────

async fn open_frame(State(state): State<Arc<MockState>>) -> Json<Frame> {
    let id = state.mint("frame");
    state
        .frames
        .lock()
        .unwrap()
        .insert(id.clone(), FrameState::default());
    Json(Frame { id })
}

async fn delete_frame(
    State(state): State<Arc<MockState>>,
    Path(frame_id): Path<String>,
) -> StatusCode {
    state.frames.lock().unwrap().remove(&frame_id);
    StatusCode::NO_CONTENT
}

async fn register_shard(
    State(state): State<Arc<MockState>>,
    Path(frame_id): Path<String>,
    Json(req): Json<RegisterShard>,
) -> Result<Json<Pointer>, StatusCode> {
    let mut frames = state.frames.lock().unwrap();
    let frame = frames.get_mut(&frame_id).ok_or(StatusCode::NOT_FOUND)?;
    frame.shards.insert(
        req.index,
        RegisteredShard {
            hash: req.hash.clone(),
            size: req.size,
        },
    );

    let base = state.base();
    Ok(Json(Pointer {
        index: req.index,
        hash: req.hash,
        size: req.size,
        url: format!("{base}/s/{frame_id}/{}", req.index),
        token: MockState::token_for(&frame_id, req.index),
        alt_url: None,
    }))
}

async fn finalize_frame(
    State(state): State<Arc<MockState>>,
    Path(bucket): Path<String>,
    Json(req): Json<FinalizeFrame>,
) -> Result<Json<FileRecord>, StatusCode> {
    let frames = state.frames.lock().unwrap();
    let frame = frames.get(&req.frame).ok_or(StatusCode::NOT_FOUND)?;

    // A frame with incomplete shard registration is never promoted
    let shards_store = state.shards.lock().unwrap();
    let mut stored = Vec::with_capacity(req.hashes.len());
    let mut size = 0u64;
    for (index, hash) in req.hashes.iter().enumerate() {
        let registered = frame
            .shards
            .get(&(index as u64))
            .filter(|s| &s.hash == hash)
            .ok_or(StatusCode::CONFLICT)?;
        let key = format!("{}/{}", req.frame, index);
        if !shards_store.contains_key(&key) {
            return Err(StatusCode::CONFLICT);
        }
        size += registered.size;
        stored.push(StoredShard {
            key,
            hash: hash.clone(),
            size: registered.size,
        });
    }
    drop(shards_store);

    let content_hash =
        cistern_crypto::content_hash(&req.hashes).map_err(|_| StatusCode::BAD_REQUEST)?;
    let id = state.mint("file");
    state.files.lock().unwrap().insert(
        id.clone(),
        StoredFile {
            bucket,
            name: req.name,
            index: req.index,
            size,
            content_hash: content_hash.clone(),
            shards: stored,
        },
    );

    Ok(Json(FileRecord { id, content_hash }))
}

async fn file_info(
    State(state): State<Arc<MockState>>,
    Path((_bucket, file_id)): Path<(String, String)>,
) -> Result<Json<FileInfo>, StatusCode> {
    let files = state.files.lock().unwrap();
    let file = files.get(&file_id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(FileInfo {
        id: file_id,
        name: file.name.clone(),
        size: file.size,
        index: file.index.clone(),
        content_hash: Some(file.content_hash.clone()),
    }))
}

#[derive(Deserialize)]
struct PageParams {
    #[serde(default)]
    skip: u64,
    #[serde(default = "default_limit")]
    limit: u64,
}

fn default_limit() -> u64 {
    16
}

async fn list_pointers(
    State(state): State<Arc<MockState>>,
    Path((_bucket, file_id)): Path<(String, String)>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<Pointer>>, StatusCode> {
    state.pointer_pages.fetch_add(1, Ordering::SeqCst);
    let files = state.files.lock().unwrap();
    let file = files.get(&file_id).ok_or(StatusCode::NOT_FOUND)?;
    let base = state.base();

    let pointers = file
        .shards
        .iter()
        .enumerate()
        .skip(page.skip as usize)
        .take(page.limit as usize)
        .map(|(index, shard)| {
            let (frame, _) = shard.key.split_once('/').expect("key shape");
            Pointer {
                index: index as u64,
                hash: shard.hash.clone(),
                size: shard.size,
                url: format!("{base}/s/{}", shard.key),
                token: MockState::token_for(frame, index as u64),
                alt_url: Some(format!("{base}/alt/s/{}", shard.key)),
            }
        })
        .collect();

    Ok(Json(pointers))
}

// ── Mirror handlers ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenParam {
    token: String,
}

async fn put_shard(
    State(state): State<Arc<MockState>>,
    Path((frame_id, index)): Path<(String, u64)>,
    Query(auth): Query<TokenParam>,
    body: Bytes,
) -> StatusCode {
    let delay = state.faults.transfer_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
    if auth.token != MockState::token_for(&frame_id, index) {
        return StatusCode::UNAUTHORIZED;
    }

    let registered_hash = {
        let frames = state.frames.lock().unwrap();
        match frames.get(&frame_id).and_then(|f| f.shards.get(&index)) {
            Some(shard) => shard.hash.clone(),
            None => return StatusCode::NOT_FOUND,
        }
    };

    *state
        .push_attempts
        .lock()
        .unwrap()
        .entry(registered_hash.clone())
        .or_insert(0) += 1;

    if state
        .faults
        .fail_push_hashes
        .lock()
        .unwrap()
        .contains(&registered_hash)
    {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    {
        let mut flaky = state.faults.flaky_push_hashes.lock().unwrap();
        if let Some(remaining) = flaky.get_mut(&registered_hash) {
            if *remaining > 0 {
                *remaining -= 1;
                return StatusCode::SERVICE_UNAVAILABLE;
            }
        }
    }

    if cistern_crypto::shard_hash(&body) != registered_hash {
        return StatusCode::BAD_REQUEST;
    }

    state
        .shards
        .lock()
        .unwrap()
        .insert(format!("{frame_id}/{index}"), body.to_vec());
    StatusCode::OK
}

async fn get_shard_primary(
    State(state): State<Arc<MockState>>,
    Path((frame_id, index)): Path<(String, u64)>,
    Query(auth): Query<TokenParam>,
) -> Result<Vec<u8>, StatusCode> {
    let key = format!("{frame_id}/{index}");
    if state.faults.fail_get_keys.lock().unwrap().contains(&key) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    serve_shard(&state, &frame_id, index, &auth.token).await
}

async fn get_shard_alt(
    State(state): State<Arc<MockState>>,
    Path((frame_id, index)): Path<(String, u64)>,
    Query(auth): Query<TokenParam>,
) -> Result<Vec<u8>, StatusCode> {
    serve_shard(&state, &frame_id, index, &auth.token).await
}

async fn serve_shard(
    state: &MockState,
    frame_id: &str,
    index: u64,
    token: &str,
) -> Result<Vec<u8>, StatusCode> {
    let delay = state.faults.transfer_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
    if token != MockState::token_for(frame_id, index) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let key = format!("{frame_id}/{index}");
    let mut bytes = state
        .shards
        .lock()
        .unwrap()
        .get(&key)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)?;

    if state.faults.corrupt_keys.lock().unwrap().contains(&key) {
        bytes[0] ^= 0xFF;
    }
    Ok(bytes)
}
