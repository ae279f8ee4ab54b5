use crate::core::{Block, Tracker, TrackerDraft};
use crate::error::{LedgerError, Result};
use crate::node::{CheckpointCompletion, Node};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------- server --

/// Build the HTTP surface: the peer push/pull endpoints plus the
/// collaborator-facing API consumed by the external web layer.
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/p2p/latest-block", get(latest_block))
        .route("/p2p/chain", get(full_chain))
        .route("/p2p/mempool", get(pool_snapshot).post(receive_pool_entry))
        .route("/p2p/block", post(receive_block))
        .route("/api/trackers", get(list_trackers).post(create_tracker))
        .route("/api/trackers/:id", get(get_tracker))
        .route("/api/blocks", get(list_blocks))
        .route("/api/checkpoints/complete", post(complete_checkpoint))
        .route("/api/decrypt-note", post(decrypt_note))
        .route("/api/miner/mine", post(mine))
        .route("/api/sync/run", post(run_sync))
        .with_state(node)
}

/// Run the HTTP server on a dedicated runtime. Blocks the calling thread
/// for the lifetime of the process.
pub fn serve(node: Arc<Node>, addr: &str) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| LedgerError::Io(format!("Failed to start HTTP runtime: {e}")))?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| LedgerError::Io(format!("Failed to bind HTTP listener on {addr}: {e}")))?;
        info!("HTTP server listening on {addr}");
        axum::serve(listener, router(node))
            .await
            .map_err(|e| LedgerError::Io(format!("HTTP server terminated: {e}")))
    })
}

/// Maps the error taxonomy onto HTTP statuses for the API surface.
struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::Validation(_) | LedgerError::RejectedBlock(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn latest_block(State(node): State<Arc<Node>>) -> Json<Block> {
    Json(node.chain().last_block())
}

async fn full_chain(State(node): State<Arc<Node>>) -> Json<Vec<Block>> {
    Json(node.chain().get_all())
}

async fn pool_snapshot(State(node): State<Arc<Node>>) -> Json<Vec<Tracker>> {
    Json(node.mempool().get_all())
}

async fn receive_block(
    State(node): State<Arc<Node>>,
    Json(block): Json<Block>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let applied = node.receive_block(&block)?;
    Ok(Json(json!({ "applied": applied })))
}

async fn receive_pool_entry(
    State(node): State<Arc<Node>>,
    Json(tx): Json<Tracker>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    node.mempool().add_if_not_exists(tx)?;
    Ok(Json(json!({ "status": "tracker synced" })))
}

async fn list_trackers(State(node): State<Arc<Node>>) -> Json<Vec<Tracker>> {
    Json(node.trackers())
}

async fn create_tracker(
    State(node): State<Arc<Node>>,
    Json(draft): Json<TrackerDraft>,
) -> std::result::Result<Json<Tracker>, ApiError> {
    Ok(Json(node.create_tracker(draft)?))
}

async fn get_tracker(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Tracker>, ApiError> {
    Ok(Json(node.tracker_by_id(&id)?))
}

async fn list_blocks(State(node): State<Arc<Node>>) -> Json<Vec<Block>> {
    Json(node.chain().get_all())
}

async fn complete_checkpoint(
    State(node): State<Arc<Node>>,
    Json(input): Json<CheckpointCompletion>,
) -> std::result::Result<Json<Tracker>, ApiError> {
    Ok(Json(node.complete_checkpoint(input)?))
}

#[derive(Deserialize)]
struct NoteRequest {
    tracker_id: String,
    address: String,
}

async fn decrypt_note(
    State(node): State<Arc<Node>>,
    Json(input): Json<NoteRequest>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let note = node.decrypt_note(&input.tracker_id, &input.address)?;
    Ok(Json(json!({ "note": note })))
}

// Mining is CPU-bound and the sync pass does blocking network I/O; both are
// pushed off the async runtime onto the blocking pool.
async fn mine(
    State(node): State<Arc<Node>>,
) -> std::result::Result<Json<Option<Block>>, ApiError> {
    let mined = tokio::task::spawn_blocking(move || node.mine_once())
        .await
        .map_err(|e| ApiError(LedgerError::Io(format!("Mining task failed: {e}"))))??;
    Ok(Json(mined))
}

async fn run_sync(
    State(node): State<Arc<Node>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let peers = tokio::task::spawn_blocking(move || node.sync_once())
        .await
        .map_err(|e| ApiError(LedgerError::Io(format!("Sync task failed: {e}"))))?;
    Ok(Json(json!({ "peers_synced": peers })))
}

// ---------------------------------------------------------------- client --

static HTTP_CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client - this should never happen")
});

fn peer_unavailable(addr: &str, err: reqwest::Error) -> LedgerError {
    LedgerError::PeerUnavailable(format!("{addr}: {err}"))
}

pub fn fetch_latest_block(addr: &str) -> Result<Block> {
    HTTP_CLIENT
        .get(format!("http://{addr}/p2p/latest-block"))
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .and_then(|response| response.json())
        .map_err(|e| peer_unavailable(addr, e))
}

pub fn fetch_chain(addr: &str) -> Result<Vec<Block>> {
    HTTP_CLIENT
        .get(format!("http://{addr}/p2p/chain"))
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .and_then(|response| response.json())
        .map_err(|e| peer_unavailable(addr, e))
}

pub fn fetch_pool(addr: &str) -> Result<Vec<Tracker>> {
    HTTP_CLIENT
        .get(format!("http://{addr}/p2p/mempool"))
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .and_then(|response| response.json())
        .map_err(|e| peer_unavailable(addr, e))
}

pub fn push_block(addr: &str, block: &Block) -> Result<()> {
    HTTP_CLIENT
        .post(format!("http://{addr}/p2p/block"))
        .json(block)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map(|_| ())
        .map_err(|e| peer_unavailable(addr, e))
}

pub fn push_transaction(addr: &str, tx: &Tracker) -> Result<()> {
    HTTP_CLIENT
        .post(format!("http://{addr}/p2p/mempool"))
        .json(tx)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map(|_| ())
        .map_err(|e| peer_unavailable(addr, e))
}
