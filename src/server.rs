//! HTTP control API
//!
//! A small JSON router exposing the supervisor operations to the local
//! UI. Mutating operations run on the blocking pool because the
//! supervisor serializes them behind its mutex with bounded waits inside.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::error::SupervisorError;
use crate::node::SyncStatus;
use crate::supervisor::{NodeMode, ServerStatus, Supervisor};
use crate::wallet::Secret;

#[derive(Clone)]
struct AppState {
    supervisor: Arc<Supervisor>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct OkResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl OkResponse {
    fn new() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }
}

#[derive(Deserialize)]
struct UnlockRequest {
    wallet: String,
    password: String,
    #[serde(default)]
    node: Option<String>,
}

#[derive(Deserialize)]
struct CreateRequest {
    wallet: String,
    password: String,
}

#[derive(Deserialize)]
struct RestoreRequest {
    wallet: String,
    password: String,
    seed_phrase: String,
}

#[derive(Deserialize)]
struct RescanRequest {
    #[serde(default)]
    wallet: Option<String>,
    password: String,
}

#[derive(Deserialize)]
struct ExportKeyRequest {
    wallet: String,
    password: String,
}

#[derive(Deserialize)]
struct NodeStartRequest {
    #[serde(default)]
    owner_key: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Deserialize)]
struct SwitchRequest {
    mode: NodeMode,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    wallet: Option<String>,
    #[serde(default)]
    node: Option<String>,
}

#[derive(Serialize)]
struct WalletsResponse {
    wallets: Vec<String>,
    active: Option<String>,
}

#[derive(Serialize)]
struct CreateResponse {
    success: bool,
    wallet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed_phrase: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct UnlockResponse {
    success: bool,
    wallet: String,
}

#[derive(Serialize)]
struct RescanResponse {
    success: bool,
    rescan: bool,
    message: String,
}

#[derive(Serialize)]
struct ExportKeyResponse {
    success: bool,
    owner_key: String,
}

#[derive(Serialize)]
struct NodeStartResponse {
    success: bool,
    pid: u32,
}

/// Serve the control API until SIGINT
pub async fn serve(supervisor: Arc<Supervisor>, addr: SocketAddr) -> anyhow::Result<()> {
    let state = AppState { supervisor };
    let router = Router::new()
        .route("/api/status", get(status))
        .route("/api/wallets", get(wallets))
        .route("/api/node/status", get(node_status))
        .route("/api/wallet/unlock", post(unlock))
        .route("/api/wallet/lock", post(lock))
        .route("/api/wallet/create", post(create_wallet))
        .route("/api/wallet/restore", post(restore_wallet))
        .route("/api/wallet/rescan", post(rescan))
        .route("/api/wallet/export_owner_key", post(export_owner_key))
        .route("/api/wallet/:name", delete(delete_wallet))
        .route("/api/node/start", post(node_start))
        .route("/api/node/stop", post(node_stop))
        .route("/api/node/switch", post(node_switch))
        .route("/api/cleanup", post(cleanup))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    log::info!("Control API listening on http://{}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    log::info!("SIGINT received, shutting down");
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Run a supervisor call on the blocking pool
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, HandlerError>
where
    T: Send + 'static,
    F: FnOnce(&Supervisor) -> T + Send + 'static,
{
    let supervisor = state.supervisor.clone();
    tokio::task::spawn_blocking(move || f(&supervisor))
        .await
        .map_err(|e| internal_error(e.to_string()))
}

// ============================================================================
// Status handlers
// ============================================================================

async fn status(State(state): State<AppState>) -> Result<Json<ServerStatus>, HandlerError> {
    blocking(&state, |s| s.status()).await.map(Json)
}

async fn wallets(State(state): State<AppState>) -> Result<Json<WalletsResponse>, HandlerError> {
    let (wallets, active) = blocking(&state, |s| s.wallets()).await?;
    Ok(Json(WalletsResponse { wallets, active }))
}

async fn node_status(State(state): State<AppState>) -> Result<Json<SyncStatus>, HandlerError> {
    blocking(&state, |s| s.node_status()).await.map(Json)
}

// ============================================================================
// Wallet handlers
// ============================================================================

async fn unlock(
    State(state): State<AppState>,
    Json(req): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, HandlerError> {
    let wallet = req.wallet.clone();
    blocking(&state, move |s| {
        s.unlock(&req.wallet, Secret::new(req.password), req.node.as_deref())
    })
    .await?
    .map(|_| {
        Json(UnlockResponse {
            success: true,
            wallet,
        })
    })
    .map_err(to_http_error)
}

async fn lock(State(state): State<AppState>) -> Result<Json<OkResponse>, HandlerError> {
    blocking(&state, |s| s.lock()).await?;
    Ok(Json(OkResponse::with_message("Wallet locked")))
}

async fn create_wallet(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, HandlerError> {
    blocking(&state, move |s| {
        s.create_wallet(&req.wallet, &Secret::new(req.password))
    })
    .await?
    .map(|created| {
        Json(CreateResponse {
            success: true,
            wallet: created.name,
            seed_phrase: created.seed_phrase,
            message: "Wallet created successfully. Save your seed phrase!".to_string(),
        })
    })
    .map_err(to_http_error)
}

async fn restore_wallet(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<OkResponse>, HandlerError> {
    blocking(&state, move |s| {
        s.restore_wallet(&req.wallet, &Secret::new(req.password), &req.seed_phrase)
    })
    .await?
    .map(|_| {
        Json(OkResponse::with_message(
            "Wallet restored successfully. Use Settings > Rescan if balances appear incorrect.",
        ))
    })
    .map_err(to_http_error)
}

async fn rescan(
    State(state): State<AppState>,
    Json(req): Json<RescanRequest>,
) -> Result<Json<RescanResponse>, HandlerError> {
    blocking(&state, move |s| {
        s.rescan(req.wallet.as_deref(), Secret::new(req.password))
    })
    .await?
    .map(|rescanning| {
        let message = if rescanning {
            "Wallet connected to local node. Rescan in progress..."
        } else {
            "Connected without rescan; local node could not be started with the owner key."
        };
        Json(RescanResponse {
            success: true,
            rescan: rescanning,
            message: message.to_string(),
        })
    })
    .map_err(to_http_error)
}

async fn export_owner_key(
    State(state): State<AppState>,
    Json(req): Json<ExportKeyRequest>,
) -> Result<Json<ExportKeyResponse>, HandlerError> {
    blocking(&state, move |s| {
        s.export_owner_key(&req.wallet, Secret::new(req.password))
    })
    .await?
    .map(|owner_key| {
        Json(ExportKeyResponse {
            success: true,
            owner_key,
        })
    })
    .map_err(to_http_error)
}

async fn delete_wallet(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<OkResponse>, HandlerError> {
    let message = format!("Wallet '{}' deleted", name);
    blocking(&state, move |s| s.delete_wallet(&name))
        .await?
        .map(|_| Json(OkResponse::with_message(message)))
        .map_err(to_http_error)
}

// ============================================================================
// Node handlers
// ============================================================================

async fn node_start(
    State(state): State<AppState>,
    Json(req): Json<NodeStartRequest>,
) -> Result<Json<NodeStartResponse>, HandlerError> {
    blocking(&state, move |s| {
        s.start_node(
            req.owner_key.map(Secret::new),
            req.password.map(Secret::new),
        )
    })
    .await?
    .map(|pid| Json(NodeStartResponse { success: true, pid }))
    .map_err(to_http_error)
}

async fn node_stop(State(state): State<AppState>) -> Result<Json<OkResponse>, HandlerError> {
    blocking(&state, |s| s.stop_node()).await?;
    Ok(Json(OkResponse::new()))
}

async fn node_switch(
    State(state): State<AppState>,
    Json(req): Json<SwitchRequest>,
) -> Result<Json<OkResponse>, HandlerError> {
    blocking(&state, move |s| {
        s.switch(
            req.mode,
            req.password.map(Secret::new),
            req.wallet.as_deref(),
            req.node.as_deref(),
        )
    })
    .await?
    .map(|_| Json(OkResponse::new()))
    .map_err(to_http_error)
}

async fn cleanup(State(state): State<AppState>) -> Result<Json<OkResponse>, HandlerError> {
    blocking(&state, |s| s.cleanup()).await?;
    Ok(Json(OkResponse::new()))
}

// ============================================================================
// Error mapping
// ============================================================================

fn to_http_error(err: SupervisorError) -> HandlerError {
    let status = match err.root() {
        SupervisorError::InvalidCredential => StatusCode::UNAUTHORIZED,
        SupervisorError::WalletNotFound(_) => StatusCode::NOT_FOUND,
        SupervisorError::WalletExists(_) | SupervisorError::WalletOperation(_) => {
            StatusCode::BAD_REQUEST
        }
        SupervisorError::ResourceBusy(_) => StatusCode::CONFLICT,
        SupervisorError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn internal_error(message: String) -> HandlerError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
}
