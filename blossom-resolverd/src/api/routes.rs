use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use shared::protocol::{API_PREFIX, DEFAULT_MIME_TYPE, HEADER_RESOLVED_URL, SERVER_LIST_KIND};
use shared::types::{ResolutionStatus, ServerListRecord, ServerStatus};
use crate::directory_manager::DirectoryHandle;
use crate::resolver::{ContentResolver, UploadOutcome};

#[derive(Clone)]
pub struct AppState {
    pub directory: DirectoryHandle,
    pub resolver: Arc<ContentResolver>,
}

#[derive(Serialize, Deserialize)]
pub struct UpdateResponse {
    pub accepted: usize,
}

#[derive(Serialize)]
pub struct UploadResponse {
    /// SHA-256 of the uploaded body, the blob's address
    pub hash: String,
    #[serde(flatten)]
    pub outcome: UploadOutcome,
}

#[derive(Deserialize)]
pub struct HealthQuery {
    pub url: String,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub url: String,
    pub healthy: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&format!("{}/health", API_PREFIX), get(get_health))
        .route(
            &format!("{}/users/:pubkey/servers", API_PREFIX),
            get(get_servers).put(put_servers),
        )
        .route(&format!("{}/users/:pubkey/blobs", API_PREFIX), put(put_blob))
        .route(
            &format!("{}/users/:pubkey/blobs/:hash", API_PREFIX),
            get(get_blob).head(head_blob),
        )
        .with_state(state)
}

fn internal_error(context: &str, e: anyhow::Error) -> StatusCode {
    tracing::error!("{}: {:#}", context, e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_health(
    State(state): State<AppState>,
    Query(params): Query<HealthQuery>,
) -> Json<HealthResponse> {
    let healthy = state.directory.check_server_health(&params.url).await;
    Json(HealthResponse {
        url: params.url,
        healthy,
    })
}

async fn get_servers(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> Result<Json<Vec<ServerStatus>>, StatusCode> {
    let now = Instant::now();
    let servers = state
        .directory
        .user_servers(&pubkey)
        .await
        .map_err(|e| internal_error("Failed to list servers", e))?;

    Ok(Json(servers.iter().map(|server| server.status(now)).collect()))
}

async fn put_servers(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
    Json(record): Json<ServerListRecord>,
) -> Result<Json<UpdateResponse>, StatusCode> {
    if record.pubkey != pubkey {
        tracing::warn!("Server list for {} was published by {}", pubkey, record.pubkey);
        return Err(StatusCode::BAD_REQUEST);
    }
    if record.kind != SERVER_LIST_KIND {
        tracing::warn!("Rejecting server list of kind {} for {}", record.kind, pubkey);
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let accepted = state
        .directory
        .update_server_list(&pubkey, record)
        .await
        .map_err(|e| internal_error("Failed to update server list", e))?;

    Ok(Json(UpdateResponse { accepted }))
}

async fn get_blob(
    State(state): State<AppState>,
    Path((pubkey, hash)): Path<(String, String)>,
) -> Result<Response, StatusCode> {
    let outcome = state
        .resolver
        .resolve(&pubkey, &hash)
        .await
        .map_err(|e| internal_error("Failed to resolve content", e))?;

    match outcome.status {
        ResolutionStatus::Success => {
            let resolved = outcome
                .resolved_url
                .map(|url| url.to_string())
                .unwrap_or_default();
            let headers = [
                (header::CONTENT_TYPE, outcome.mime_type),
                (HeaderName::from_static(HEADER_RESOLVED_URL), resolved),
            ];
            Ok((headers, outcome.content).into_response())
        }
        ResolutionStatus::NotFound => Err(StatusCode::NOT_FOUND),
        ResolutionStatus::Timeout => Err(StatusCode::GATEWAY_TIMEOUT),
        ResolutionStatus::NetworkError => Err(StatusCode::BAD_GATEWAY),
        ResolutionStatus::Unauthorized => Err(StatusCode::FORBIDDEN),
    }
}

async fn head_blob(
    State(state): State<AppState>,
    Path((pubkey, hash)): Path<(String, String)>,
) -> Result<Response, StatusCode> {
    let found = state
        .resolver
        .check_content_exists(&pubkey, &hash)
        .await
        .map_err(|e| internal_error("Failed to check content", e))?;

    match found {
        Some(url) => Ok((
            StatusCode::OK,
            [(HeaderName::from_static(HEADER_RESOLVED_URL), url.to_string())],
        )
            .into_response()),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn put_blob(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), StatusCode> {
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string();
    let hash = hex::encode(Sha256::digest(&body));

    let outcome = state
        .resolver
        .upload(&pubkey, &hash, body, &mime_type)
        .await
        .map_err(|e| internal_error("Failed to upload content", e))?;

    let status = if outcome.succeeded.is_empty() && !outcome.failed.is_empty() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };

    Ok((status, Json(UploadResponse { hash, outcome })))
}
