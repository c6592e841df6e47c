//! HTTP Server for the flightcheck API.
//!
//! Serves immutable error snapshots page by page and keeps one correction
//! ledger per editing session.
//!
//! # API Endpoints
//!
//! | Method | Path                                                | Description                    |
//! |--------|-----------------------------------------------------|--------------------------------|
//! | GET    | `/health`                                           | Health check                   |
//! | POST   | `/api/snapshots?name=`                              | Upload `ErrorData` JSON        |
//! | GET    | `/api/snapshots`                                    | List snapshots                 |
//! | GET    | `/api/snapshots/{id}/metadata?page_size=`           | Pagination metadata            |
//! | GET    | `/api/snapshots/{id}/categories/{name}/pages/{n}`   | One page of a category         |
//! | GET    | `/api/snapshots/{id}/compact`                       | Compact encoding               |
//! | POST   | `/api/snapshots/{id}/sessions`                      | Open an editing session        |
//! | POST   | `/api/sessions/{session}/corrections`               | Submit a corrections batch     |
//! | GET    | `/api/sessions/{session}/export/{clean\|errors}`    | Download a CSV export          |
//! | DELETE | `/api/sessions/{session}`                           | Close an editing session       |
//! | GET    | `/api/logs`                                         | SSE stream for real-time logs  |
//!
//! Sessions idle for longer than `session_ttl_secs` are dropped the next time
//! a session is opened.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{delete, get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_info, log_success, LOG_BROADCASTER};
use super::types::{
    error_response, CorrectionResponse, CreateSnapshotQuery, PageQuery, SessionResponse,
    SnapshotListResponse, SnapshotResponse,
};
use crate::cache::SnapshotRegistry;
use crate::codec::{self, OptimizedErrorData, PaginatedErrorData, ErrorMetadata};
use crate::config::EngineConfig;
use crate::corrections::{CorrectionBatch, CorrectionLedger};
use crate::error::{
    CodecError, ExportError, PipelineError, RegistryError, ServerError, ServerResult,
};
use crate::export::{export_clean, export_errors, ExportKind};
use crate::models::{ErrorData, RowIndex};
use crate::pipeline::load_error_data;

/// One editing session: a ledger bound to a snapshot.
struct Session {
    snapshot_id: String,
    data: Arc<ErrorData>,
    index: RowIndex,
    ledger: CorrectionLedger,
    last_used: Instant,
}

impl Session {
    fn touch(&mut self) {
        self.last_used = Instant::now();
    }
}

/// Shared server state
pub struct AppState {
    config: EngineConfig,
    registry: RwLock<SnapshotRegistry>,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl AppState {
    /// Build state with a registry rooted at `config.data_dir`
    pub fn new(config: EngineConfig) -> Self {
        let registry = SnapshotRegistry::with_dir(&config.data_dir);
        Self {
            config,
            registry: RwLock::new(registry),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn page_size(&self, query: PageQuery) -> usize {
        query.page_size.unwrap_or(self.config.page_size)
    }

    async fn snapshot_data(&self, id: &str) -> ServerResult<Arc<ErrorData>> {
        let registry = self.registry.read().await;
        let snapshot = registry.get(id).map_err(fail)?;
        Ok(Arc::clone(&snapshot.data))
    }

    /// Drop sessions idle for at least the configured TTL; returns how many.
    fn prune_sessions(&self, sessions: &mut HashMap<Uuid, Session>) -> usize {
        let ttl = Duration::from_secs(self.config.session_ttl_secs);
        let before = sessions.len();
        sessions.retain(|_, s| s.last_used.elapsed() < ttl);
        before - sessions.len()
    }
}

type SharedState = Arc<AppState>;

/// Build the application router
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route(
            "/api/snapshots",
            post(create_snapshot)
                .get(list_snapshots)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/snapshots/{id}/metadata", get(snapshot_metadata))
        .route(
            "/api/snapshots/{id}/categories/{name}/pages/{page}",
            get(snapshot_page),
        )
        .route("/api/snapshots/{id}/compact", get(snapshot_compact))
        .route("/api/snapshots/{id}/sessions", post(create_session))
        .route("/api/sessions/{session}", delete(delete_session))
        .route("/api/sessions/{session}/corrections", post(submit_corrections))
        .route("/api/sessions/{session}/export/{kind}", get(export_session))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let app = router(Arc::new(AppState::new(config)));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 flightcheck server running on http://localhost:{}", port);
    println!("   POST /api/snapshots                          - Upload ErrorData JSON");
    println!("   GET  /api/snapshots/{{id}}/metadata            - Pagination metadata");
    println!("   GET  /api/snapshots/{{id}}/categories/{{name}}/pages/{{n}}");
    println!("   POST /api/snapshots/{{id}}/sessions            - Open editing session");
    println!("   POST /api/sessions/{{session}}/corrections     - Submit corrections");
    println!("   GET  /api/sessions/{{session}}/export/{{kind}}   - clean | errors CSV");
    println!("   DELETE /api/sessions/{{session}}               - Close session");
    println!("   GET  /api/logs                               - SSE log stream");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// Error mapping
// =============================================================================

fn fail<E: Into<PipelineError>>(e: E) -> ServerError {
    ServerError::Pipeline(e.into())
}

fn status_of(error: &ServerError) -> StatusCode {
    match error {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::NotFound(_) => StatusCode::NOT_FOUND,
        ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::Pipeline(e) => match e {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Model(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            PipelineError::Codec(CodecError::UnknownCategory(_))
            | PipelineError::Codec(CodecError::PageOutOfRange { .. }) => StatusCode::NOT_FOUND,
            PipelineError::Codec(CodecError::InvalidPageSize) => StatusCode::BAD_REQUEST,
            PipelineError::Export(ExportError::NoQualifyingRows(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PipelineError::Export(ExportError::UnknownGroup { .. }) => StatusCode::NOT_FOUND,
            PipelineError::Export(ExportError::Model(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        let message = match &self {
            ServerError::Pipeline(PipelineError::Export(ExportError::NoQualifyingRows(kind))) => {
                format!("No rows qualify for the {} export", kind)
            }
            other => other.to_string(),
        };
        (status, Json(error_response(&message))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "flightcheck",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "snapshots": "POST /api/snapshots",
            "sessions": "POST /api/snapshots/{id}/sessions",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn create_snapshot(
    State(state): State<SharedState>,
    Query(query): Query<CreateSnapshotQuery>,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<SnapshotResponse>)> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("Empty request body".to_string()));
    }
    log_info(format!("📄 New snapshot upload ({} bytes)", body.len()));

    let data = load_error_data(&body)?;
    let metadata = codec::metadata(&data, state.config.page_size).map_err(fail)?;
    let name = query.name.unwrap_or_else(|| "snapshot".to_string());

    let mut registry = state.registry.write().await;
    let id = registry.save(data, &name).map_err(fail)?;
    let snapshot = registry.get(&id).map_err(fail)?.info.clone();
    log_success(format!("Snapshot saved: {}", id));

    Ok((StatusCode::CREATED, Json(SnapshotResponse { snapshot, metadata })))
}

async fn list_snapshots(State(state): State<SharedState>) -> Json<SnapshotListResponse> {
    let registry = state.registry.read().await;
    Json(SnapshotListResponse {
        snapshots: registry.list().into_iter().cloned().collect(),
    })
}

async fn snapshot_metadata(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ServerResult<Json<ErrorMetadata>> {
    let data = state.snapshot_data(&id).await?;
    let metadata = codec::metadata(&data, state.page_size(query)).map_err(fail)?;
    Ok(Json(metadata))
}

async fn snapshot_page(
    State(state): State<SharedState>,
    Path((id, name, page)): Path<(String, String, usize)>,
    Query(query): Query<PageQuery>,
) -> ServerResult<Json<PaginatedErrorData>> {
    let data = state.snapshot_data(&id).await?;
    let page = codec::page(&data, &name, page, state.page_size(query)).map_err(fail)?;
    Ok(Json(page))
}

async fn snapshot_compact(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ServerResult<Json<OptimizedErrorData>> {
    let data = state.snapshot_data(&id).await?;
    Ok(Json(codec::encode(&data)))
}

async fn create_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ServerResult<(StatusCode, Json<SessionResponse>)> {
    let data = state.snapshot_data(&id).await?;
    let index = RowIndex::build(&data);
    let session_id = Uuid::new_v4();

    let mut sessions = state.sessions.lock().await;
    let expired = state.prune_sessions(&mut sessions);
    if expired > 0 {
        log_info(format!("Dropped {} idle session(s)", expired));
    }
    sessions.insert(
        session_id,
        Session {
            snapshot_id: id.clone(),
            data,
            index,
            ledger: CorrectionLedger::new(),
            last_used: Instant::now(),
        },
    );
    drop(sessions);
    log_info(format!("Session {} opened on {}", session_id, id));

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id,
            snapshot_id: id,
        }),
    ))
}

async fn submit_corrections(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Json(batch): Json<CorrectionBatch>,
) -> ServerResult<Json<CorrectionResponse>> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&session_id)
        .ok_or_else(|| ServerError::NotFound(format!("session {}", session_id)))?;

    let outcome = session
        .ledger
        .submit_indexed(&session.data, &session.index, batch);
    session.touch();
    log_info(format!(
        "Session {}: {} corrections accepted, {} rejected",
        session_id,
        outcome.accepted,
        outcome.rejected.len()
    ));
    Ok(Json(CorrectionResponse::new(outcome, session.ledger.len())))
}

async fn export_session(
    State(state): State<SharedState>,
    Path((session_id, kind)): Path<(Uuid, String)>,
) -> ServerResult<Response> {
    let kind = ExportKind::parse(&kind)
        .ok_or_else(|| ServerError::BadRequest(format!("Unknown export kind '{}'", kind)))?;

    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .get_mut(&session_id)
        .ok_or_else(|| ServerError::NotFound(format!("session {}", session_id)))?;
    session.touch();

    let file = match kind {
        ExportKind::Clean => export_clean(&session.data, &session.ledger, &session.snapshot_id),
        ExportKind::Errors => export_errors(&session.data, &session.ledger, &session.snapshot_id),
    }
    .map_err(fail)?;
    log_success(format!("Export {} ({} rows)", file.filename, file.rows));

    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.content,
    )
        .into_response())
}

async fn delete_session(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> ServerResult<StatusCode> {
    let removed = state.sessions.lock().await.remove(&session_id);
    match removed {
        Some(session) => {
            log_info(format!(
                "Session {} closed ({} pending corrections dropped)",
                session_id,
                session.ledger.len()
            ));
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ServerError::NotFound(format!("session {}", session_id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_data;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn app() -> (Router, TempDir) {
        app_with(EngineConfig::default())
    }

    fn app_with(config: EngineConfig) -> (Router, TempDir) {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            page_size: 2,
            data_dir: dir.path().to_path_buf(),
            ..config
        };
        (router(Arc::new(AppState::new(config))), dir)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(v) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&v).unwrap())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload(app: &Router) -> String {
        let payload = serde_json::to_value(sample_data()).unwrap();
        let response = send(app, "POST", "/api/snapshots?name=Run%201", Some(payload)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["metadata"]["total_errors"], 6);
        json["snapshot"]["id"].as_str().unwrap().to_string()
    }

    async fn open_session(app: &Router, id: &str) -> String {
        let response = send(app, "POST", &format!("/api/snapshots/{}/sessions", id), None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["sessionId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = app();
        let response = send(&app, "GET", "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_upload_and_paginate() {
        let (app, _dir) = app();
        let id = upload(&app).await;

        let list = body_json(send(&app, "GET", "/api/snapshots", None).await).await;
        assert_eq!(list["snapshots"].as_array().unwrap().len(), 1);

        let meta = body_json(
            send(&app, "GET", &format!("/api/snapshots/{}/metadata", id), None).await,
        )
        .await;
        assert_eq!(meta["categories"][0]["total_pages"], 2);

        let page = body_json(
            send(
                &app,
                "GET",
                &format!("/api/snapshots/{}/categories/SEQUENCE_ERRORS/pages/2?page_size=3", id),
                None,
            )
            .await,
        )
        .await;
        assert_eq!(page["errors_on_page"], 1);
        assert_eq!(page["total_pages"], 2);

        let out_of_range = send(
            &app,
            "GET",
            &format!("/api/snapshots/{}/categories/SEQUENCE_ERRORS/pages/3", id),
            None,
        )
        .await;
        assert_eq!(out_of_range.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_rejects_schema_violation() {
        let (app, _dir) = app();
        let response = send(&app, "POST", "/api/snapshots", Some(json!({ "rows_data": [] }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["status"], "error");
    }

    #[tokio::test]
    async fn test_unknown_snapshot() {
        let (app, _dir) = app();
        let response = send(&app, "GET", "/api/snapshots/missing/compact", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_compact_endpoint_decodes() {
        let (app, _dir) = app();
        let id = upload(&app).await;
        let response = send(&app, "GET", &format!("/api/snapshots/{}/compact", id), None).await;
        let payload: OptimizedErrorData =
            serde_json::from_value(body_json(response).await).unwrap();
        let decoded = codec::decode(&payload).unwrap();
        assert_eq!(decoded.summary.total_errors, 6);
    }

    #[tokio::test]
    async fn test_session_corrections_and_export() {
        let (app, _dir) = app();
        let id = upload(&app).await;
        let session = open_session(&app, &id).await;

        let batch = json!({
            "42": { "Fuel": "125", "Date": "2024-01-01", "Flight": "TK0" },
            "11": { "Destination ICAO": "LTAX" }
        });
        let response = send(
            &app,
            "POST",
            &format!("/api/sessions/{}/corrections", session),
            Some(batch),
        )
        .await;
        let json = body_json(response).await;
        assert_eq!(json["accepted"], 2);
        assert_eq!(json["rejected"].as_array().unwrap().len(), 2);
        assert_eq!(json["pending"], 2);

        let response = send(&app, "GET", &format!("/api/sessions/{}/export/clean", session), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.contains("_clean.csv"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(csv.contains("TK9"));
        assert!(csv.contains("TK5"));
    }

    #[tokio::test]
    async fn test_export_without_rows_is_unprocessable() {
        let (app, _dir) = app();
        let id = upload(&app).await;
        let session = open_session(&app, &id).await;

        let batch = json!({
            "10": { "Fuel": 1 }, "11": { "Fuel": 1 }, "12": { "Fuel": 1 }, "13": { "Fuel": 1 },
            "42": { "Fuel": "125", "Date": "2024-01-01" }
        });
        send(&app, "POST", &format!("/api/sessions/{}/corrections", session), Some(batch)).await;

        let response = send(&app, "GET", &format!("/api/sessions/{}/export/errors", session), None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("errors export"));
    }

    #[tokio::test]
    async fn test_unknown_session_and_kind() {
        let (app, _dir) = app();
        let missing = Uuid::new_v4();
        let response = send(&app, "GET", &format!("/api/sessions/{}/export/clean", missing), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let id = upload(&app).await;
        let session = open_session(&app, &id).await;
        let response = send(&app, "GET", &format!("/api/sessions/{}/export/pdf", session), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deleted_session_is_gone() {
        let (app, _dir) = app();
        let id = upload(&app).await;
        let session = open_session(&app, &id).await;

        let response = send(&app, "DELETE", &format!("/api/sessions/{}", session), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, "GET", &format!("/api/sessions/{}/export/errors", session), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&app, "DELETE", &format!("/api/sessions/{}", session), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_idle_sessions_dropped_on_open() {
        let (app, _dir) = app_with(EngineConfig {
            session_ttl_secs: 0,
            ..EngineConfig::default()
        });
        let id = upload(&app).await;
        let first = open_session(&app, &id).await;
        let _second = open_session(&app, &id).await;

        let response = send(&app, "GET", &format!("/api/sessions/{}/export/errors", first), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_active_sessions_survive_open() {
        let (app, _dir) = app();
        let id = upload(&app).await;
        let first = open_session(&app, &id).await;
        let _second = open_session(&app, &id).await;

        let response = send(&app, "GET", &format!("/api/sessions/{}/export/errors", first), None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
