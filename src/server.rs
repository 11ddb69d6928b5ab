//! HTTP front end.
//!
//! Every browser tab (or API client) works through its own [`Session`],
//! addressed by the id returned from `POST /sessions`. Answers stream back
//! as Server-Sent Events so text can be shown as it is generated.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/sessions` | Create a session |
//! | `GET`    | `/sessions/{id}` | Session status |
//! | `DELETE` | `/sessions/{id}` | End a session and drop its document |
//! | `PUT`    | `/sessions/{id}/document?name=` | Upload a PDF (raw request body) |
//! | `POST`   | `/sessions/{id}/ask` | Ask a question, streamed as SSE |
//! | `GET`    | `/sessions/{id}/history` | Completed turns |
//! | `DELETE` | `/sessions/{id}/history` | Clear the conversation |
//!
//! # Streaming
//!
//! `POST /sessions/{id}/ask` answers with `text/event-stream`:
//!
//! | Event | Data |
//! |-------|------|
//! | `token` | a piece of answer text, as a JSON string |
//! | `sources` | JSON array of retrieved chunks, best first |
//! | `done` | JSON `{"chars": n}` once the turn is recorded |
//! | `error` | JSON error detail; the turn is not recorded |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_document", "message": "no document loaded; upload a PDF first" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `no_document` (409),
//! `ingestion_failed` (422), `generation_failed` (502), `internal` (500).
//!
//! # Idle sessions
//!
//! Clients that never send `DELETE /sessions/{id}` are cleaned up anyway:
//! a session untouched for `[server].session_ttl_secs` is ended by a
//! background sweep, which also deletes its staged upload.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::{Config, Secrets};
use crate::models::{ConversationTurn, RetrievedChunk};
use crate::providers::Providers;
use crate::session::{Session, SessionError, SessionState, UploadOutcome};

const DEFAULT_UPLOAD_NAME: &str = "document.pdf";

/// A registered session and when a request last touched it.
struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_active: std::sync::Mutex<Instant>,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            last_active: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_active.lock() {
            *last = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    providers: Providers,
    sessions: Arc<RwLock<HashMap<Uuid, SessionSlot>>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, providers: Providers) -> Self {
        Self {
            config,
            providers,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look up a session, marking it active.
    fn session(&self, id: Uuid) -> Result<Arc<Mutex<Session>>, AppError> {
        let sessions = self.sessions.read().map_err(|_| internal("session table poisoned"))?;
        let slot = sessions
            .get(&id)
            .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
        slot.touch();
        Ok(slot.session.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().map_or(0, |s| s.len())
    }

    /// End every session idle for longer than `ttl`.
    ///
    /// A session whose lock is held (an upload or answer in progress) counts
    /// as active. Returns how many sessions were ended.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        let Ok(mut sessions) = self.sessions.write() else {
            return 0;
        };
        let before = sessions.len();
        sessions.retain(|id, slot| {
            let keep = slot.idle_for() <= ttl || slot.session.try_lock().is_err();
            if !keep {
                tracing::info!(session = %id, "idle session ended");
            }
            keep
        });
        before - sessions.len()
    }
}

/// Periodically end sessions idle past `ttl`.
fn spawn_session_sweeper(state: AppState, ttl: Duration) {
    let period = (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            state.sweep_idle(ttl);
        }
    });
}

/// Starts the HTTP server.
///
/// Reads API keys from the environment, builds the configured providers,
/// and serves on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let secrets = Secrets::from_env(config)?;
    let providers = Providers::from_config(config, &secrets)?;
    let state = AppState::new(Arc::new(config.clone()), providers);

    if config.server.session_ttl_secs > 0 {
        spawn_session_sweeper(
            state.clone(),
            Duration::from_secs(config.server.session_ttl_secs),
        );
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// The full route table, for serving or for tests.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload = state.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}",
            get(handle_session_status).delete(handle_delete_session),
        )
        .route(
            "/sessions/{id}/document",
            put(handle_upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/sessions/{id}/ask", post(handle_ask))
        .route(
            "/sessions/{id}/history",
            get(handle_history).delete(handle_clear_history),
        )
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Machine-readable code plus a human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code.to_string(),
            message: self.message.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.detail(),
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let (status, code) = match &err {
            SessionError::NoDocument => (StatusCode::CONFLICT, "no_document"),
            SessionError::EmptyQuery => (StatusCode::BAD_REQUEST, "bad_request"),
            SessionError::Ingestion(_) => (StatusCode::UNPROCESSABLE_ENTITY, "ingestion_failed"),
            SessionError::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Sessions ============

/// JSON body for session status, also returned on creation.
#[derive(Serialize)]
struct SessionStatus {
    id: Uuid,
    state: SessionState,
    document: Option<String>,
    chunks: usize,
    turns: usize,
}

impl SessionStatus {
    fn of(session: &Session) -> Self {
        Self {
            id: session.id(),
            state: session.state(),
            document: session.document_name().map(str::to_string),
            chunks: session.chunk_count(),
            turns: session.history().len(),
        }
    }
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionStatus>), AppError> {
    let session = Session::new(state.config.clone(), state.providers.clone());
    let status = SessionStatus::of(&session);

    state
        .sessions
        .write()
        .map_err(|_| internal("session table poisoned"))?
        .insert(session.id(), SessionSlot::new(session));

    tracing::info!(session = %status.id, "session created");
    Ok((StatusCode::CREATED, Json(status)))
}

async fn handle_session_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatus>, AppError> {
    let session = state.session(id)?;
    let session = session.lock().await;
    Ok(Json(SessionStatus::of(&session)))
}

/// Removes the session. A response still streaming keeps it alive until
/// the stream finishes; its staged upload is deleted after that.
async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let removed = state
        .sessions
        .write()
        .map_err(|_| internal("session table poisoned"))?
        .remove(&id);

    match removed {
        Some(_) => {
            tracing::info!(session = %id, "session ended");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(not_found(format!("no session with id: {}", id))),
    }
}

// ============ PUT /sessions/{id}/document ============

#[derive(Deserialize)]
struct UploadParams {
    name: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    #[serde(flatten)]
    outcome: UploadOutcome,
    name: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    if body.is_empty() {
        return Err(bad_request("request body must contain a PDF file"));
    }
    let name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());

    let session = state.session(id)?;
    let mut session = session.lock().await;
    let outcome = session.upload(&name, &body).await?;

    Ok(Json(UploadResponse { outcome, name }))
}

// ============ POST /sessions/{id}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    query: String,
}

#[derive(Serialize)]
struct DoneEvent {
    chars: usize,
}

/// Streams the answer as SSE.
///
/// Request-level problems (unknown session, empty query, no document) are
/// ordinary JSON errors. Once streaming has started, a failure arrives as
/// an `error` event instead.
async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    req: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(req) = req.map_err(|e| bad_request(e.body_text()))?;
    if req.query.trim().is_empty() {
        return Err(SessionError::EmptyQuery.into());
    }

    let mut session = state.session(id)?.lock_owned().await;
    if session.document_name().is_none() {
        return Err(SessionError::NoDocument.into());
    }

    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    // Generation runs to completion even if the client goes away, so the
    // turn still lands in history.
    tokio::spawn(async move {
        let token_tx = tx.clone();
        let result = session
            .ask(&req.query, |token| {
                let _ = token_tx.send(token_event(token));
            })
            .await;

        let events = match result {
            Ok(turn) => finished_events(&turn),
            Err(e) => {
                tracing::warn!(session = %session.id(), error = %e, "answer failed");
                vec![error_event(&AppError::from(e))]
            }
        };
        for event in events {
            let _ = tx.send(event);
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Tokens go out JSON-encoded so carriage returns and newlines survive
/// SSE line framing unchanged.
fn token_event(token: &str) -> Event {
    let data = serde_json::to_string(token).unwrap_or_default();
    Event::default().event("token").data(data)
}

fn finished_events(turn: &ConversationTurn) -> Vec<Event> {
    let sources: &[RetrievedChunk] = &turn.sources;
    let done = DoneEvent {
        chars: turn.response.chars().count(),
    };
    match (serde_json::to_string(sources), serde_json::to_string(&done)) {
        (Ok(sources), Ok(done)) => vec![
            Event::default().event("sources").data(sources),
            Event::default().event("done").data(done),
        ],
        (Err(e), _) | (_, Err(e)) => vec![error_event(&internal(e.to_string()))],
    }
}

fn error_event(err: &AppError) -> Event {
    let data = serde_json::to_string(&err.detail())
        .unwrap_or_else(|_| format!("{{\"code\":\"{}\"}}", err.code));
    Event::default().event("error").data(data)
}

// ============ /sessions/{id}/history ============

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ConversationTurn>>, AppError> {
    let session = state.session(id)?;
    let session = session.lock().await;
    Ok(Json(session.history().to_vec()))
}

async fn handle_clear_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = state.session(id)?;
    session.lock().await.clear_history();
    Ok(StatusCode::NO_CONTENT)
}
