//! HTTP server: the chat page and its JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/sessions` | Open a live session |
//! | `GET`  | `/api/sessions/{id}` | Live session with messages |
//! | `DELETE` | `/api/sessions/{id}` | Close a live session |
//! | `POST` | `/api/sessions/{id}/messages` | Send a message, get the reply |
//! | `POST` | `/api/sessions/{id}/clear` | Reset to the welcome message |
//! | `GET`  | `/api/sessions/{id}/stats` | Message counts and duration |
//! | `GET`  | `/api/sessions/{id}/export?format=` | Download as txt, md or json |
//! | `POST` | `/api/sessions/{id}/save` | Persist and index |
//! | `POST` | `/api/sessions/{id}/upload?filename=` | Attach a text file (raw body) |
//! | `GET`/`PUT` | `/api/sessions/{id}/preferences` | Read or patch preferences |
//! | `GET`  | `/api/saved` | Saved chats, newest first |
//! | `GET`  | `/api/saved/{id}/summary` | First and last turns of a saved chat |
//! | `POST` | `/api/saved/{id}/load` | Reopen a saved chat |
//! | `DELETE` | `/api/saved/{id}` | Delete a saved chat |
//! | `GET`  | `/api/search?q=&limit=` | Retrieval preview |
//! | `POST` | `/api/index/rebuild` | Re-embed every saved chat |
//! | `GET`  | `/api/stats` | Store, index and model status |
//! | `GET`  | `/api/models` | Selectable models |
//! | `PUT`  | `/api/models/current` | Switch model |
//! | `GET`  | `/api/themes` | Colour palettes |
//! | `GET`  | `/api/examples` | Example prompts |
//! | `POST` | `/api/analyze` | Intent, entities and reply openers for a message |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message is empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `payload_too_large` (413), `internal` (500). Malformed JSON bodies and
//! query strings are reported as `bad_request` in the same envelope.

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        DefaultBodyLimit, FromRequest, FromRequestParts, OptionalFromRequest, Path, Query, Request,
        State,
    },
    http::{header, request::Parts, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::{ChatError, ChatService, EXAMPLE_PROMPTS};
use crate::config::Config;
use crate::export::{export_filename, export_session, ExportFormat};
use crate::llm::{ModelInfo, ModelStatus};
use crate::models::{ChatSession, ContextHit, Message, SessionSummary, UserPreferences};
use crate::rag::RagStats;
use crate::session::{PreferencesPatch, SessionStats};
use crate::text::{
    extract_code_blocks, parse_user_input, response_suggestions, split_code_segments, CodeBlock,
    ParsedInput, Segment,
};
use crate::theme::{self, ThemeInfo};
use crate::ui;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    chat: Arc<ChatService>,
}

/// Build the chat service from `config` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let chat = Arc::new(ChatService::from_config(Arc::new(config.clone())).await?);

    let app = router(chat);

    tracing::info!(addr = %bind_addr, "chat server listening");
    println!("SmartBot listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The full router over an existing service.
pub fn router(chat: Arc<ChatService>) -> Router {
    // Room for the file plus request framing
    let body_limit = chat.config().uploads.max_file_size + 64 * 1024;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/sessions", post(handle_create_session))
        .route(
            "/api/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/api/sessions/{id}/messages", post(handle_send_message))
        .route("/api/sessions/{id}/clear", post(handle_clear_session))
        .route("/api/sessions/{id}/stats", get(handle_session_stats))
        .route("/api/sessions/{id}/export", get(handle_export))
        .route("/api/sessions/{id}/save", post(handle_save))
        .route("/api/sessions/{id}/upload", post(handle_upload))
        .route(
            "/api/sessions/{id}/preferences",
            get(handle_get_preferences).put(handle_update_preferences),
        )
        .route("/api/saved", get(handle_list_saved))
        .route("/api/saved/{id}", axum::routing::delete(handle_delete_saved))
        .route("/api/saved/{id}/summary", get(handle_saved_summary))
        .route("/api/saved/{id}/load", post(handle_load_saved))
        .route("/api/search", get(handle_search))
        .route("/api/index/rebuild", post(handle_rebuild_index))
        .route("/api/stats", get(handle_stats))
        .route("/api/models", get(handle_list_models))
        .route("/api/models/current", axum::routing::put(handle_set_model))
        .route("/api/themes", get(handle_themes))
        .route("/api/examples", get(handle_examples))
        .route("/api/analyze", post(handle_analyze))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(AppState { chat })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn payload_too_large(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        code: "payload_too_large".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::EmptyMessage
            | ChatError::UnsupportedFileType(_)
            | ChatError::InvalidEncoding => bad_request(message),
            ChatError::SessionNotFound(_) | ChatError::SavedChatNotFound(_) => not_found(message),
            ChatError::FileTooLarge { .. } => payload_too_large(message),
            ChatError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                internal(message)
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        internal(err.to_string())
    }
}

fn rejection(status: StatusCode, message: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large(message)
    } else {
        bad_request(message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        rejection(err.status(), err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        rejection(err.status(), err.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(err: BytesRejection) -> Self {
        rejection(err.status(), err.body_text())
    }
}

/// `Json` whose rejections use the API error envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<S, T> OptionalFromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let value = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(value.map(|Json(v)| Self(v)))
    }
}

/// `Query` whose rejections use the API error envelope.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn live_session(state: &AppState, id: &str) -> Result<ChatSession, ApiError> {
    state
        .chat
        .sessions()
        .get(id)
        .await
        .ok_or_else(|| not_found(format!("session not found: {}", id)))
}

// ============ GET / and /health ============

async fn handle_index(State(state): State<AppState>) -> Html<String> {
    Html(ui::render_page(&state.chat.config().app.title))
}

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

// ============ Live sessions ============

#[derive(Serialize)]
struct SessionResponse {
    session: ChatSession,
    preferences: UserPreferences,
}

async fn handle_create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let session = state.chat.sessions().create_session().await;
    let preferences = state.chat.sessions().preferences(&session.id).await;
    Json(SessionResponse {
        session,
        preferences,
    })
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = live_session(&state, &id).await?;
    let preferences = state.chat.sessions().preferences(&id).await;
    Ok(Json(SessionResponse {
        session,
        preferences,
    }))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    if !state.chat.sessions().remove(&id).await {
        return Err(not_found(format!("session not found: {}", id)));
    }
    Ok(Json(serde_json::json!({ "closed": id })))
}

#[derive(Deserialize)]
struct SendRequest {
    content: String,
    #[serde(default)]
    use_rag: Option<bool>,
}

#[derive(Serialize)]
struct SendResponse {
    message: Message,
    segments: Vec<Segment>,
}

async fn handle_send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<SendRequest>,
) -> ApiResult<SendResponse> {
    let message = state.chat.send(&id, &req.content, req.use_rag).await?;
    let segments = split_code_segments(&message.content);
    Ok(Json(SendResponse { message, segments }))
}

async fn handle_clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ChatSession> {
    live_session(&state, &id).await?;
    Ok(Json(state.chat.sessions().clear(&id).await))
}

async fn handle_session_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionStats> {
    state
        .chat
        .sessions()
        .stats(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("session not found: {}", id)))
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

async fn handle_export(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<ExportQuery>,
) -> Result<Response, ApiError> {
    let session = live_session(&state, &id).await?;
    let format_name = match q.format {
        Some(f) => f,
        None => state.chat.sessions().preferences(&id).await.export_format,
    };
    let format: ExportFormat = format_name
        .parse()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;

    let now = Utc::now();
    let body = export_session(&session, format, now)?;
    let disposition = format!("attachment; filename=\"{}\"", export_filename(format, now));

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

#[derive(Deserialize, Default)]
struct SaveRequest {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Serialize)]
struct SaveResponse {
    id: String,
    name: Option<String>,
    message_count: usize,
}

async fn handle_save(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<ApiJson<SaveRequest>>,
) -> ApiResult<SaveResponse> {
    let req = body.map(|ApiJson(r)| r).unwrap_or_default();
    let session = state
        .chat
        .save(&id, req.name.as_deref(), req.description.as_deref())
        .await?;
    Ok(Json(SaveResponse {
        id: session.id,
        name: session.name,
        message_count: session.messages.len(),
    }))
}

#[derive(Deserialize)]
struct UploadQuery {
    filename: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<UploadQuery>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<crate::chat::UploadOutcome>, ApiError> {
    let body = body?;
    let outcome = state.chat.upload(&id, &q.filename, &body).await?;
    Ok(Json(outcome))
}

async fn handle_get_preferences(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<UserPreferences> {
    live_session(&state, &id).await?;
    Ok(Json(state.chat.sessions().preferences(&id).await))
}

async fn handle_update_preferences(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<PreferencesPatch>,
) -> ApiResult<UserPreferences> {
    live_session(&state, &id).await?;
    Ok(Json(
        state.chat.sessions().update_preferences(&id, patch).await,
    ))
}

// ============ Saved chats ============

#[derive(Serialize)]
struct SavedListResponse {
    sessions: Vec<SessionSummary>,
}

async fn handle_list_saved(State(state): State<AppState>) -> ApiResult<SavedListResponse> {
    let sessions = state.chat.store().list_sessions().await?;
    Ok(Json(SavedListResponse { sessions }))
}

#[derive(Serialize)]
struct SummaryResponse {
    id: String,
    summary: String,
}

async fn handle_saved_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SummaryResponse> {
    let summary = state.chat.rag().session_summary(&id).await?;
    if summary.is_empty() {
        return Err(not_found(format!("saved chat not found: {}", id)));
    }
    Ok(Json(SummaryResponse { id, summary }))
}

async fn handle_load_saved(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ChatSession> {
    Ok(Json(state.chat.load(&id).await?))
}

async fn handle_delete_saved(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.chat.delete(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ============ Retrieval ============

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<ContextHit>,
    prompt: String,
}

async fn handle_search(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let query = q.q.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let rag = state.chat.rag();
    let limit = q.limit.unwrap_or(rag.config().max_results).clamp(1, 50);
    let results = rag.relevant_context(query, limit).await;
    let prompt = crate::rag::format_context_prompt(
        query,
        &results,
        rag.config().snippet_chars,
        rag.config().max_context_chars,
    );

    Ok(Json(SearchResponse {
        query: query.to_string(),
        results,
        prompt,
    }))
}

async fn handle_rebuild_index(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let indexed = state.chat.rag().index_all().await?;
    Ok(Json(serde_json::json!({
        "indexed": indexed,
        "vector_search_available": state.chat.rag().vector_search_available(),
    })))
}

#[derive(Serialize)]
struct StatsResponse {
    rag: RagStats,
    models: ModelStatus,
    live_sessions: usize,
}

async fn handle_stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    Ok(Json(StatsResponse {
        rag: state.chat.rag().statistics().await?,
        models: state.chat.models().status().await,
        live_sessions: state.chat.sessions().len().await,
    }))
}

// ============ Models, themes, examples ============

#[derive(Serialize)]
struct ModelsResponse {
    current: String,
    models: Vec<ModelInfo>,
}

async fn handle_list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        current: state.chat.models().current_key(),
        models: state.chat.models().model_infos().await,
    })
}

#[derive(Deserialize)]
struct SetModelRequest {
    model: String,
}

async fn handle_set_model(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SetModelRequest>,
) -> ApiResult<serde_json::Value> {
    if !state.chat.models().set_model(&req.model) {
        return Err(bad_request(format!("unknown model: {}", req.model)));
    }
    tracing::info!(model = %req.model, "model switched");
    Ok(Json(serde_json::json!({ "current": req.model })))
}

async fn handle_themes() -> Json<Vec<ThemeInfo>> {
    Json(theme::themes())
}

async fn handle_examples() -> Json<Vec<&'static str>> {
    Json(EXAMPLE_PROMPTS.to_vec())
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    content: String,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    parsed: ParsedInput,
    suggestions: Vec<&'static str>,
    code_blocks: Vec<CodeBlock>,
}

async fn handle_analyze(ApiJson(req): ApiJson<AnalyzeRequest>) -> Json<AnalyzeResponse> {
    Json(AnalyzeResponse {
        parsed: parse_user_input(&req.content),
        suggestions: response_suggestions(&req.content),
        code_blocks: extract_code_blocks(&req.content),
    })
}
