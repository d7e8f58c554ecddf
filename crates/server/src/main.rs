use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use client_core::{Base64Encoder, GeminiEditor};
use shared::{
    domain::{SessionId, DOWNLOAD_FILENAME, RESULT_MEDIA_TYPE},
    error::{ApiError, ErrorCode},
    protocol::{SessionView, UploadQuery},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;
mod registry;

use api::{ApiContext, RunDisposition};
use app_state::AppState;
use config::load_settings;
use registry::SessionRegistry;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings();
    if settings.gemini_api_key.is_none() {
        warn!("no Gemini API key configured; runs will fail until GEMINI_API_KEY or API_KEY is set");
    }

    let editor = GeminiEditor::new(settings.gemini_config())
        .context("failed to build remote editor client")?;
    let sessions = SessionRegistry::new(Arc::new(Base64Encoder), Arc::new(editor));
    spawn_idle_sweeper(sessions.clone(), settings.session_idle_ttl());

    let state = AppState {
        api: ApiContext { sessions },
    };
    let app = build_router(Arc::new(state), settings.max_upload_bytes);

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, model = %settings.gemini_model, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_idle_sweeper(sessions: SessionRegistry, ttl: chrono::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sessions.evict_idle(Utc::now(), ttl).await;
        }
    });
}

fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/sessions", post(http_create_session))
        .route(
            "/sessions/:session_id",
            get(http_get_session).delete(http_delete_session),
        )
        .route("/sessions/:session_id/upload", post(http_upload))
        .route("/sessions/:session_id/run", post(http_run))
        .route("/sessions/:session_id/clear", post(http_clear))
        .route("/sessions/:session_id/result", get(http_download_result))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

fn http_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_create_session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(api::create_session(&state.api).await)
}

async fn http_get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionView>, HttpError> {
    api::get_session(&state.api, session_id)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_upload(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionView>, HttpError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    api::upload_image(&state.api, session_id, query, content_type, body.to_vec())
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_run(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<(StatusCode, Json<SessionView>), HttpError> {
    let (disposition, view) = api::run_session(&state.api, session_id)
        .await
        .map_err(http_error)?;
    let status = match disposition {
        RunDisposition::Started => StatusCode::ACCEPTED,
        RunDisposition::Skipped(_) => StatusCode::OK,
    };
    Ok((status, Json(view)))
}

async fn http_clear(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionView>, HttpError> {
    api::clear_session(&state.api, session_id)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, HttpError> {
    api::delete_session(&state.api, session_id)
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_download_result(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<impl IntoResponse, HttpError> {
    let bytes = api::result_png(&state.api, session_id)
        .await
        .map_err(http_error)?;
    let disposition = format!("attachment; filename=\"{DOWNLOAD_FILENAME}\"");
    Ok((
        [
            (header::CONTENT_TYPE, RESULT_MEDIA_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
