use std::sync::Arc;

use client_core::{Session, SessionController, SkipReason};
use shared::{
    domain::{
        is_accepted_media_type, ImageFile, SessionId, ACCEPTED_MEDIA_TYPES, DOWNLOAD_FILENAME,
    },
    error::{ApiError, ErrorCode},
    protocol::{SessionView, UploadQuery},
};
use tracing::{debug, error, info};

use crate::registry::SessionRegistry;

#[derive(Clone)]
pub struct ApiContext {
    pub sessions: SessionRegistry,
}

/// Whether a run request actually started a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDisposition {
    Started,
    Skipped(SkipReason),
}

pub fn session_view(session_id: SessionId, session: &Session) -> SessionView {
    SessionView {
        session_id,
        source_url: session.source_url().cloned(),
        result_url: session.result_url().cloned(),
        busy: session.busy(),
        error: session.error().map(str::to_string),
        generation: session.generation(),
        download_filename: DOWNLOAD_FILENAME.to_string(),
    }
}

pub async fn create_session(ctx: &ApiContext) -> SessionView {
    let (session_id, controller) = ctx.sessions.create().await;
    let active = ctx.sessions.len().await;
    info!(%session_id, active, "session created");
    session_view(session_id, &controller.snapshot())
}

pub async fn get_session(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<SessionView, ApiError> {
    let controller = find_controller(ctx, session_id).await?;
    Ok(session_view(session_id, &controller.snapshot()))
}

pub async fn upload_image(
    ctx: &ApiContext,
    session_id: SessionId,
    query: UploadQuery,
    content_type: Option<&str>,
    bytes: Vec<u8>,
) -> Result<SessionView, ApiError> {
    let controller = find_controller(ctx, session_id).await?;

    let media_type = query
        .mime_type
        .as_deref()
        .or(content_type)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::new(ErrorCode::Validation, "missing image media type"))?;
    if !is_accepted_media_type(media_type) {
        return Err(ApiError::new(
            ErrorCode::UnsupportedMediaType,
            format!(
                "unsupported media type {media_type}; expected one of {}",
                ACCEPTED_MEDIA_TYPES.join(", ")
            ),
        ));
    }
    if bytes.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "uploaded image is empty"));
    }

    let filename = query.filename.filter(|name| !name.trim().is_empty());
    debug!(%session_id, media_type, size_bytes = bytes.len(), "image uploaded");
    controller.upload(ImageFile::new(filename, media_type, bytes));
    Ok(session_view(session_id, &controller.snapshot()))
}

/// Starts a run and lets it finish in the background; the caller polls the view.
pub async fn run_session(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<(RunDisposition, SessionView), ApiError> {
    let controller = find_controller(ctx, session_id).await?;
    let disposition = match controller.start_run() {
        Ok(ticket) => {
            let runner = controller.clone();
            tokio::spawn(async move {
                let outcome = runner.complete_run(ticket).await;
                debug!(%session_id, ?outcome, "background run finished");
            });
            RunDisposition::Started
        }
        Err(reason) => RunDisposition::Skipped(reason),
    };
    Ok((disposition, session_view(session_id, &controller.snapshot())))
}

pub async fn clear_session(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<SessionView, ApiError> {
    let controller = find_controller(ctx, session_id).await?;
    controller.clear();
    Ok(session_view(session_id, &controller.snapshot()))
}

pub async fn delete_session(ctx: &ApiContext, session_id: SessionId) -> Result<(), ApiError> {
    if ctx.sessions.remove(session_id).await {
        info!(%session_id, "session discarded");
        Ok(())
    } else {
        Err(session_not_found())
    }
}

/// Decoded result image for download.
pub async fn result_png(ctx: &ApiContext, session_id: SessionId) -> Result<Vec<u8>, ApiError> {
    let controller = find_controller(ctx, session_id).await?;
    let session = controller.snapshot();
    let handle = session
        .result_url()
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "no result available"))?;
    handle.decode().map_err(|e| {
        error!(%session_id, error = %e, "stored result is not decodable");
        ApiError::new(ErrorCode::Internal, "result image is unreadable")
    })
}

async fn find_controller(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<Arc<SessionController>, ApiError> {
    ctx.sessions
        .get(session_id)
        .await
        .ok_or_else(session_not_found)
}

fn session_not_found() -> ApiError {
    ApiError::new(ErrorCode::NotFound, "session not found")
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
