use serde::{Deserialize, Serialize};

use crate::domain::{DisplayHandle, SessionId};

/// Render-ready view of one session, as served to the browser page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub source_url: Option<DisplayHandle>,
    pub result_url: Option<DisplayHandle>,
    pub busy: bool,
    pub error: Option<String>,
    pub generation: u64,
    pub download_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UploadQuery {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}
