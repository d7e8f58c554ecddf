use std::{fmt, str::FromStr, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Media types the upload surfaces accept.
pub const ACCEPTED_MEDIA_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

/// Shown next to the upload affordance; not enforced.
pub const ADVISORY_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub const RESULT_MEDIA_TYPE: &str = "image/png";
pub const DOWNLOAD_FILENAME: &str = "background-removed.png";

pub fn is_accepted_media_type(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ACCEPTED_MEDIA_TYPES.contains(&essence.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A user-supplied image blob with its declared media type.
///
/// The bytes are shared so session snapshots can be cloned cheaply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: Option<String>,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl ImageFile {
    pub fn new(
        name: Option<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name,
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Transport-safe form of an image: standard base64 plus media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Error)]
pub enum DisplayHandleError {
    #[error("display handle is not a base64 data url")]
    NotDataUrl,
    #[error("display handle payload is not valid base64: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}

/// Locally resolvable reference to image data, rendered as a `data:` url.
///
/// The handle owns its text; replacing or dropping it releases the image.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayHandle(String);

impl DisplayHandle {
    /// Wraps an already base64-encoded payload without re-checking it.
    pub fn from_base64(media_type: &str, payload: &str) -> Self {
        Self(format!("data:{media_type};base64,{payload}"))
    }

    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Self {
        Self::from_base64(media_type, &STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn media_type(&self) -> Option<&str> {
        self.split().map(|(media_type, _)| media_type)
    }

    pub fn payload(&self) -> Option<&str> {
        self.split().map(|(_, payload)| payload)
    }

    pub fn decode(&self) -> Result<Vec<u8>, DisplayHandleError> {
        let payload = self.payload().ok_or(DisplayHandleError::NotDataUrl)?;
        Ok(STANDARD.decode(payload)?)
    }

    fn split(&self) -> Option<(&str, &str)> {
        let rest = self.0.strip_prefix("data:")?;
        let (media_type, payload) = rest.split_once(',')?;
        let media_type = media_type.strip_suffix(";base64")?;
        Some((media_type, payload))
    }
}

// Data urls can be megabytes long; keep log lines readable.
impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("media_type", &self.media_type())
            .field("len", &self.0.len())
            .finish()
    }
}

impl AsRef<str> for DisplayHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
