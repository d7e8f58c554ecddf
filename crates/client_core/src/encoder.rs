use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::domain::{EncodedImage, ImageFile};

use crate::error::EncodeError;

/// Payloads above this size are encoded off the async worker threads.
const INLINE_ENCODE_LIMIT: usize = 256 * 1024;

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, image: &ImageFile) -> Result<EncodedImage, EncodeError>;
}

/// Standard-alphabet base64 with padding; keeps the declared media type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Encoder;

#[async_trait]
impl Encoder for Base64Encoder {
    async fn encode(&self, image: &ImageFile) -> Result<EncodedImage, EncodeError> {
        let mime_type = image.media_type.trim();
        if mime_type.is_empty() {
            return Err(EncodeError::MissingMediaType);
        }
        let data = if image.len() <= INLINE_ENCODE_LIMIT {
            STANDARD.encode(&image.bytes)
        } else {
            let bytes = image.bytes.clone();
            tokio::task::spawn_blocking(move || STANDARD.encode(&bytes)).await?
        };

        Ok(EncodedImage {
            data,
            mime_type: mime_type.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "tests/encoder_tests.rs"]
mod tests;
