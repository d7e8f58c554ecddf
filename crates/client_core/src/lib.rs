//! Session lifecycle for the background eraser: upload, encode, remote edit, render.

pub mod controller;
pub mod encoder;
pub mod error;
pub mod gemini;
pub mod session;

use async_trait::async_trait;
use shared::domain::EncodedImage;

pub use controller::{RunOutcome, RunTicket, SessionController, SkipReason};
pub use encoder::{Base64Encoder, Encoder};
pub use error::{EncodeError, RemoteError, RunError};
pub use gemini::{GeminiConfig, GeminiEditor};
pub use session::Session;

/// Instruction sent with every run.
pub const REMOVE_BACKGROUND_INSTRUCTION: &str = "remove the background from this image, return only the foreground subject with a transparent background, output as PNG";

/// Shown to the user for any failed run; the underlying cause is only logged.
pub const RUN_FAILURE_MESSAGE: &str = "فشلت إزالة الخلفية. يرجى المحاولة مرة أخرى.";

/// External image-editing service.
///
/// Returns the edited image as standard base64 PNG. Implementations own their
/// latency and transport concerns; callers do not retry.
#[async_trait]
pub trait RemoteEditor: Send + Sync {
    async fn edit(&self, image: &EncodedImage, instruction: &str) -> Result<String, RemoteError>;
}

