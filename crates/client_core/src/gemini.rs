//! Remote editor backed by the Gemini `generateContent` endpoint with image output.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::domain::EncodedImage;
use tracing::debug;
use url::Url;

use crate::{error::RemoteError, RemoteEditor};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GeminiConfig {
    /// Defaults with the credential taken from `GEMINI_API_KEY` or `API_KEY`.
    pub fn from_env() -> Self {
        let api_key = ["GEMINI_API_KEY", "API_KEY"]
            .into_iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty());
        Self {
            api_key,
            ..Self::default()
        }
    }

    pub fn endpoint(&self) -> Result<Url, RemoteError> {
        let invalid = || RemoteError::InvalidEndpoint(self.base_url.clone());
        let mut url = Url::parse(self.base_url.trim()).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend([
                "v1beta",
                "models",
                &format!("{}:generateContent", self.model),
            ]);
        Ok(url)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestPart<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineDataRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataRef<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<InlineData>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

pub struct GeminiEditor {
    http: Client,
    config: GeminiConfig,
}

impl GeminiEditor {
    pub fn new(config: GeminiConfig) -> Result<Self, RemoteError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl RemoteEditor for GeminiEditor {
    async fn edit(&self, image: &EncodedImage, instruction: &str) -> Result<String, RemoteError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RemoteError::MissingCredential)?;
        let endpoint = self.config.endpoint()?;

        let request = GenerateContentRequest {
            contents: [RequestContent {
                parts: [
                    RequestPart {
                        inline_data: Some(InlineDataRef {
                            mime_type: &image.mime_type,
                            data: &image.data,
                        }),
                        text: None,
                    },
                    RequestPart {
                        inline_data: None,
                        text: Some(instruction),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["IMAGE", "TEXT"],
            },
        };

        debug!(
            model = %self.config.model,
            mime_type = %image.mime_type,
            "calling remote editor"
        );
        let response = self
            .http
            .post(endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| RemoteError::Malformed(err.to_string()))?;
        extract_image(body)
    }
}

fn extract_image(body: GenerateContentResponse) -> Result<String, RemoteError> {
    let mut commentary = Vec::new();
    for part in body
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
    {
        if let Some(inline) = part.inline_data {
            STANDARD
                .decode(&inline.data)
                .map_err(|err| RemoteError::Malformed(format!("image payload: {err}")))?;
            return Ok(inline.data);
        }
        if let Some(text) = part.text {
            commentary.push(text);
        }
    }

    if commentary.is_empty() {
        Err(RemoteError::Malformed("response contained no image".into()))
    } else {
        Err(RemoteError::Malformed(format!(
            "response contained no image; model said: {}",
            commentary.join(" ")
        )))
    }
}

#[cfg(test)]
#[path = "tests/gemini_tests.rs"]
mod tests;
