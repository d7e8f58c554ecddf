use std::{collections::HashMap, fs, time::Duration};

use client_core::GeminiConfig;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub request_timeout_seconds: u64,
    pub session_idle_ttl_seconds: i64,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let gemini = GeminiConfig::default();
        Self {
            server_bind: "127.0.0.1:8080".into(),
            gemini_api_key: None,
            gemini_model: gemini.model,
            gemini_base_url: gemini.base_url,
            request_timeout_seconds: gemini.timeout.as_secs(),
            session_idle_ttl_seconds: 30 * 60,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Settings {
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.gemini_api_key.clone(),
            model: self.gemini_model.clone(),
            base_url: self.gemini_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_seconds),
        }
    }

    /// Values too large for a duration mean sessions are never evicted.
    pub fn session_idle_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.session_idle_ttl_seconds.max(1))
            .unwrap_or(chrono::Duration::MAX)
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());

    settings
}

pub(crate) fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(error) => {
            warn!(%error, "ignoring unreadable server.toml");
            return;
        }
    };

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("gemini_api_key") {
        settings.gemini_api_key = non_blank(v);
    }
    if let Some(v) = file_cfg.get("gemini_model") {
        settings.gemini_model = v.clone();
    }
    if let Some(v) = file_cfg.get("gemini_base_url") {
        settings.gemini_base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("request_timeout_seconds") {
        parse_into(v, "request_timeout_seconds", &mut settings.request_timeout_seconds);
    }
    if let Some(v) = file_cfg.get("session_idle_ttl_seconds") {
        parse_into(v, "session_idle_ttl_seconds", &mut settings.session_idle_ttl_seconds);
    }
    if let Some(v) = file_cfg.get("max_upload_bytes") {
        parse_into(v, "max_upload_bytes", &mut settings.max_upload_bytes);
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut Settings,
    var: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    for name in ["API_KEY", "GEMINI_API_KEY", "APP__GEMINI_API_KEY"] {
        if let Some(v) = var(name).as_deref().and_then(non_blank) {
            settings.gemini_api_key = Some(v);
        }
    }

    if let Some(v) = var("APP__GEMINI_MODEL") {
        settings.gemini_model = v;
    }
    if let Some(v) = var("APP__GEMINI_BASE_URL") {
        settings.gemini_base_url = v;
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECONDS") {
        parse_into(&v, "APP__REQUEST_TIMEOUT_SECONDS", &mut settings.request_timeout_seconds);
    }
    if let Some(v) = var("APP__SESSION_IDLE_TTL_SECONDS") {
        parse_into(&v, "APP__SESSION_IDLE_TTL_SECONDS", &mut settings.session_idle_ttl_seconds);
    }
    if let Some(v) = var("APP__MAX_UPLOAD_BYTES") {
        parse_into(&v, "APP__MAX_UPLOAD_BYTES", &mut settings.max_upload_bytes);
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_into<T: std::str::FromStr>(raw: &str, key: &str, slot: &mut T) {
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = raw, "ignoring non-numeric setting"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
