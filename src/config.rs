//! Service configuration.
//!
//! Everything is read once at startup into a [`ServiceConfig`] that is handed
//! to the router; nothing below reads ambient state except
//! [`ApiKeySource::resolve`], which re-reads the secrets file on every call so
//! a rotated key is picked up without a restart.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "qwen/qwen-2-vl-72b-instruct";
pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
    pub tesseract_bin: PathBuf,
    pub remote: RemoteConfig,
}

/// Settings for the hosted vision model.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub api_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub api_key: ApiKeySource,
}

/// Where to look for the OpenRouter key: a `.env`-style secrets file first,
/// then the process environment.
#[derive(Debug, Clone)]
pub struct ApiKeySource {
    pub secrets_file: Option<PathBuf>,
    pub env_var: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            upload_dir: std::env::temp_dir().join("llm-ocr-uploads"),
            max_upload_bytes: 16 * 1024 * 1024,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            tesseract_bin: PathBuf::from("tesseract"),
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            max_tokens: 2000,
            temperature: 0.1,
            api_key: ApiKeySource {
                secrets_file: Some(PathBuf::from(".env")),
                env_var: API_KEY_VAR.to_string(),
            },
        }
    }
}

impl ServiceConfig {
    /// Build the config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("LLM_OCR_BIND") {
            config.bind_addr = addr;
        }
        if let Some(dir) = lookup("LLM_OCR_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(mb) = parse_var::<usize, _>(&lookup, "LLM_OCR_MAX_UPLOAD_MB")? {
            config.max_upload_bytes = mb
                .checked_mul(1024 * 1024)
                .with_context(|| format!("LLM_OCR_MAX_UPLOAD_MB is too large: {}", mb))?;
        }
        if let Some(origins) = lookup("LLM_OCR_CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(bin) = lookup("TESSERACT_BIN") {
            config.tesseract_bin = PathBuf::from(bin);
        }

        let remote = &mut config.remote;
        if let Some(url) = lookup("OPENROUTER_API_URL") {
            remote.api_url = url;
        }
        if let Some(model) = lookup("OPENROUTER_MODEL") {
            remote.model = model;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "OPENROUTER_TIMEOUT_SECS")? {
            remote.timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("LLM_OCR_SECRETS_FILE") {
            remote.api_key.secrets_file = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}

impl ApiKeySource {
    /// Returns the first usable key, or `None` if only placeholders (or
    /// nothing) are configured.
    pub fn resolve(&self) -> Option<String> {
        self.from_secrets_file().or_else(|| {
            std::env::var(&self.env_var)
                .ok()
                .filter(|key| is_usable_key(key))
                .map(|key| key.trim().to_string())
        })
    }

    fn from_secrets_file(&self) -> Option<String> {
        let path = self.secrets_file.as_ref()?;
        let entries = match dotenvy::from_path_iter(path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Secrets file {} not readable: {}", path.display(), e);
                return None;
            }
        };

        for entry in entries {
            match entry {
                Ok((key, value)) if key == self.env_var && is_usable_key(&value) => {
                    return Some(value.trim().to_string());
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Stopped reading {}: {}", path.display(), e);
                    break;
                }
            }
        }
        None
    }
}

/// Rejects empty keys and the placeholders shipped in example env files.
pub fn is_usable_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && !key.starts_with("your-") && key != "your_api_key_here"
}
