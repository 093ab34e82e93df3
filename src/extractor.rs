//! Extraction dispatch: picks the local or remote path for a document.

use crate::config::ServiceConfig;
use crate::document::Document;
use crate::error::{AppError, Result};
use crate::ocr::tesseract::TesseractEngine;
use crate::ocr::{LocalExtractor, LocalText, OcrEngine};
use crate::remote::RemoteExtractor;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Extraction path. The front end's original names (`ocr`, `llm`) are
/// accepted as aliases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Local,
    Remote,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Local => "local",
            Method::Remote => "remote",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "local" | "ocr" => Ok(Method::Local),
            "remote" | "llm" => Ok(Method::Remote),
            other => Err(AppError::Validation(format!(
                "Unknown method '{}' (expected 'local' or 'remote')",
                other
            ))),
        }
    }
}

/// Markdown plus the path and language that actually produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub markdown: String,
    pub method_used: Method,
    pub language: String,
}

impl ExtractionResult {
    pub fn from_local(local: LocalText) -> Self {
        Self {
            markdown: local.markdown,
            method_used: Method::Local,
            language: local.language,
        }
    }
}

#[derive(Clone)]
pub struct Extractor {
    local: LocalExtractor,
    remote: Arc<RemoteExtractor>,
}

impl Extractor {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &ServiceConfig) -> anyhow::Result<Self> {
        let local = LocalExtractor::new(engine);
        let remote = RemoteExtractor::new(&config.remote, local.clone())?;
        Ok(Self {
            local,
            remote: Arc::new(remote),
        })
    }

    /// Extractor backed by the Tesseract CLI named in the config.
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let engine = Arc::new(TesseractEngine::new(&config.tesseract_bin));
        Self::new(engine, config)
    }

    pub async fn extract(
        &self,
        document: &Document,
        method: Method,
        language: &str,
    ) -> Result<ExtractionResult> {
        info!(
            "Extracting {} with {} method (lang={})",
            document.name(),
            method,
            language
        );

        match method {
            Method::Local => {
                let local = self.local.extract(document, language).await?;
                Ok(ExtractionResult::from_local(local))
            }
            Method::Remote => self.remote.extract(document, language).await,
        }
    }
}
