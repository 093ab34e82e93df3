//! Local text extraction.
//!
//! Defines the [`OcrEngine`] trait so the recognizer can be swapped (the
//! service runs the Tesseract CLI, tests use an in-process double) and the
//! [`LocalExtractor`] that preprocesses, recognizes and normalizes.

pub mod tesseract;

use crate::document::{Document, DocumentKind};
use crate::error::{AppError, Result};
use crate::languages::DEFAULT_LANGUAGE;
use crate::markdown;
use crate::preprocess::preprocess;
use image::GrayImage;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by an OCR engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine has no trained data for the requested language.
    #[error("language data not available for '{0}'")]
    MissingLanguage(String),
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    #[error("OCR engine failed: {0}")]
    Failed(String),
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn recognize(
        &self,
        image: &GrayImage,
        language: &str,
    ) -> std::result::Result<String, EngineError>;
}

/// Normalized local output plus the language that was actually applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalText {
    pub markdown: String,
    pub language: String,
}

#[derive(Clone)]
pub struct LocalExtractor {
    engine: Arc<dyn OcrEngine>,
}

impl LocalExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    pub async fn extract(&self, document: &Document, language: &str) -> Result<LocalText> {
        let language = match language.trim() {
            "" => DEFAULT_LANGUAGE,
            code => code,
        };

        match document.kind() {
            DocumentKind::Pdf => {
                let text = document.pdf_text()?;
                if text.trim().is_empty() {
                    return Err(AppError::Extraction(format!(
                        "{} has no extractable text layer",
                        document.name()
                    )));
                }
                Ok(LocalText {
                    markdown: markdown::normalize(&text),
                    language: language.to_string(),
                })
            }
            DocumentKind::Raster { image, .. } => {
                let image = Arc::clone(image);
                let gray = tokio::task::spawn_blocking(move || preprocess(&image))
                    .await
                    .map_err(|e| AppError::Internal(format!("preprocess task failed: {}", e)))?;
                let (raw, applied) = self.recognize_with_fallback(&gray, language).await?;
                debug!(
                    "{}: {} chars recognized with {} ({})",
                    document.name(),
                    raw.len(),
                    self.engine.name(),
                    applied
                );
                Ok(LocalText {
                    markdown: markdown::normalize(&raw),
                    language: applied,
                })
            }
        }
    }

    /// Run the engine once; if the language pack is missing, retry once with
    /// the default language.
    async fn recognize_with_fallback(
        &self,
        image: &GrayImage,
        language: &str,
    ) -> Result<(String, String)> {
        match self.engine.recognize(image, language).await {
            Ok(text) => Ok((text, language.to_string())),
            Err(EngineError::MissingLanguage(missing)) if language != DEFAULT_LANGUAGE => {
                warn!(
                    "Language '{}' not available ({}), falling back to '{}'",
                    language, missing, DEFAULT_LANGUAGE
                );
                let text = self
                    .engine
                    .recognize(image, DEFAULT_LANGUAGE)
                    .await
                    .map_err(|e| AppError::Extraction(e.to_string()))?;
                Ok((text, DEFAULT_LANGUAGE.to_string()))
            }
            Err(e) => Err(AppError::Extraction(e.to_string())),
        }
    }
}
