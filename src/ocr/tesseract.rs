//! Tesseract OCR engine, driven through the `tesseract` command-line tool.

use super::{EngineError, OcrEngine};
use image::{GrayImage, ImageFormat};
use std::io::ErrorKind;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

pub struct TesseractEngine {
    binary: PathBuf,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Language packs reported by `tesseract --list-langs`.
    pub async fn installed_languages(&self) -> Result<Vec<String>, EngineError> {
        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed(format!(
                "--list-langs failed: {}",
                stderr.trim()
            )));
        }

        // First line is a header ("List of available languages ...")
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .skip(1)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn spawn_error(&self, e: std::io::Error) -> EngineError {
        if e.kind() == ErrorKind::NotFound {
            EngineError::Unavailable(format!("{} not found on PATH", self.binary.display()))
        } else {
            EngineError::Failed(format!("failed to run {}: {}", self.binary.display(), e))
        }
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &GrayImage, language: &str) -> Result<String, EngineError> {
        // Removed when `input` drops, after the subprocess has exited.
        let image = image.clone();
        let input = tokio::task::spawn_blocking(move || write_temp_png(&image))
            .await
            .map_err(|e| EngineError::Failed(format!("temp image task failed: {}", e)))??;

        debug!(
            "Running {} on {} (lang={})",
            self.binary.display(),
            input.path().display(),
            language
        );

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(language, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// PNG encode plus file write; run on the blocking pool.
fn write_temp_png(image: &GrayImage) -> Result<NamedTempFile, EngineError> {
    let input = tempfile::Builder::new()
        .prefix("llm-ocr-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| EngineError::Failed(format!("failed to create temp image: {}", e)))?;
    image
        .save_with_format(input.path(), ImageFormat::Png)
        .map_err(|e| EngineError::Failed(format!("failed to write temp image: {}", e)))?;
    Ok(input)
}

/// Tesseract reports missing traineddata on stderr and exits non-zero.
fn classify_failure(language: &str, stderr: &str) -> EngineError {
    if stderr.contains("Failed loading language") || stderr.contains("Error opening data file") {
        EngineError::MissingLanguage(language.to_string())
    } else {
        EngineError::Failed(stderr.trim().to_string())
    }
}
