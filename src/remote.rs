//! Remote extraction through a hosted vision-language model, degrading to
//! local OCR whenever the remote path cannot produce text.

use crate::config::{ApiKeySource, RemoteConfig};
use crate::document::Document;
use crate::error::Result;
use crate::extractor::{ExtractionResult, Method};
use crate::languages::prompt_language;
use crate::ocr::LocalExtractor;
use crate::openrouter::{CompletionError, Message, OpenRouterClient};
use std::fmt;
use tracing::{info, warn};

/// What happened on the remote path. Everything except `Completed` leads to
/// local extraction.
#[derive(Debug)]
pub enum RemoteOutcome {
    Completed(String),
    NoCredential,
    Unsupported(&'static str),
    Failed(CompletionError),
}

impl fmt::Display for RemoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOutcome::Completed(text) => write!(f, "completed ({} chars)", text.len()),
            RemoteOutcome::NoCredential => {
                write!(f, "OPENROUTER_API_KEY not set or contains a placeholder value")
            }
            RemoteOutcome::Unsupported(why) => f.write_str(why),
            RemoteOutcome::Failed(e) => write!(f, "{}", e),
        }
    }
}

fn instruction_prompt(language: &str) -> String {
    format!(
        "Extract all of the text in this image as well-formatted Markdown. \
         The document is written in {language}. Keep the original structure: \
         headings, lists, tables and paragraph breaks. Include every visible \
         word and number, in reading order, and do not add commentary."
    )
}

pub struct RemoteExtractor {
    client: OpenRouterClient,
    api_key: ApiKeySource,
    local: LocalExtractor,
}

impl RemoteExtractor {
    pub fn new(config: &RemoteConfig, local: LocalExtractor) -> anyhow::Result<Self> {
        Ok(Self {
            client: OpenRouterClient::new(config)?,
            api_key: config.api_key.clone(),
            local,
        })
    }

    /// Never fails because of the remote service; the only errors are those
    /// of the local fallback.
    pub async fn extract(&self, document: &Document, language: &str) -> Result<ExtractionResult> {
        match self.attempt(document, language).await {
            RemoteOutcome::Completed(text) => {
                info!(
                    "{}: {} chars from {}",
                    document.name(),
                    text.len(),
                    self.client.model()
                );
                Ok(ExtractionResult {
                    markdown: format!("{}\n", text.trim()),
                    method_used: Method::Remote,
                    language: language.to_string(),
                })
            }
            outcome => {
                warn!(
                    "Remote extraction of {} unavailable ({}), falling back to local OCR",
                    document.name(),
                    outcome
                );
                let local = self.local.extract(document, language).await?;
                Ok(ExtractionResult::from_local(local))
            }
        }
    }

    pub async fn attempt(&self, document: &Document, language: &str) -> RemoteOutcome {
        let Some(api_key) = self.api_key.resolve() else {
            return RemoteOutcome::NoCredential;
        };
        if document.is_pdf() {
            return RemoteOutcome::Unsupported("PDF input is not sent to the vision model");
        }
        let Some(image_url) = document.image_data_url() else {
            return RemoteOutcome::Unsupported("document has no image data");
        };

        let prompt = instruction_prompt(prompt_language(language));
        let messages = vec![Message::user_with_image(prompt, image_url)];

        match self.client.chat(&api_key, messages).await {
            Ok(text) => RemoteOutcome::Completed(text),
            Err(e) => RemoteOutcome::Failed(e),
        }
    }
}
