//! LLM OCR - image and PDF to Markdown over HTTP, via Tesseract or a hosted
//! vision model.

mod config;
mod document;
mod error;
mod extractor;
mod languages;
mod markdown;
mod ocr;
mod openrouter;
mod preprocess;
mod remote;
mod server;
mod uploads;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use config::ServiceConfig;
use document::Document;
use extractor::{Extractor, Method};
use ocr::tesseract::TesseractEngine;
use server::AppState;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "llm-ocr")]
#[command(about = "Convert images and PDFs to Markdown with local OCR or a vision model")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Convert a single file and write the Markdown next to it
    Convert {
        /// Image or PDF to convert
        image: PathBuf,
        /// Tesseract language code, e.g. eng, hrv, eng+hrv
        #[arg(long, default_value = languages::DEFAULT_LANGUAGE)]
        lang: String,
        /// Output path (default: parsed-<stem>.md beside the input)
        #[arg(long)]
        out: Option<PathBuf>,
        /// local (Tesseract) or remote (vision model, falls back to local)
        #[arg(long, default_value = "local")]
        method: Method,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "llm_ocr=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Convert {
            image,
            lang,
            out,
            method,
        } => convert(&config, &image, &lang, out, method).await,
    }
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let tesseract = TesseractEngine::new(&config.tesseract_bin);
    match tesseract.installed_languages().await {
        Ok(langs) => info!("Tesseract languages: {}", langs.join(", ")),
        Err(e) => warn!("Local OCR not ready: {}", e),
    }

    let extractor = Extractor::from_config(&config)?;
    let state = AppState::new(&config, extractor)
        .await
        .context("Failed to prepare upload directory")?;
    info!(
        "Uploads stored in {} (max {} MB)",
        state.uploads().dir().display(),
        config.max_upload_bytes / (1024 * 1024)
    );

    let app = server::router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn convert(
    config: &ServiceConfig,
    image: &Path,
    lang: &str,
    out: Option<PathBuf>,
    method: Method,
) -> anyhow::Result<()> {
    if !image.is_file() {
        bail!("Input file not found: {}", image.display());
    }
    let language = languages::resolve(Some(lang))?;

    let extractor = Extractor::from_config(config)?;
    let document = Document::open(image).await?;
    let result = extractor.extract(&document, method, &language).await?;
    if result.method_used != method {
        warn!("Requested {} extraction, used {}", method, result.method_used);
    }

    let out = out.unwrap_or_else(|| default_output_path(image));
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&out, &result.markdown)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("Wrote {}", out.display());
    Ok(())
}

/// `dir/scan.png` -> `dir/parsed-scan.md`
fn default_output_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    image.with_file_name(format!("parsed-{}.md", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("scans/receipt.png")),
            PathBuf::from("scans/parsed-receipt.md")
        );
        assert_eq!(
            default_output_path(Path::new("memo.v2.pdf")),
            PathBuf::from("parsed-memo.v2.md")
        );
    }

    #[test]
    fn test_cli_parses_convert() {
        let cli = Cli::try_parse_from([
            "llm-ocr", "convert", "a.png", "--lang", "hrv", "--method", "llm",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Convert {
                image,
                lang,
                out,
                method,
            }) => {
                assert_eq!(image, PathBuf::from("a.png"));
                assert_eq!(lang, "hrv");
                assert!(out.is_none());
                assert_eq!(method, Method::Remote);
            }
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["llm-ocr"]).unwrap();
        assert!(cli.command.is_none());
    }
}
