//! Supported OCR languages and the names used when prompting the vision model.

use crate::error::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const DEFAULT_LANGUAGE: &str = "eng";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

/// Languages offered to the front end, in display order.
pub const SUPPORTED: [Language; 7] = [
    Language { code: "eng", name: "English" },
    Language { code: "hrv", name: "Croatian" },
    Language { code: "fra", name: "French" },
    Language { code: "deu", name: "German" },
    Language { code: "spa", name: "Spanish" },
    Language { code: "ita", name: "Italian" },
    Language { code: "eng+hrv", name: "English + Croatian" },
];

/// Human-readable language for the remote prompt. Only single-language codes
/// are recognized; anything else is described as English.
pub fn prompt_language(code: &str) -> &'static str {
    match code {
        "hrv" => "Croatian",
        "fra" => "French",
        "deu" => "German",
        "spa" => "Spanish",
        "ita" => "Italian",
        _ => "English",
    }
}

static RE_LANGUAGE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_]+(\+[a-z_]+)*$").unwrap());

/// Resolve a caller-supplied language code. Missing or blank input becomes
/// [`DEFAULT_LANGUAGE`]; codes must be tesseract-style (`eng`, `eng+hrv`,
/// `chi_sim`). Codes not in [`SUPPORTED`] are allowed through so installed
/// extra language packs keep working.
pub fn resolve(code: Option<&str>) -> Result<String> {
    let code = code.map(str::trim).unwrap_or_default();
    if code.is_empty() {
        return Ok(DEFAULT_LANGUAGE.to_string());
    }
    if !RE_LANGUAGE_CODE.is_match(code) {
        return Err(AppError::Validation(format!("Invalid language code: {}", code)));
    }
    Ok(code.to_string())
}
