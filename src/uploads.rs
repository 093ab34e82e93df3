//! Transient on-disk storage for uploaded files.
//!
//! Uploads live in a single directory under `<uuid>_<sanitized name>`. A
//! `process` call claims the file (atomic rename) and the returned
//! [`ClaimedUpload`] deletes it when dropped, on every exit path.

use crate::error::{AppError, Result};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "pdf"];

/// Metadata returned to the client after a successful upload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoredUpload {
    pub file_id: String,
    pub original_name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Use `dir` for uploads, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate and persist an upload under a fresh token.
    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<StoredUpload> {
        let base = basename(original_name).trim();
        if base.is_empty() {
            return Err(AppError::Validation("No file selected".to_string()));
        }
        let Some(extension) = allowed_extension(base) else {
            return Err(AppError::Validation("File type not supported".to_string()));
        };
        let name = storage_name(base, extension);
        if data.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }

        let file_id = format!("{}_{}", Uuid::new_v4(), name);
        let path = self.dir.join(&file_id);
        if let Err(e) = tokio::fs::write(&path, data).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }

        info!("Stored upload {} ({} bytes)", file_id, data.len());
        Ok(StoredUpload {
            file_id,
            original_name: name,
            size: data.len() as u64,
        })
    }

    /// Take ownership of a stored upload. A second claim of the same token
    /// fails with `NotFound`.
    pub async fn claim(&self, file_id: &str) -> Result<ClaimedUpload> {
        if !is_valid_token(file_id) {
            return Err(AppError::NotFound("File not found".to_string()));
        }

        let stored = self.dir.join(file_id);
        let claimed = self.dir.join(format!(".{}.{}", Uuid::new_v4(), file_id));
        match tokio::fs::rename(&stored, &claimed).await {
            Ok(()) => {
                debug!("Claimed upload {}", file_id);
                Ok(ClaimedUpload {
                    file_id: file_id.to_string(),
                    path: claimed,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound("File not found".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// A stored upload being processed. Deleted from disk on drop; deletion
/// failures are logged only.
#[derive(Debug)]
pub struct ClaimedUpload {
    file_id: String,
    path: PathBuf,
}

impl ClaimedUpload {
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ClaimedUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed upload {}", self.file_id),
            Err(e) => warn!(
                "Failed to clean up upload {} at {}: {}",
                self.file_id,
                self.path.display(),
                e
            ),
        }
    }
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or_default()
}

/// Reduce a client-supplied filename to a safe basename: ASCII letters,
/// digits, `-`, `_` and `.`; whitespace becomes `_`; leading/trailing dots
/// and underscores are dropped.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = basename(name)
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    cleaned.trim_matches(['.', '_']).to_string()
}

/// Extension of `name` if it is on the whitelist (compared case-insensitively).
fn allowed_extension(name: &str) -> Option<&str> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Sanitized stem plus the original extension. Names whose stem has nothing
/// safe left (e.g. `发票.png`) are stored as `upload.<ext>`.
fn storage_name(base: &str, extension: &str) -> String {
    let stem = Path::new(base)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(sanitize_filename)
        .unwrap_or_default();
    let stem = if stem.is_empty() { "upload" } else { stem.as_str() };
    format!("{}.{}", stem, extension)
}

fn is_valid_token(file_id: &str) -> bool {
    !file_id.is_empty()
        && !file_id.starts_with('.')
        && !file_id.contains(['/', '\\'])
        && !file_id.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (UploadStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path().join("uploads")).await.unwrap();
        (store, dir)
    }

    fn entries(store: &UploadStore) -> usize {
        std::fs::read_dir(store.dir()).unwrap().count()
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("scan.png"), "scan.png");
        assert_eq!(sanitize_filename("My Receipt (1).JPG"), "My_Receipt_1.JPG");
        assert_eq!(sanitize_filename("../../etc/passwd.png"), "passwd.png");
        assert_eq!(sanitize_filename("C:\\Users\\me\\doc.pdf"), "doc.pdf");
        assert_eq!(sanitize_filename(".hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename(""), "");
    }

    #[test]
    fn test_storage_name() {
        assert_eq!(storage_name("scan.png", "png"), "scan.png");
        assert_eq!(storage_name("My Receipt (1).JPG", "JPG"), "My_Receipt_1.JPG");
        assert_eq!(storage_name(".hidden.png", "png"), "hidden.png");
        assert_eq!(storage_name("račun 7.png", "png"), "raun_7.png");
        assert_eq!(storage_name("čćž.png", "png"), "upload.png");
        assert_eq!(storage_name("发票.pdf", "pdf"), "upload.pdf");
    }

    #[test]
    fn test_allowed_extensions() {
        assert_eq!(allowed_extension("a.png"), Some("png"));
        assert_eq!(allowed_extension("A.TIFF"), Some("TIFF"));
        assert_eq!(allowed_extension("doc.pdf"), Some("pdf"));
        assert_eq!(allowed_extension("čćž.png"), Some("png"));
        assert_eq!(allowed_extension("x.exe"), None);
        assert_eq!(allowed_extension("png"), None);
        assert_eq!(allowed_extension("archive.png.zip"), None);
    }

    #[tokio::test]
    async fn test_non_ascii_names_are_accepted() {
        let (store, _dir) = store().await;

        let croatian = store.save("čćž.png", b"data").await.unwrap();
        assert_eq!(croatian.original_name, "upload.png");
        assert!(croatian.file_id.ends_with("_upload.png"));

        let chinese = store.save("发票.png", b"data").await.unwrap();
        assert_eq!(chinese.original_name, "upload.png");
        assert_ne!(chinese.file_id, croatian.file_id);

        let mixed = store.save("Račun.jpg", b"data").await.unwrap();
        assert_eq!(mixed.original_name, "Raun.jpg");
        assert_eq!(entries(&store), 3);
    }

    #[tokio::test]
    async fn test_save_and_claim_deletes_on_drop() {
        let (store, _dir) = store().await;
        let stored = store.save("scan.png", b"not decoded here").await.unwrap();
        assert!(stored.file_id.ends_with("_scan.png"));
        assert_eq!(stored.original_name, "scan.png");
        assert_eq!(stored.size, 16);
        assert_eq!(entries(&store), 1);

        {
            let claimed = store.claim(&stored.file_id).await.unwrap();
            assert_eq!(claimed.file_id(), stored.file_id);
            assert!(claimed.path().exists());
        }
        assert_eq!(entries(&store), 0);
    }

    #[tokio::test]
    async fn test_second_claim_is_not_found() {
        let (store, _dir) = store().await;
        let stored = store.save("scan.png", b"data").await.unwrap();

        let first = store.claim(&stored.file_id).await.unwrap();
        let second = store.claim(&stored.file_id).await;
        assert!(matches!(second, Err(AppError::NotFound(_))));
        drop(first);

        let third = store.claim(&stored.file_id).await;
        assert!(matches!(third, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let (store, _dir) = store().await;
        let a = store.save("same.png", b"1").await.unwrap();
        let b = store.save("same.png", b"2").await.unwrap();
        assert_ne!(a.file_id, b.file_id);
        assert_eq!(entries(&store), 2);
    }

    #[tokio::test]
    async fn test_rejects_disallowed_and_empty() {
        let (store, _dir) = store().await;

        let exe = store.save("x.exe", b"MZ").await;
        assert!(matches!(exe, Err(AppError::Validation(msg)) if msg == "File type not supported"));

        let empty = store.save("scan.png", b"").await;
        assert!(matches!(empty, Err(AppError::Validation(_))));

        let unnamed = store.save("", b"data").await;
        assert!(matches!(unnamed, Err(AppError::Validation(msg)) if msg == "No file selected"));

        assert_eq!(entries(&store), 0);
    }

    #[tokio::test]
    async fn test_claim_rejects_path_tricks() {
        let (store, dir) = store().await;
        std::fs::write(dir.path().join("outside.png"), b"secret").unwrap();

        for id in ["", "../outside.png", "a/b.png", ".hidden", "..", "x\\y.png"] {
            assert!(
                matches!(store.claim(id).await, Err(AppError::NotFound(_))),
                "expected NotFound for {id:?}"
            );
        }
        assert!(dir.path().join("outside.png").exists());
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_swallowed() {
        let (store, _dir) = store().await;
        let stored = store.save("scan.png", b"data").await.unwrap();
        let claimed = store.claim(&stored.file_id).await.unwrap();

        std::fs::remove_file(claimed.path()).unwrap();
        drop(claimed); // logs a warning, must not panic
        assert_eq!(entries(&store), 0);
    }
}
