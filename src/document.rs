//! Uploaded documents decoded into something the extractors can consume.

use crate::error::{AppError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub enum DocumentKind {
    /// Shared so CPU-bound preprocessing can run on the blocking pool.
    Raster {
        image: Arc<DynamicImage>,
        format: ImageFormat,
    },
    Pdf,
}

/// A decoded upload. Keeps the original bytes around so the remote path can
/// send exactly what the user uploaded.
pub struct Document {
    name: String,
    bytes: Vec<u8>,
    kind: DocumentKind,
}

impl Document {
    /// Read and decode a file from disk. Decoding runs on the blocking pool.
    pub async fn open(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        tokio::task::spawn_blocking(move || Self::from_bytes(name, bytes))
            .await
            .map_err(|e| AppError::Internal(format!("decode task failed: {}", e)))?
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let name = name.into();

        if bytes.starts_with(b"%PDF") {
            debug!("Document {} detected as PDF ({} bytes)", name, bytes.len());
            return Ok(Self {
                name,
                bytes,
                kind: DocumentKind::Pdf,
            });
        }

        let format = image::guess_format(&bytes)
            .map_err(|e| AppError::Decode(format!("{}: unrecognized image data ({})", name, e)))?;
        let image = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| AppError::Decode(format!("{}: {}", name, e)))?;

        let (width, height) = image.dimensions();
        debug!("Document {} decoded as {:?} {}x{}", name, format, width, height);

        Ok(Self {
            name,
            bytes,
            kind: DocumentKind::Raster {
                image: Arc::new(image),
                format,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &DocumentKind {
        &self.kind
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self.kind, DocumentKind::Pdf)
    }

    /// Base64 data URL of the original image bytes. `None` for PDFs.
    pub fn image_data_url(&self) -> Option<String> {
        match &self.kind {
            DocumentKind::Raster { format, .. } => Some(format!(
                "data:{};base64,{}",
                mime_for(*format),
                BASE64.encode(&self.bytes)
            )),
            DocumentKind::Pdf => None,
        }
    }

    /// Concatenated text layer of every page, in page order.
    pub fn pdf_text(&self) -> Result<String> {
        use lopdf::Document as PdfDocument;
        use std::io::Cursor;

        let doc = PdfDocument::load_from(Cursor::new(&self.bytes))
            .map_err(|e| AppError::Decode(format!("{}: failed to load PDF: {}", self.name, e)))?;

        let mut text = String::new();
        for (page_num, _) in doc.get_pages() {
            match doc.extract_text(&[page_num]) {
                Ok(content) => {
                    text.push_str(&content);
                    text.push('\n');
                }
                Err(e) => debug!("{}: no text on page {}: {}", self.name, page_num, e),
            }
        }

        Ok(text)
    }
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::WebP => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
pub(crate) fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut out = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

/// Single-page PDF whose text layer contains `text`.
#[cfg(test)]
pub(crate) fn pdf_with_text(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_text_layer() {
        let doc = Document::from_bytes("letter.pdf", pdf_with_text("Quarterly report")).unwrap();
        assert!(doc.is_pdf());
        assert!(doc.pdf_text().unwrap().contains("Quarterly report"));
    }

    #[test]
    fn test_decodes_png() {
        let bytes = png_bytes(&DynamicImage::new_rgb8(10, 10));
        let doc = Document::from_bytes("white.png", bytes).unwrap();
        assert!(!doc.is_pdf());
        match doc.kind() {
            DocumentKind::Raster { image, format } => {
                assert_eq!(*format, ImageFormat::Png);
                assert_eq!(image.dimensions(), (10, 10));
            }
            DocumentKind::Pdf => panic!("expected raster"),
        }
    }

    #[test]
    fn test_corrupt_image_is_decode_error() {
        let result = Document::from_bytes("broken.png", vec![0x89, b'P', b'N', b'G', 0, 1, 2]);
        assert!(matches!(result, Err(AppError::Decode(_))));

        let result = Document::from_bytes("noise.bin", vec![1, 2, 3, 4]);
        assert!(matches!(result, Err(AppError::Decode(_))));
    }

    #[test]
    fn test_pdf_detected_by_magic() {
        let doc = Document::from_bytes("a.pdf", b"%PDF-1.4\n%garbage".to_vec()).unwrap();
        assert!(doc.is_pdf());
        assert!(doc.image_data_url().is_none());
        assert!(matches!(doc.pdf_text(), Err(AppError::Decode(_))));
    }

    #[test]
    fn test_data_url_uses_detected_mime() {
        let bytes = png_bytes(&DynamicImage::new_luma8(2, 2));
        let doc = Document::from_bytes("tiny.png", bytes.clone()).unwrap();
        let url = doc.image_data_url().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(url.trim_start_matches("data:image/png;base64,"), BASE64.encode(&bytes));
    }

    #[tokio::test]
    async fn test_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, png_bytes(&DynamicImage::new_rgb8(3, 5))).unwrap();

        let doc = Document::open(&path).await.unwrap();
        assert_eq!(doc.name(), "scan.png");
        assert!(!doc.is_pdf());
    }
}
