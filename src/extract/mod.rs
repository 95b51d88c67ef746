//! Resume text extraction capability (bytes -> text)

use async_trait::async_trait;
use std::path::Path;

use crate::error::{Result, ScoutError};

/// Turns raw document bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String>;
}

/// PDF extraction via `pdf-extract`. Parsing is CPU-bound and runs on the
/// blocking pool.
#[derive(Debug, Default, Clone)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String> {
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ScoutError::Extraction(format!("PDF extraction task failed: {}", e)))?
            .map_err(|e| ScoutError::Extraction(format!("unreadable PDF: {}", e)))?;
        Ok(text)
    }
}

/// UTF-8 passthrough for `.txt` and `.md` resumes.
#[derive(Debug, Default, Clone)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String> {
        String::from_utf8(bytes).map_err(|e| ScoutError::Extraction(format!("resume is not valid UTF-8: {}", e)))
    }
}

/// Extractor chosen by file extension.
#[derive(Debug, Default, Clone)]
pub struct FileTextExtractor;

impl FileTextExtractor {
    /// Read `path` and extract its text
    pub async fn extract_path(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ScoutError::Extraction(format!("cannot read resume {}: {}", path.display(), e)))?;

        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        log::debug!("Extracting resume text from {} ({} bytes)", path.display(), bytes.len());
        if is_pdf {
            PdfTextExtractor.extract(bytes).await
        } else {
            PlainTextExtractor.extract(bytes).await
        }
    }
}

#[async_trait]
impl TextExtractor for FileTextExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String> {
        if bytes.starts_with(b"%PDF") {
            PdfTextExtractor.extract(bytes).await
        } else {
            PlainTextExtractor.extract(bytes).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_plain_text_passthrough() {
        let text = PlainTextExtractor.extract(b"Rust engineer".to_vec()).await.unwrap();
        assert_eq!(text, "Rust engineer");
    }

    #[tokio::test]
    async fn test_plain_text_rejects_invalid_utf8() {
        let err = PlainTextExtractor.extract(vec![0xff, 0xfe, 0x00]).await.unwrap_err();
        assert!(matches!(err, ScoutError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_pdf_rejects_garbage() {
        let err = PdfTextExtractor.extract(b"not a pdf".to_vec()).await.unwrap_err();
        assert!(matches!(err, ScoutError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_extract_path_reads_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resume.txt");
        std::fs::write(&path, "Senior Python developer").unwrap();

        let text = FileTextExtractor.extract_path(&path).await.unwrap();
        assert_eq!(text, "Senior Python developer");
    }

    #[tokio::test]
    async fn test_extract_path_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = FileTextExtractor
            .extract_path(&dir.path().join("nope.pdf"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot read resume"));
    }
}
