//! Upload storage and PDF text extraction.

use super::types::{Document, LoaderError, Page, Upload};
use async_trait::async_trait;
use pdf_oxide::PdfDocument;
use std::path::{Path, PathBuf};

/// Reads a stored file into per-page text.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Extract every page of the file at `path`.
    async fn load(&self, path: &Path, filename: &str) -> Result<Document, LoaderError>;
}

/// `pdf_oxide`-backed loader. Parsing runs on the blocking pool.
#[derive(Default)]
pub struct PdfLoader;

impl PdfLoader {
    /// Construct the loader.
    pub fn new() -> Self {
        Self
    }

    fn extract_pages(path: &Path, filename: &str) -> Result<Vec<Page>, LoaderError> {
        let failed = |reason: String| LoaderError::ExtractionFailed {
            filename: filename.to_string(),
            reason,
        };

        let mut doc =
            PdfDocument::open(path).map_err(|e| failed(format!("failed to parse PDF: {e}")))?;
        let page_count = doc
            .page_count()
            .map_err(|e| failed(format!("failed to read page count: {e}")))?;

        let mut pages = Vec::with_capacity(page_count);
        for page_index in 0..page_count {
            let text = match doc.extract_text(page_index) {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(
                        filename,
                        page = page_index,
                        error = %error,
                        "Page text unreadable"
                    );
                    String::new()
                }
            };
            pages.push(Page {
                number: page_index as u32,
                text,
            });
        }
        Ok(pages)
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    #[tracing::instrument(skip(self, path), fields(filename = %filename))]
    async fn load(&self, path: &Path, filename: &str) -> Result<Document, LoaderError> {
        let owned_path = path.to_path_buf();
        let owned_name = filename.to_string();
        let pages = tokio::task::spawn_blocking(move || {
            Self::extract_pages(&owned_path, &owned_name)
        })
        .await??;

        tracing::info!(pages = pages.len(), "PDF text extraction complete");
        Ok(Document {
            filename: filename.to_string(),
            source: path.to_path_buf(),
            pages,
        })
    }
}

/// Name under which an upload is stored: the final path component of the client's filename.
///
/// Returns `None` for empty names, which browsers send when no file was picked.
pub fn stored_filename(client_name: &str) -> Option<String> {
    let trimmed = client_name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Path::new(trimmed)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Write `upload` into `upload_dir`, creating the directory on demand.
///
/// An existing file with the same name is overwritten.
pub async fn save_upload(
    upload_dir: &Path,
    upload: &Upload,
) -> Result<Option<(String, PathBuf)>, LoaderError> {
    let Some(filename) = stored_filename(&upload.filename) else {
        tracing::debug!(client_name = %upload.filename, "Skipping upload without filename");
        return Ok(None);
    };

    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|source| LoaderError::Io {
            path: upload_dir.to_path_buf(),
            source,
        })?;

    let path = upload_dir.join(&filename);
    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|source| LoaderError::Io {
            path: path.clone(),
            source,
        })?;
    tracing::debug!(path = %path.display(), bytes = upload.bytes.len(), "Stored upload");
    Ok(Some((filename, path)))
}
