//! Input resolution: turn a user-supplied path or URL into a [`Document`].
//!
//! Documents are small (a form upload, a scanned page, a short PDF) so they
//! are read fully into memory. pdfium can open a PDF straight from a byte
//! slice, which means no temp file is needed for URL inputs either.

use crate::document::Document;
use crate::error::DocPromptError;
use std::path::Path;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a document from a local path or an HTTP/HTTPS URL.
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<Document, DocPromptError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DocPromptError::InvalidInput("empty document path".into()));
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a local file, mapping I/O failures to actionable errors.
async fn read_local(path: &Path) -> Result<Document, DocPromptError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DocPromptError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => DocPromptError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Document::from_bytes(display_name(path), bytes)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, DocPromptError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DocPromptError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DocPromptError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DocPromptError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(DocPromptError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DocPromptError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Document::from_bytes(filename_from_url(url), bytes.to_vec())
}

/// Extract a reasonable name from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "download".to_string()
}
