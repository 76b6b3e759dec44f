//! Error type for the edgequake-docprompt library.
//!
//! Every failure in the ask flow is fatal for that one request: there is a
//! single document, a single payload and a single model call, so there is no
//! partial result to salvage. Messages are written for the person at the
//! terminal and carry a hint line where a fix is obvious.

use crate::document::{InputKind, MediaType};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-docprompt library.
#[derive(Debug, Error)]
pub enum DocPromptError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The request itself is unusable (empty prompt and no document, bad path string…).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Content is neither a PDF nor a PNG/JPEG image.
    #[error("Unsupported file type for '{name}' (first bytes: {magic:02X?})\nSupported: pdf, jpg, jpeg, png.")]
    UnsupportedFileType { name: String, magic: Vec<u8> },

    /// The selected input type does not match what the file actually is.
    #[error(
        "Unsupported file type or mismatch between selected input type ({selected}) \
         and actual file type ({detected})"
    )]
    TypeMismatch {
        selected: InputKind,
        detected: String,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// The PDF opened fine but has nothing to rasterise.
    #[error("No pages found in PDF '{name}'")]
    EmptyPdf { name: String },

    /// Requested page number exceeds the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for the page.
    #[error("Failed to convert PDF page {page} to image: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Image errors ──────────────────────────────────────────────────────
    /// The image bytes could not be decoded.
    #[error("Could not decode {media} image '{name}': {detail}")]
    ImageDecodeFailed {
        name: String,
        media: MediaType,
        detail: String,
    },

    /// Re-encoding the image for transport failed.
    #[error("Image encoding failed: {0}")]
    EncodeFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error after all retries.
    #[error("Failed to generate content after {attempts} attempt(s): {message}")]
    LlmApiError { attempts: u32, message: String },

    /// VLM API returned HTTP 429 on every attempt.
    #[error("Rate limit exceeded for provider '{provider}'\nWait a moment or lower --concurrency.")]
    RateLimitExceeded { provider: String },

    /// VLM API call timed out on every attempt.
    #[error("API call timed out after {secs}s\nIncrease --api-timeout.")]
    ApiTimeout { secs: u64 },

    /// VLM API returned an authentication error (401/403) - retry unlikely to help.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF input needs the pdfium shared library. You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n\
  • Place libpdfium in ./lib next to where you run docprompt.\n\
  • Install pdfium system-wide so the loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
