//! Result types returned by the ask flow.

use crate::document::{DocumentInfo, MediaType};
use serde::{Deserialize, Serialize};

/// The generated answer plus everything needed to explain where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    /// Cleaned response text.
    pub text: String,
    /// Provider that answered (e.g. "gemini").
    pub provider: String,
    /// Model that answered.
    pub model: String,
    /// The prompt actually sent (after empty-prompt defaulting).
    pub prompt: String,
    /// The document the question was about, if any.
    pub document: Option<DocumentInfo>,
    /// What was attached to the request, if anything.
    pub attachment: Option<AttachmentInfo>,
    pub stats: ResponseStats,
}

/// Description of the image payload sent with the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// MIME type of the payload (`image/jpeg` for rasterised PDFs).
    pub mime: String,
    /// What the payload was built from.
    pub source: MediaType,
    pub width: u32,
    pub height: u32,
    /// Length of the base64 string.
    pub encoded_len: usize,
    /// Rasterised page (1-indexed), PDF only.
    pub page: Option<usize>,
}

/// Timings and token usage for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Failed attempts before the successful one.
    pub retries: u32,
    /// Rasterise + encode time.
    pub prepare_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Outcome of one document in a batch run.
#[derive(Debug)]
pub struct BatchItem {
    /// The input string as given (path or URL).
    pub input: String,
    pub result: Result<PromptResponse, crate::error::DocPromptError>,
}
