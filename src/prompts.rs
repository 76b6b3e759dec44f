//! Built-in prompt text.
//!
//! The user's own prompt is always sent verbatim. These constants only fill
//! gaps: a question to ask when the user attached a document but typed
//! nothing, and an optional document-reading system instruction that callers
//! can opt into with [`crate::config::PromptConfigBuilder::system_prompt`].

/// Prompt used when a document is attached and the prompt box is empty.
pub const DEFAULT_DOCUMENT_PROMPT: &str =
    "Describe this document. Summarise its purpose and list the key facts it contains.";

/// A system instruction tuned for reading scanned pages and photos.
///
/// Not applied by default; the CLI exposes it as `--reader-mode`.
pub const DOCUMENT_READER_SYSTEM_PROMPT: &str = r#"You are a careful document reader. The user attaches an image of a document page or a photo and asks a question about it.

- Base your answer only on what is visible in the image and the user's question.
- Quote figures, names and dates exactly as printed.
- If the image is unreadable or does not contain the answer, say so plainly.
- Answer in the language of the question."#;

/// Pick the prompt to send.
///
/// Returns `None` when there is nothing to ask: an empty prompt and no document.
pub fn effective_prompt(prompt: &str, has_document: bool) -> Option<String> {
    let trimmed = prompt.trim();
    if !trimmed.is_empty() {
        Some(trimmed.to_string())
    } else if has_document {
        Some(DEFAULT_DOCUMENT_PROMPT.to_string())
    } else {
        None
    }
}
