//! # edgequake-docprompt
//!
//! Ask a Vision Language Model a question about a PDF or an image.
//!
//! The user supplies a document, picks an input type and types a prompt.
//! PDFs have one page rasterised to JPEG; PNG and JPEG images are sent in
//! their own format. The prompt and the base64 image go to a multimodal model
//! (Google Gemini by default) in a single request, and the answer comes back
//! as text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document + prompt
//!  │
//!  ├─ 1. Load      local file, URL, or in-memory bytes; type sniffed from magic bytes
//!  ├─ 2. Dispatch  input type (text / pdf / image / auto) vs. detected type
//!  ├─ 3. Render    PDF page → pixels via pdfium (spawn_blocking)
//!  ├─ 4. Encode    pixels → JPEG → base64, or image → re-encoded → base64
//!  ├─ 5. Generate  one chat call with prompt + image, retry on transient errors
//!  └─ 6. Tidy      strip wrapper fences, normalise whitespace
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docprompt::{ask, InputKind, PromptConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Gemini is picked up from GOOGLE_API_KEY / GEMINI_API_KEY
//!     let config = PromptConfig::default();
//!     let reply = ask(Some("receipt.jpg"), InputKind::Image, "What did I pay for parking?", &config).await?;
//!     println!("{}", reply.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docprompt` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod ask;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use ask::{
    ask, ask_batch, ask_document, ask_from_bytes, ask_sync, ask_text, ask_to_file, inspect,
    resolve_provider,
};
pub use config::{PromptConfig, PromptConfigBuilder, DEFAULT_GEMINI_MODEL};
pub use document::{Document, DocumentInfo, InputKind, MediaType};
pub use error::DocPromptError;
pub use output::{AttachmentInfo, BatchItem, PromptResponse, ResponseStats};
pub use progress::{NoopProgressCallback, ProgressCallback, PromptProgressCallback, Stage};
