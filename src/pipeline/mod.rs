//! Pipeline stages for a document prompt request.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ postprocess
//! (path/URL) (pdfium)   (base64)  (VLM)   (cleanup)
//! ```
//!
//! 1. [`input`]  - load the user-supplied path or URL into memory
//! 2. [`render`] - rasterise one PDF page; runs in `spawn_blocking` because
//!    pdfium is not async-safe. Skipped for image inputs.
//! 3. [`encode`] - JPEG-encode a rendered page, or re-encode a user image,
//!    and base64-wrap it for the request body
//! 4. [`llm`]    - the model call with timeout and retry/backoff; the only
//!    stage with network I/O besides URL downloads
//! 5. [`postprocess`] - deterministic cleanup of the answer text

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
