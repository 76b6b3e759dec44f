//! Progress-callback trait for ask-flow events.
//!
//! Inject an [`Arc<dyn PromptProgressCallback>`] via
//! [`crate::config::PromptConfigBuilder::progress_callback`] to follow a
//! request as it moves through loading, rasterising, encoding and the model
//! call. The CLI uses it to drive a spinner and to print the
//! "Detected file type" line; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docprompt::{PromptConfig, PromptProgressCallback, Stage};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct StageLog(Mutex<Vec<Stage>>);
//!
//! impl PromptProgressCallback for StageLog {
//!     fn on_stage(&self, stage: Stage) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let config = PromptConfig::builder()
//!     .progress_callback(Arc::new(StageLog::default()))
//!     .build()
//!     .unwrap();
//! ```

use crate::document::DocumentInfo;
use std::fmt;
use std::sync::Arc;

/// A step of the ask flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading a file or downloading a URL.
    Loading,
    /// Rendering a PDF page to pixels.
    Rasterising,
    /// Building the base64 image payload.
    Encoding,
    /// Waiting for the model.
    Generating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Loading => "Loading document",
            Stage::Rasterising => "Converting PDF page to image",
            Stage::Encoding => "Encoding image",
            Stage::Generating => "Generating response",
        })
    }
}

/// Called by the ask flow as a request progresses.
///
/// All methods default to no-ops. In batch mode events for different
/// documents may arrive concurrently, so implementations must be
/// `Send + Sync` and guard any shared state.
pub trait PromptProgressCallback: Send + Sync {
    /// A document was loaded and its type detected.
    fn on_document_loaded(&self, info: &DocumentInfo) {
        let _ = info;
    }

    /// A stage is starting.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// A model call failed and will be retried.
    ///
    /// * `attempt` - 1-indexed retry number about to run
    /// * `max`     - configured retry budget
    fn on_retry(&self, attempt: u32, max: u32, error: &str) {
        let _ = (attempt, max, error);
    }

    /// The model answered with `chars` characters of text.
    fn on_response(&self, chars: usize) {
        let _ = chars;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PromptProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PromptConfig`].
pub type ProgressCallback = Arc<dyn PromptProgressCallback>;
