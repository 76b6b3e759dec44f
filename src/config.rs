//! Configuration types for a document prompt request.
//!
//! Every knob for the ask flow lives in [`PromptConfig`], built via its
//! [`PromptConfigBuilder`]. The prompt and the document are *not* part of the
//! config: one config is typically reused across many questions in an
//! interactive session or a batch run.

use crate::error::DocPromptError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default Gemini model used when nothing else is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Configuration for a document prompt request.
///
/// # Example
/// ```rust
/// use edgequake_docprompt::PromptConfig;
///
/// let config = PromptConfig::builder()
///     .model("gemini-2.0-flash")
///     .page(2)
///     .jpeg_quality(85)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PromptConfig {
    /// LLM model identifier. If None, a per-provider default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Optional system instruction sent ahead of the user's prompt.
    pub system_prompt: Option<String>,

    /// Sampling temperature. Default: 0.4.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 2048.
    pub max_tokens: usize,

    /// Retries on a transient API failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// PDF page to rasterise (1-indexed). Default: 1.
    pub page: usize,

    /// Longest edge of the attached image in pixels. Default: 2000.
    ///
    /// Applies to rasterised PDF pages and to user images; smaller images
    /// are left untouched.
    pub max_rendered_pixels: u32,

    /// JPEG quality for rasterised PDF pages (1–100). Default: 90.
    pub jpeg_quality: u8,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Number of concurrent model calls in batch mode. Default: 4.
    pub concurrency: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-call model timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Stage/retry events for UIs. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            system_prompt: None,
            temperature: 0.4,
            max_tokens: 2048,
            max_retries: 2,
            retry_backoff_ms: 500,
            page: 1,
            max_rendered_pixels: 2000,
            jpeg_quality: 90,
            password: None,
            concurrency: 4,
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PromptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("system_prompt", &self.system_prompt.as_ref().map(|s| s.len()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("page", &self.page)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl PromptConfig {
    /// Create a new builder for `PromptConfig`.
    pub fn builder() -> PromptConfigBuilder {
        PromptConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PromptConfig`].
pub struct PromptConfigBuilder {
    config: PromptConfig,
}

impl fmt::Debug for PromptConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PromptConfigBuilder")
            .field(&self.config)
            .finish()
    }
}

impl PromptConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.config.page = page;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PromptConfig, DocPromptError> {
        let c = &self.config;
        if c.page == 0 {
            return Err(DocPromptError::InvalidConfig(
                "Pages are 1-indexed, page must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(DocPromptError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(DocPromptError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
