//! Ask entry points: the "generate response" action.
//!
//! Every entry point funnels into one flow:
//!
//! ```text
//! load ──▶ dispatch ──▶ rasterise? ──▶ encode ──▶ model ──▶ tidy
//! ```
//!
//! Dispatch happens before any heavy work, so a PDF selected as an image
//! (or vice versa) fails without binding pdfium or touching the network.

use crate::config::{PromptConfig, DEFAULT_GEMINI_MODEL};
use crate::document::{Document, DocumentInfo, InputKind, Route};
use crate::error::DocPromptError;
use crate::output::{BatchItem, PromptResponse, ResponseStats};
use crate::pipeline::encode::{self, Attachment};
use crate::pipeline::{input, llm, postprocess, render};
use crate::progress::Stage;
use crate::prompts::effective_prompt;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Ask a question about a document at a local path or URL.
///
/// `input = None` sends the prompt alone. The document is matched against
/// `kind` using its sniffed content type; a mismatch is an error.
///
/// # Example
/// ```rust,no_run
/// use edgequake_docprompt::{ask, InputKind, PromptConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PromptConfig::default();
/// let reply = ask(Some("invoice.pdf"), InputKind::Pdf, "What is the total due?", &config).await?;
/// println!("{}", reply.text);
/// # Ok(())
/// # }
/// ```
pub async fn ask(
    input_str: Option<&str>,
    kind: InputKind,
    prompt: &str,
    config: &PromptConfig,
) -> Result<PromptResponse, DocPromptError> {
    let start = Instant::now();
    match input_str.map(str::trim).filter(|s| !s.is_empty()) {
        Some(input_str) => {
            info!("Loading document: {}", input_str);
            notify_stage(config, Stage::Loading);
            let doc = input::load_document(input_str, config.download_timeout_secs).await?;
            respond(Some(doc), kind, prompt, config, start).await
        }
        None => respond(None, kind, prompt, config, start).await,
    }
}

/// Ask a question about a document that is already in memory.
pub async fn ask_document(
    doc: Document,
    kind: InputKind,
    prompt: &str,
    config: &PromptConfig,
) -> Result<PromptResponse, DocPromptError> {
    respond(Some(doc), kind, prompt, config, Instant::now()).await
}

/// Ask a question about uploaded bytes.
///
/// `name` is only used for messages and the response's `DocumentInfo`.
pub async fn ask_from_bytes(
    name: &str,
    bytes: Vec<u8>,
    kind: InputKind,
    prompt: &str,
    config: &PromptConfig,
) -> Result<PromptResponse, DocPromptError> {
    let doc = Document::from_bytes(name, bytes)?;
    ask_document(doc, kind, prompt, config).await
}

/// Send a prompt with no document attached.
pub async fn ask_text(prompt: &str, config: &PromptConfig) -> Result<PromptResponse, DocPromptError> {
    ask(None, InputKind::Text, prompt, config).await
}

/// Ask and write the response text to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn ask_to_file(
    input_str: Option<&str>,
    kind: InputKind,
    prompt: &str,
    output_path: impl AsRef<Path>,
    config: &PromptConfig,
) -> Result<PromptResponse, DocPromptError> {
    let response = ask(input_str, kind, prompt, config).await?;
    write_atomic(output_path.as_ref(), &response.text).await?;
    Ok(response)
}

/// Synchronous wrapper around [`ask`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn ask_sync(
    input_str: Option<&str>,
    kind: InputKind,
    prompt: &str,
    config: &PromptConfig,
) -> Result<PromptResponse, DocPromptError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocPromptError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(ask(input_str, kind, prompt, config))
}

/// Ask the same question about several documents.
///
/// Up to `config.concurrency` requests run at once. Results come back in
/// input order; one failing document does not affect the others.
pub async fn ask_batch(
    inputs: &[String],
    kind: InputKind,
    prompt: &str,
    config: &PromptConfig,
) -> Vec<BatchItem> {
    info!("Batch of {} documents, concurrency {}", inputs.len(), config.concurrency);

    let mut items: Vec<(usize, BatchItem)> = stream::iter(inputs.iter().enumerate().map(
        |(i, input_str)| async move {
            let result = ask(Some(input_str.as_str()), kind, prompt, config).await;
            (
                i,
                BatchItem {
                    input: input_str.clone(),
                    result,
                },
            )
        },
    ))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    items.sort_by_key(|(i, _)| *i);
    items.into_iter().map(|(_, item)| item).collect()
}

/// Describe a document without calling any model.
///
/// Does not require an LLM provider or API key. PDF page counts need pdfium;
/// when it cannot be bound the page count is left empty.
pub async fn inspect(
    input_str: &str,
    config: &PromptConfig,
) -> Result<DocumentInfo, DocPromptError> {
    let doc = input::load_document(input_str, config.download_timeout_secs).await?;
    let mut info = doc.info();
    if doc.media == crate::document::MediaType::Pdf {
        match render::page_count(&doc.name, doc.bytes, config.password.as_deref()).await {
            Ok(pages) => info.page_count = Some(pages),
            Err(DocPromptError::PdfiumBindingFailed(detail)) => {
                warn!("Page count unavailable for {}: {}", info.name, detail);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(info)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn notify_stage(config: &PromptConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(stage);
    }
}

/// The shared flow behind every entry point.
async fn respond(
    doc: Option<Document>,
    kind: InputKind,
    prompt: &str,
    config: &PromptConfig,
    start: Instant,
) -> Result<PromptResponse, DocPromptError> {
    let mut doc_info = doc.as_ref().map(Document::info);
    if let (Some(cb), Some(info)) = (config.progress_callback.as_ref(), doc_info.as_ref()) {
        cb.on_document_loaded(info);
    }

    let route = kind.resolve(doc.as_ref().map(|d| d.media))?;
    let prompt = effective_prompt(prompt, doc.is_some()).ok_or_else(|| {
        DocPromptError::InvalidInput("enter a prompt or attach a document".into())
    })?;
    debug!("Route {:?} for input type '{}'", route, kind);

    let provider = resolve_provider(config)?;

    let prepare_start = Instant::now();
    let attachment = match (doc, doc_info.as_mut()) {
        (Some(doc), Some(info)) => prepare_attachment(doc, route, config, info).await?,
        _ => None,
    };
    let prepare_duration_ms = prepare_start.elapsed().as_millis() as u64;

    notify_stage(config, Stage::Generating);
    let messages = llm::build_messages(
        &prompt,
        attachment.as_ref(),
        config.system_prompt.as_deref(),
    );
    let generated = llm::generate(&provider, &messages, config).await?;
    let text = postprocess::clean_response(&generated.text);

    if let Some(ref cb) = config.progress_callback {
        cb.on_response(text.len());
    }

    let stats = ResponseStats {
        input_tokens: generated.input_tokens,
        output_tokens: generated.output_tokens,
        retries: generated.retries,
        prepare_duration_ms,
        llm_duration_ms: generated.duration_ms,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Response: {} chars, {} in / {} out tokens, {}ms",
        text.len(),
        stats.input_tokens,
        stats.output_tokens,
        stats.total_duration_ms
    );

    Ok(PromptResponse {
        text,
        provider: provider.name().to_string(),
        model: provider.model().to_string(),
        prompt,
        document: doc_info,
        attachment: attachment.map(|a| a.info),
        stats,
    })
}

/// Rasterise or re-encode the document according to `route`.
async fn prepare_attachment(
    doc: Document,
    route: Route,
    config: &PromptConfig,
    doc_info: &mut DocumentInfo,
) -> Result<Option<Attachment>, DocPromptError> {
    match route {
        Route::TextOnly => Ok(None),
        Route::RasterisePdf => {
            notify_stage(config, Stage::Rasterising);
            let rendered = render::rasterise_page(
                &doc.name,
                doc.bytes,
                config.page,
                config.password.as_deref(),
                config.max_rendered_pixels,
            )
            .await?;
            doc_info.page_count = Some(rendered.total_pages);

            notify_stage(config, Stage::Encoding);
            encode::attach_page(&rendered.image, rendered.page, config.jpeg_quality).map(Some)
        }
        Route::DirectImage(media) => {
            notify_stage(config, Stage::Encoding);
            encode::attach_image(
                &doc.name,
                &doc.bytes,
                media,
                config.max_rendered_pixels,
                config.jpeg_quality,
            )
            .map(Some)
        }
    }
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), DocPromptError> {
    let write_err = |source: std::io::Error| DocPromptError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Default model for a named provider.
pub fn default_model_for(provider_name: &str) -> Option<&'static str> {
    match provider_name.to_lowercase().as_str() {
        "gemini" | "google" => Some(DEFAULT_GEMINI_MODEL),
        "openai" => Some("gpt-4.1-nano"),
        "anthropic" => Some("claude-sonnet-4-20250514"),
        "ollama" => Some("llava"),
        _ => None,
    }
}

fn env_non_empty(key: &str) -> bool {
    std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, DocPromptError> {
    debug!("Creating provider '{}' with model '{}'", provider_name, model);
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocPromptError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or the
///    provider's default model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Google key** (`GEMINI_API_KEY` or `GOOGLE_API_KEY`) selects Gemini.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &PromptConfig) -> Result<Arc<dyn LLMProvider>, DocPromptError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = match config.model.as_deref() {
            Some(m) => m,
            None => default_model_for(name).ok_or_else(|| DocPromptError::ProviderNotConfigured {
                provider: name.clone(),
                hint: "No default model for this provider; pass --model.".to_string(),
            })?,
        };
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if env_non_empty("GEMINI_API_KEY") || env_non_empty("GOOGLE_API_KEY") {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_vision_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocPromptError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "Missing Google API key.\n\
                Set GOOGLE_API_KEY (or GEMINI_API_KEY), or another provider's key \
                such as OPENAI_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MediaType;
    use crate::pipeline::llm::scripted::{ScriptedProvider, Step};
    use crate::prompts::DEFAULT_DOCUMENT_PROMPT;
    use edgequake_llm::{LlmError, MockProvider};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn red_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([200, 0, 0])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    async fn mock_config(replies: &[&str]) -> PromptConfig {
        let mock = MockProvider::new();
        for r in replies {
            mock.add_response(*r).await;
        }
        PromptConfig::builder()
            .provider(Arc::new(mock))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn image_question_end_to_end() {
        let config = mock_config(&["```markdown\nIt is red.   \n```"]).await;

        let reply = ask_from_bytes("swatch.png", red_png(), InputKind::Image, "", &config)
            .await
            .unwrap();

        assert_eq!(reply.text, "It is red.\n");
        assert_eq!(reply.prompt, DEFAULT_DOCUMENT_PROMPT);
        assert_eq!(reply.provider, "mock");
        assert_eq!(reply.model, "mock-model");
        let doc = reply.document.expect("document info");
        assert_eq!(doc.media, MediaType::Png);
        assert_eq!(doc.dimensions, Some((6, 4)));
        let att = reply.attachment.expect("attachment info");
        assert_eq!(att.mime, "image/png");
        assert_eq!(att.source, MediaType::Png);
        assert_eq!((att.width, att.height), (6, 4));
        assert_eq!(att.page, None);
        assert_eq!(reply.stats.retries, 0);
    }

    #[tokio::test]
    async fn text_question_has_no_attachment() {
        let config = mock_config(&["Paris"]).await;
        let reply = ask_text("Capital of France?", &config).await.unwrap();
        assert_eq!(reply.text, "Paris\n");
        assert_eq!(reply.prompt, "Capital of France?");
        assert!(reply.document.is_none());
        assert!(reply.attachment.is_none());
    }

    #[tokio::test]
    async fn retries_are_counted_in_stats() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::Fail(LlmError::NetworkError("connection reset".into())),
            Step::Fail(LlmError::ApiError("503 Service Unavailable".into())),
            Step::Reply("Done."),
        ]));
        let config = PromptConfig::builder()
            .provider(provider.clone())
            .max_retries(2)
            .retry_backoff_ms(1)
            .build()
            .unwrap();

        let reply = ask_text("Status?", &config).await.unwrap();
        assert_eq!(reply.text, "Done.\n");
        assert_eq!(reply.stats.retries, 2);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn ask_to_file_saves_cleaned_text() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("swatch.png");
        tokio::fs::write(&doc_path, red_png()).await.unwrap();
        let out = dir.path().join("out/answer.txt");
        let config = mock_config(&["Red\r\n\r\n"]).await;

        let reply = ask_to_file(
            doc_path.to_str(),
            InputKind::Auto,
            "Colour?",
            &out,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(tokio::fs::read_to_string(&out).await.unwrap(), "Red\n");
        assert_eq!(reply.text, "Red\n");
    }

    #[tokio::test]
    async fn inspect_pdf_without_pdfium_still_describes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        tokio::fs::write(&path, b"%PDF-1.4\n").await.unwrap();

        let result = inspect(path.to_str().unwrap(), &PromptConfig::default()).await;
        if render::bind_pdfium().is_ok() {
            // With pdfium present the truncated file is opened and rejected.
            assert!(matches!(result, Err(DocPromptError::CorruptPdf { .. })));
            return;
        }
        let info = result.expect("inspect should fall back");
        assert_eq!(info.media, MediaType::Pdf);
        assert_eq!(info.size_bytes, 9);
        assert_eq!(info.page_count, None);
    }

    #[test]
    fn default_models() {
        assert_eq!(default_model_for("Gemini"), Some(DEFAULT_GEMINI_MODEL));
        assert_eq!(default_model_for("openai"), Some("gpt-4.1-nano"));
        assert_eq!(default_model_for("mystery"), None);
    }

    #[test]
    fn unknown_provider_without_model_is_not_configured() {
        let config = PromptConfig::builder()
            .provider_name("mystery")
            .build()
            .unwrap();
        let err = resolve_provider(&config).err().expect("should fail");
        assert!(matches!(err, DocPromptError::ProviderNotConfigured { .. }));
    }

    #[tokio::test]
    async fn mismatch_fails_before_provider_lookup() {
        // No provider is configured: reaching provider resolution would yield a
        // different error, so TypeMismatch proves dispatch runs first.
        let config = PromptConfig::builder()
            .provider_name("mystery")
            .build()
            .unwrap();
        let err = ask_from_bytes("scan.pdf", b"%PDF-1.4\n".to_vec(), InputKind::Image, "hi", &config)
            .await
            .unwrap_err();
        match err {
            DocPromptError::TypeMismatch { selected, detected } => {
                assert_eq!(selected, InputKind::Image);
                assert_eq!(detected, MediaType::Pdf.mime());
            }
            other => panic!("expected TypeMismatch, got {other}"),
        }
    }

    #[tokio::test]
    async fn empty_prompt_without_document_is_rejected() {
        let config = PromptConfig::builder()
            .provider_name("mystery")
            .build()
            .unwrap();
        let err = ask_text("  ", &config).await.unwrap_err();
        assert!(matches!(err, DocPromptError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/answer.md");
        write_atomic(&path, "42\n").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "42\n");
        assert!(!dir.path().join("nested/answer.md.tmp").exists());
    }

    #[test]
    fn ask_sync_reports_missing_file() {
        let config = PromptConfig::default();
        let err = ask_sync(Some("/no/such/doc.png"), InputKind::Auto, "hi", &config).unwrap_err();
        assert!(matches!(err, DocPromptError::FileNotFound { .. }));
    }

    #[test]
    fn batch_keeps_input_order() {
        let config = PromptConfig::builder().concurrency(3).build().unwrap();
        let inputs: Vec<String> = (0..5).map(|i| format!("/no/such/{i}.pdf")).collect();
        let items = tokio_test::block_on(ask_batch(&inputs, InputKind::Auto, "hi", &config));
        assert_eq!(items.len(), 5);
        for (item, input_str) in items.iter().zip(&inputs) {
            assert_eq!(&item.input, input_str);
            assert!(matches!(item.result, Err(DocPromptError::FileNotFound { .. })));
        }
    }
}
