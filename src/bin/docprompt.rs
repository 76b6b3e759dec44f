//! CLI binary for edgequake-docprompt.
//!
//! A thin shim over the library crate: flags map to `PromptConfig`, results
//! go to stdout, progress and errors to stderr. Without a prompt or a
//! document it starts an interactive session.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docprompt::prompts::DOCUMENT_READER_SYSTEM_PROMPT;
use edgequake_docprompt::{
    ask, ask_batch, ask_to_file, inspect, DocumentInfo, InputKind, ProgressCallback, PromptConfig,
    PromptProgressCallback, PromptResponse, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr that follows the ask stages.
///
/// A fresh bar is created per request so the same callback can serve every
/// question of an interactive session. With the spinner off only the
/// detected file type is reported, on stdout.
struct CliProgressCallback {
    spinner: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new(spinner: bool) -> Arc<Self> {
        Arc::new(Self {
            spinner,
            bar: Mutex::new(None),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if !self.spinner {
            return;
        }
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        let bar = guard.get_or_insert_with(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        f(bar);
    }

    /// Remove the spinner line, if one is showing.
    fn clear(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = guard.take() {
            bar.finish_and_clear();
        }
    }
}

impl PromptProgressCallback for CliProgressCallback {
    fn on_document_loaded(&self, info: &DocumentInfo) {
        let line = detected_line(info);
        if self.spinner {
            self.with_bar(|bar| bar.println(line));
        } else {
            println!("{line}");
        }
    }

    fn on_stage(&self, stage: Stage) {
        self.with_bar(|bar| bar.set_message(format!("{stage}…")));
    }

    fn on_retry(&self, attempt: u32, max: u32, error: &str) {
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.with_bar(|bar| {
            bar.println(format!(
                "  {} retry {attempt}/{max}  {}",
                cyan("↻"),
                dim(&msg)
            ))
        });
    }

    fn on_response(&self, _chars: usize) {
        self.clear();
    }
}

fn detected_line(info: &DocumentInfo) -> String {
    format!(
        "{} Detected file type: {}  {}",
        cyan("◆"),
        bold(&info.mime),
        dim(&format!("({}, {} bytes)", info.name, info.size_bytes)),
    )
}

/// The callback for this run. Interactive sessions always get one so the
/// detected file type is shown even with the spinner off.
fn progress_for(show_progress: bool, interactive: bool) -> Option<Arc<CliProgressCallback>> {
    if show_progress {
        Some(CliProgressCallback::new(true))
    } else if interactive {
        Some(CliProgressCallback::new(false))
    } else {
        None
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ask about the first page of a PDF
  docprompt -p "What is the invoice total?" invoice.pdf

  # Ask about an image, insisting it really is an image
  docprompt --type image -p "Transcribe the handwriting" note.jpg

  # Prompt only, no document
  docprompt --type text -p "Explain base64 in one paragraph"

  # Another page, saved to a file
  docprompt --page 3 -p "Summarise this page" report.pdf -o summary.md

  # Same question over several documents
  docprompt -p "Who signed this?" a.pdf b.png c.jpg

  # Interactive session
  docprompt -i

  # Show what a file is without calling a model
  docprompt --inspect-only scan.pdf

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY          Google Gemini API key (also read from .env)
  GEMINI_API_KEY          Same, under the provider's own name
  OPENAI_API_KEY          Use OpenAI instead (with --provider openai)
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory) for PDF input
"#;

/// Ask a Vision LLM about a PDF or image.
#[derive(Parser, Debug)]
#[command(
    name = "docprompt",
    version,
    about = "Ask a Vision LLM about a PDF or image",
    long_about = "Send a prompt together with a document (the first page of a PDF, or a \
PNG/JPEG image) to a multimodal model and print the answer. Uses Google Gemini by default; \
OpenAI, Anthropic and Ollama work through --provider.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents: local PDF/PNG/JPEG paths or HTTP/HTTPS URLs.
    inputs: Vec<String>,

    /// The question or instruction for the model.
    #[arg(short, long, env = "DOCPROMPT_PROMPT")]
    prompt: Option<String>,

    /// Input type: auto, text, pdf, image.
    #[arg(short = 't', long = "type", env = "DOCPROMPT_TYPE", value_enum, default_value = "auto")]
    kind: KindArg,

    /// Start an interactive session.
    #[arg(short, long)]
    interactive: bool,

    /// Write the response to this file instead of stdout.
    #[arg(short, long, env = "DOCPROMPT_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (default: gemini-2.0-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// PDF page to send (1-indexed).
    #[arg(long, env = "DOCPROMPT_PAGE", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..))]
    page: u32,

    /// Longest edge of the attached image in pixels.
    #[arg(long, env = "DOCPROMPT_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// JPEG quality for rasterised pages (1–100).
    #[arg(long, env = "DOCPROMPT_JPEG_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCPROMPT_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a system prompt.
    #[arg(long, env = "DOCPROMPT_SYSTEM_PROMPT", conflicts_with = "reader_mode")]
    system_prompt: Option<PathBuf>,

    /// Use the built-in document-reader system prompt.
    #[arg(long)]
    reader_mode: bool,

    /// Max output tokens.
    #[arg(long, env = "DOCPROMPT_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCPROMPT_TEMPERATURE", default_value_t = 0.4)]
    temperature: f32,

    /// Retries on transient LLM failure.
    #[arg(long, env = "DOCPROMPT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Concurrent model calls when several documents are given.
    #[arg(short, long, env = "DOCPROMPT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Output structured JSON instead of plain text.
    #[arg(long, env = "DOCPROMPT_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DOCPROMPT_NO_PROGRESS")]
    no_progress: bool,

    /// Print document information only, no model call.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCPROMPT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except the response and errors.
    #[arg(short, long, env = "DOCPROMPT_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCPROMPT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// LLM call timeout in seconds.
    #[arg(long, env = "DOCPROMPT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Auto,
    Text,
    Pdf,
    Image,
}

impl From<KindArg> for InputKind {
    fn from(v: KindArg) -> Self {
        match v {
            KindArg::Auto => InputKind::Auto,
            KindArg::Text => InputKind::Text,
            KindArg::Pdf => InputKind::Pdf,
            KindArg::Image => InputKind::Image,
        }
    }
}

impl Cli {
    fn wants_interactive(&self) -> bool {
        self.interactive || (self.prompt.is_none() && self.inputs.is_empty() && !self.inspect_only)
    }
}

fn main() -> Result<()> {
    // Pick up API keys from a local .env file.
    let _ = dotenvy::dotenv();
    mirror_google_key();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;

    let interactive = !cli.inspect_only && cli.wants_interactive();
    let progress = progress_for(show_progress, interactive);
    let progress_cb = progress
        .clone()
        .map(|cb| cb as Arc<dyn PromptProgressCallback>);
    let config = runtime.block_on(build_config(&cli, progress_cb))?;

    let result = if cli.inspect_only {
        runtime.block_on(run_inspect(&cli, &config))
    } else if interactive {
        run_interactive(&runtime, &cli, &config, progress.as_deref())
    } else {
        runtime.block_on(run_once(&cli, &config))
    };

    if let Some(ref cb) = progress {
        cb.clear();
    }
    result
}

/// Expose `GOOGLE_API_KEY` under the name the Gemini provider reads.
fn mirror_google_key() {
    let has_gemini = std::env::var("GEMINI_API_KEY").map(|v| !v.is_empty()).unwrap_or(false);
    if has_gemini {
        return;
    }
    if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
        if !key.is_empty() {
            std::env::set_var("GEMINI_API_KEY", key);
        }
    }
}

/// Map CLI args to `PromptConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PromptConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else if cli.reader_mode {
        Some(DOCUMENT_READER_SYSTEM_PROMPT.to_string())
    } else {
        None
    };

    let mut builder = PromptConfig::builder()
        .page(cli.page as usize)
        .max_rendered_pixels(cli.max_pixels)
        .jpeg_quality(cli.jpeg_quality)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

// ── Inspect-only mode ────────────────────────────────────────────────────────

async fn run_inspect(cli: &Cli, config: &PromptConfig) -> Result<()> {
    if cli.inputs.is_empty() {
        anyhow::bail!("--inspect-only needs at least one document");
    }

    for input in &cli.inputs {
        let info = inspect(input, config)
            .await
            .with_context(|| format!("Failed to inspect {input}"))?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise document info")?
            );
            continue;
        }

        println!("File:         {}", input);
        println!("Type:         {}", info.mime);
        println!("Size:         {} bytes", info.size_bytes);
        if let Some(pages) = info.page_count {
            println!("Pages:        {}", pages);
        }
        if let Some((w, h)) = info.dimensions {
            println!("Dimensions:   {}x{} px", w, h);
        }
    }
    Ok(())
}

// ── One-shot and batch modes ─────────────────────────────────────────────────

async fn run_once(cli: &Cli, config: &PromptConfig) -> Result<()> {
    let prompt = cli.prompt.clone().unwrap_or_default();
    let kind: InputKind = cli.kind.into();

    if cli.inputs.len() > 1 {
        return run_batch(cli, config, &prompt, kind).await;
    }
    let input = cli.inputs.first().map(String::as_str);

    if let Some(ref output_path) = cli.output {
        let response = ask_to_file(input, kind, &prompt, output_path, config)
            .await
            .context("Failed to generate content")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} chars  {}ms  →  {}",
                green("✔"),
                response.text.len(),
                response.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            print_usage(&response);
        }
        return Ok(());
    }

    let response = ask(input, kind, &prompt, config)
        .await
        .context("Failed to generate content")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&response).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        write_stdout(&response.text)?;
        if !cli.quiet {
            print_usage(&response);
        }
    }
    Ok(())
}

async fn run_batch(cli: &Cli, config: &PromptConfig, prompt: &str, kind: InputKind) -> Result<()> {
    if cli.output.is_some() {
        anyhow::bail!("--output takes a single document; redirect stdout for several");
    }

    let items = ask_batch(&cli.inputs, kind, prompt, config).await;
    let failed = items.iter().filter(|i| i.result.is_err()).count();

    if cli.json {
        let values: Vec<serde_json::Value> = items
            .iter()
            .map(|item| match &item.result {
                Ok(resp) => serde_json::json!({ "input": item.input, "response": resp }),
                Err(e) => serde_json::json!({ "input": item.input, "error": e.to_string() }),
            })
            .collect();
        let json = serde_json::to_string_pretty(&values).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        for item in &items {
            println!("## {}\n", item.input);
            match &item.result {
                Ok(resp) => write_stdout(&resp.text)?,
                Err(e) => eprintln!("{} {}: {}", red("✗"), item.input, e),
            }
            println!();
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed}/{} documents failed", items.len());
    }
    Ok(())
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

fn print_usage(response: &PromptResponse) {
    eprintln!(
        "   {} / {}  -  {} tokens in  /  {} tokens out",
        dim(&response.provider),
        dim(&response.model),
        dim(&response.stats.input_tokens.to_string()),
        dim(&response.stats.output_tokens.to_string()),
    );
}

// ── Interactive mode ─────────────────────────────────────────────────────────

/// Read one line from stdin after printing `label`. `None` on EOF.
fn read_field(stdin: &mut impl BufRead, label: &str) -> Result<Option<String>> {
    print!("{} ", bold(label));
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    let n = stdin.read_line(&mut line).context("Failed to read stdin")?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn is_exit(s: &str) -> bool {
    matches!(s, "quit" | "exit" | ":q")
}

fn run_interactive(
    runtime: &tokio::runtime::Runtime,
    cli: &Cli,
    config: &PromptConfig,
    progress: Option<&CliProgressCallback>,
) -> Result<()> {
    println!("{}", bold("Images and Docs Reading"));
    println!(
        "{}",
        dim("Type a prompt, then a document path or URL. Enter 'quit' to leave.")
    );

    let default_kind: InputKind = cli.kind.into();
    let stdin = io::stdin();
    let mut stdin = stdin.lock();

    loop {
        println!();
        let Some(prompt) = read_field(&mut stdin, "Enter your prompt:")? else {
            break;
        };
        if is_exit(&prompt) {
            break;
        }

        let Some(document) = read_field(&mut stdin, "Document (PDF or image, blank for none):")?
        else {
            break;
        };
        if is_exit(&document) {
            break;
        }

        let Some(kind_str) = read_field(
            &mut stdin,
            &format!("Input type [auto/text/pdf/image] ({default_kind}):"),
        )?
        else {
            break;
        };
        let kind = if kind_str.is_empty() {
            default_kind
        } else {
            match kind_str.parse::<InputKind>() {
                Ok(k) => k,
                Err(e) => {
                    eprintln!("{} {}", red("✗"), e);
                    continue;
                }
            }
        };

        let input = Some(document.as_str()).filter(|d| !d.is_empty());
        match runtime.block_on(ask(input, kind, &prompt, config)) {
            Ok(response) => {
                println!("\n{}\n", bold(&cyan("Response")));
                write_stdout(&response.text)?;
                if !cli.quiet {
                    print_usage(&response);
                }
            }
            Err(e) => {
                if let Some(cb) = progress {
                    cb.clear();
                }
                eprintln!("{} {}", red("✗"), e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_docprompt::MediaType;

    #[test]
    fn interactive_always_reports_file_type() {
        let quiet = progress_for(false, true).expect("interactive callback");
        assert!(!quiet.spinner);
        assert!(progress_for(true, false).expect("spinner").spinner);
        assert!(progress_for(false, false).is_none());
    }

    #[test]
    fn quiet_callback_never_starts_a_spinner() {
        let cb = progress_for(false, true).unwrap();
        cb.on_stage(Stage::Generating);
        cb.on_retry(1, 2, "503");
        assert!(cb.bar.lock().unwrap().is_none());
    }

    #[test]
    fn detected_line_names_the_mime() {
        let info = DocumentInfo {
            name: "scan.pdf".into(),
            media: MediaType::Pdf,
            mime: "application/pdf".into(),
            size_bytes: 1234,
            page_count: None,
            dimensions: None,
        };
        let line = detected_line(&info);
        assert!(line.contains("Detected file type:"), "got: {line}");
        assert!(line.contains("application/pdf"));
        assert!(line.contains("1234 bytes"));
    }

    #[test]
    fn parses_interactive_flags() {
        let cli = Cli::try_parse_from(["docprompt", "--no-progress"]).unwrap();
        assert!(cli.wants_interactive());
        let cli = Cli::try_parse_from(["docprompt", "-p", "hi", "a.png"]).unwrap();
        assert!(!cli.wants_interactive());
    }
}
