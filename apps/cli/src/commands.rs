//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use crisisbrief_backends::{generation_loader, transcriber_loader};
use crisisbrief_core::{
    AudioInput, CancelToken, Pipeline, PipelineState, ProgressReporter, Source, event,
};
use crisisbrief_shared::{
    AppConfig, DevicePreference, SummaryResult, init_config, load_config, load_config_from,
    validate_api_key,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// crisisbrief: audience-adaptive disaster report summaries.
#[derive(Parser)]
#[command(
    name = "crisisbrief",
    version,
    about = "Condense disaster reports into a public alert, a responder summary and an authority report.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.crisisbrief/crisisbrief.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Output format for `summarize`.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
    Markdown,
}

/// Where the report text comes from. Exactly one must be given.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub(crate) struct TextInput {
    /// Report text passed inline.
    #[arg(long)]
    pub text: Option<String>,

    /// Read the report text from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Input for `summarize`: text, a text file or an audio recording.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub(crate) struct SummarizeInput {
    /// Report text passed inline.
    #[arg(long)]
    pub text: Option<String>,

    /// Read the report text from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Transcribe an audio recording (wav, mp3, m4a, flac, ogg) first.
    #[arg(long)]
    pub audio: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Summarize a disaster report at all three abstraction levels.
    Summarize {
        #[command(flatten)]
        input: SummarizeInput,

        /// Language hint for transcription (e.g. "en").
        #[arg(long, requires = "audio")]
        language: Option<String>,

        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Write output to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Override the configured generation model.
        #[arg(long)]
        model: Option<String>,

        /// Override the configured device preference.
        #[arg(long)]
        device: Option<DeviceArg>,

        /// Override the configured number of concurrent backend calls.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Classify the disaster type of a report without generating anything.
    Detect {
        #[command(flatten)]
        input: TextInput,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Device preference flag.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum DeviceArg {
    Auto,
    Cpu,
    Gpu,
}

impl From<DeviceArg> for DevicePreference {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Auto => DevicePreference::Auto,
            DeviceArg::Cpu => DevicePreference::Cpu,
            DeviceArg::Gpu => DevicePreference::Gpu,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "crisisbrief=info",
        1 => "crisisbrief=debug",
        _ => "crisisbrief=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Summarize {
            input,
            language,
            format,
            out,
            model,
            device,
            concurrency,
        } => {
            let mut config = resolve_config(config_path.as_deref())?;
            if let Some(model) = model {
                config.backend.model = model;
            }
            if let Some(device) = device {
                config.backend.device = device.into();
            }
            if let Some(concurrency) = concurrency {
                config.generation.concurrency = concurrency;
            }
            let source = match (input.text, input.file, input.audio) {
                (Some(text), _, _) => Source::Text(text),
                (_, Some(path), _) => Source::Text(read_text(&path)?),
                (_, _, Some(path)) => {
                    Source::Audio(AudioInput::from_path(path).with_language(language))
                }
                _ => return Err(eyre!("one of --text, --file or --audio is required")),
            };
            cmd_summarize(config, source, format, out.as_deref()).await
        }
        Command::Detect { input } => cmd_detect(input),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read report file '{}'", path.display()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_summarize(
    config: AppConfig,
    source: Source,
    format: OutputFormat,
    out: Option<&Path>,
) -> Result<()> {
    // Hosted inference needs a token; self-hosted endpoints usually don't.
    if config.backend.endpoint.contains("huggingface.co") {
        validate_api_key(&config)?;
    }

    info!(
        source = source.kind(),
        model = %config.backend.model,
        "summarizing report"
    );

    let backend = generation_loader(&config.backend);
    let transcriber = transcriber_loader(&config.asr);
    let pipeline = Pipeline::new(config, backend, transcriber)?;

    let cancel = CancelToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        })
    };

    let reporter = CliProgress::new();
    let outcome = pipeline.run(source, &cancel, &reporter).await;
    ctrl_c.abort();
    reporter.finish();
    let result = outcome?;

    let rendered = match format {
        OutputFormat::Text => render_text(&result),
        OutputFormat::Json => serde_json::to_string_pretty(&result.to_record())?,
        OutputFormat::Markdown => render_markdown(&result),
    };

    match out {
        Some(path) => {
            std::fs::write(path, format!("{rendered}\n"))
                .wrap_err_with(|| format!("failed to write '{}'", path.display()))?;
            println!("Summary written to: {}", path.display());
        }
        None => println!("{rendered}"),
    }

    Ok(())
}

fn cmd_detect(input: TextInput) -> Result<()> {
    let text = match (input.text, input.file) {
        (Some(text), _) => text,
        (_, Some(path)) => read_text(&path)?,
        _ => return Err(eyre!("one of --text or --file is required")),
    };
    let detected = event::detect(&text);
    println!("  Event:      {}", detected.label);
    println!("  Category:   {:?}", detected.category);
    println!("  Confidence: {:.2}", detected.confidence);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_text(result: &SummaryResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("PUBLIC ALERT\n{}\n\n", result.alert.text));
    out.push_str(&format!(
        "RESPONDER SUMMARY\n{}\n\n",
        result.responder_summary.text
    ));
    out.push_str("AUTHORITY REPORT\n");
    out.push_str(
        &result
            .authority_report
            .to_markdown(result.generated_at.date_naive()),
    );
    out.push_str(&format!(
        "\n\nEvent type: {} ({:.2})",
        result.event_type.label, result.event_type.confidence
    ));
    out
}

fn render_markdown(result: &SummaryResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Disaster Brief: {}\n\n",
        result.event_type.label
    ));
    out.push_str(&format!("> {}\n\n", result.alert.text));
    out.push_str(&format!(
        "## Responder Summary\n\n{}\n\n",
        result.responder_summary.text
    ));
    out.push_str("## Authority Report\n\n");
    out.push_str(
        &result
            .authority_report
            .to_markdown(result.generated_at.date_naive()),
    );
    if let Some(transcript) = &result.transcript {
        out.push_str(&format!("\n\n## Transcript\n\n{transcript}"));
    }
    out
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner.set_message("Starting");
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

fn state_message(state: PipelineState) -> &'static str {
    match state {
        PipelineState::Transcribing => "Transcribing audio",
        PipelineState::Validated => "Validating report",
        PipelineState::GeneratingLevels => "Writing alert and responder summary",
        PipelineState::DetectingEventType => "Detecting event type",
        PipelineState::AssemblingReport => "Assembling authority report",
        PipelineState::Done => "Done",
        PipelineState::Failed => "Failed",
        PipelineState::Received => "Starting",
    }
}

impl ProgressReporter for CliProgress {
    fn state_changed(&self, _from: PipelineState, to: PipelineState) {
        self.spinner.set_message(state_message(to));
    }

    fn done(&self, _result: &SummaryResult) {
        self.spinner.finish_and_clear();
    }
}
