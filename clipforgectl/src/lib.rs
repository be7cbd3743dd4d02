use std::fmt;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use clipforge_core::{
    load_pipeline_config, ArchiveBuilder, FfmpegBackend, MediaInfo, PipelineConfig, Processor,
    ProcessorReport,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] clipforge_core::ConfigError),
    #[error(transparent)]
    Processor(#[from] clipforge_core::ProcessorError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    CheckFailed(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Derive media archives from a video file", long_about = None)]
pub struct Cli {
    /// Path to clipforge.toml; built-in defaults apply when it does not exist
    #[arg(long, default_value = "configs/clipforge.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log at debug level regardless of RUST_LOG
    #[arg(long, short)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a video and write every derivative into one zip archive
    Process(ProcessArgs),
    /// Print the duration and streams of a video
    Probe(ProbeArgs),
    /// Verify that the media tools run and the config parses
    Check,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Input video
    pub input: PathBuf,
    /// Archive path (defaults to <input-stem>_derivatives.zip next to the input)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Write the parts that completed when a later part fails
    #[arg(long, default_value_t = false)]
    pub keep_partial: bool,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Input video
    pub input: PathBuf,
}

/// Installs the stderr subscriber. Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Process(args) => {
            let summary = runtime.block_on(context.process(args))?;
            render(&summary, cli.format)?;
        }
        Commands::Probe(args) => {
            let probe = runtime.block_on(context.probe(&args.input))?;
            render(&probe, cli.format)?;
        }
        Commands::Check => {
            let report = runtime.block_on(context.health_check());
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::CheckFailed(
                    "one or more checks failed".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

/// `<stem>_derivatives.zip` beside the input.
pub fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    input.with_file_name(format!("{stem}_derivatives.zip"))
}

#[derive(Debug)]
struct AppContext {
    config: PipelineConfig,
    /// `None` when the built-in defaults are in use.
    config_path: Option<PathBuf>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        if cli.config.exists() {
            let config = load_pipeline_config(&cli.config)?;
            Ok(Self {
                config,
                config_path: Some(cli.config.clone()),
            })
        } else {
            warn!(path = %cli.config.display(), "config not found, using defaults");
            Ok(Self {
                config: PipelineConfig::default(),
                config_path: None,
            })
        }
    }

    fn processor(&self) -> Processor {
        Processor::with_ffmpeg(self.config.clone())
    }

    async fn process(&self, args: &ProcessArgs) -> Result<ProcessSummary> {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| default_output(&args.input));
        let mut archive = ArchiveBuilder::new();

        match self.processor().process(&args.input, &mut archive).await {
            Ok(report) => {
                let bytes = archive.finalize()?;
                tokio::fs::write(&output, &bytes).await?;
                info!(output = %output.display(), bytes = bytes.len(), "archive written");
                Ok(ProcessSummary {
                    output,
                    archive_bytes: bytes.len(),
                    report,
                })
            }
            Err(err) => {
                if args.keep_partial && !archive.is_empty() {
                    let bytes = archive.finalize()?;
                    tokio::fs::write(&output, &bytes).await?;
                    warn!(
                        output = %output.display(),
                        entries = archive.len(),
                        error = %err,
                        "wrote partial archive"
                    );
                }
                Err(err.into())
            }
        }
    }

    async fn probe(&self, input: &Path) -> Result<ProbeReport> {
        let source = self.processor().open_source(input).await?;
        Ok(ProbeReport {
            path: source.path,
            info: source.info,
        })
    }

    async fn health_check(&self) -> Vec<HealthEntry> {
        let mut entries = Vec::new();
        match &self.config_path {
            Some(path) => entries.push(HealthEntry::ok(
                "config",
                format!("loaded {}", path.display()),
            )),
            None => entries.push(HealthEntry::warn("config", "file not found, using defaults")),
        }

        let backend = FfmpegBackend::from_config(&self.config);
        let tools = format!(
            "{} / {}",
            self.config.tools.ffmpeg.display(),
            self.config.tools.ffprobe.display()
        );
        match backend.verify_tools().await {
            Ok(()) => entries.push(HealthEntry::ok("media tools", tools)),
            Err(err) => entries.push(HealthEntry::error("media tools", format!("{tools}: {err}"))),
        }
        entries
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessSummary {
    pub output: PathBuf,
    pub archive_bytes: usize,
    pub report: ProcessorReport,
}

impl DisplayFallback for ProcessSummary {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Archive: {} ({} entries, {} bytes)",
            self.output.display(),
            self.report.entry_count(),
            self.archive_bytes
        )];
        for part in &self.report.parts {
            let quality = part
                .lowest_quality
                .map(|q| q.to_string())
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "  {} [{:.2}s..{:.2}s] chunks={} frames={} min_quality={}",
                part.part, part.start, part.end, part.audio_chunks, part.frames, quality
            ));
            if part.audio_skipped {
                lines.push("    audio skipped: no audio track".to_string());
            }
            for name in &part.budget_misses {
                lines.push(format!("    over budget: {name}"));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub path: PathBuf,
    pub info: MediaInfo,
}

impl DisplayFallback for ProbeReport {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("File: {}", self.path.display()),
            format!("Container: {}", self.info.container),
            format!("Duration: {:.3} s", self.info.duration),
        ];
        match &self.info.video {
            Some(video) => lines.push(format!(
                "Video: {} {}x{}",
                video.codec, video.width, video.height
            )),
            None => lines.push("Video: none".to_string()),
        }
        match &self.info.audio {
            Some(audio) => lines.push(format!(
                "Audio: {} {} Hz, {} ch",
                audio.codec, audio.sample_rate, audio.channels
            )),
            None => lines.push("Audio: none".to_string()),
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(HealthEntry::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for HealthEntry {
    fn display(&self) -> String {
        format!(
            "[{status}] {name}: {detail}",
            status = self.status,
            name = self.name,
            detail = self.detail
        )
    }
}
