//! casetext CLI - per-page PDF text extraction with OCR fallback

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use casetext::render::{self, CleanupOptions, CleanupPreset, JsonFormat, TextOptions};
use casetext::strategy::{self, Strategy};
use casetext::{
    detect_format, CancellationToken, Document, ExtractionResult, NativeExtractor, PageObserver,
    PageResult, Pipeline, PipelineOptions, SourceFormat, SourceId,
};

#[derive(Parser)]
#[command(name = "casetext")]
#[command(version)]
#[command(about = "Extract per-page text from PDFs, with OCR for scanned pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from every page
    Extract {
        /// Input PDF, DOCX or TXT file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,

        /// Truncate text output to this many characters
        #[arg(long, value_name = "N")]
        max_chars: Option<usize>,

        /// Text cleanup preset for text output
        #[arg(long, value_enum)]
        cleanup: Option<CleanupLevel>,

        /// Fail when no page yields any text
        #[arg(long)]
        require_text: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show native text density and the chosen strategy per page
    Probe {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Check that the external tools are installed
    Doctor {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show version information
    Version,
}

/// Pipeline settings shared by the commands.
///
/// Flags override the `--config` file, which overrides the defaults.
#[derive(Args, Debug, Default)]
struct PipelineArgs {
    /// JSON file with pipeline options
    #[arg(long, value_name = "FILE", env = "CASETEXT_CONFIG")]
    config: Option<PathBuf>,

    /// Rendering resolution for OCR
    #[arg(long, env = "CASETEXT_DPI")]
    dpi: Option<u32>,

    /// Native text density at or above which OCR is skipped (0-1)
    #[arg(long, env = "CASETEXT_THRESHOLD")]
    threshold: Option<f32>,

    /// Pages processed at once
    #[arg(short = 'j', long, env = "CASETEXT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// OCR language hint, e.g. eng or eng+deu
    #[arg(short, long, env = "CASETEXT_LANGUAGE")]
    language: Option<String>,

    /// OCR timeout per page, in seconds
    #[arg(long, value_name = "SECS", env = "CASETEXT_OCR_TIMEOUT")]
    ocr_timeout: Option<u64>,

    /// Render timeout per page, in seconds
    #[arg(long, value_name = "SECS", env = "CASETEXT_RENDER_TIMEOUT")]
    render_timeout: Option<u64>,

    /// pdftoppm executable
    #[arg(long, value_name = "PATH", env = "CASETEXT_PDFTOPPM")]
    pdftoppm: Option<PathBuf>,

    /// tesseract executable
    #[arg(long, value_name = "PATH", env = "CASETEXT_TESSERACT")]
    tesseract: Option<PathBuf>,
}

impl PipelineArgs {
    fn options(&self) -> casetext::Result<PipelineOptions> {
        let mut options = match &self.config {
            Some(path) => PipelineOptions::from_json_file(path)?,
            None => PipelineOptions::default(),
        };

        if let Some(dpi) = self.dpi {
            options = options.with_dpi(dpi);
        }
        if let Some(threshold) = self.threshold {
            options = options.with_threshold(threshold);
        }
        if let Some(concurrency) = self.concurrency {
            options = options.with_concurrency(concurrency);
        }
        if let Some(language) = &self.language {
            options = options.with_language(language.clone());
        }
        if let Some(secs) = self.ocr_timeout {
            options = options.with_ocr_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.render_timeout {
            options = options.with_render_timeout(Duration::from_secs(secs));
        }
        if let Some(path) = &self.pdftoppm {
            options = options.with_pdftoppm_path(path);
        }
        if let Some(path) = &self.tesseract {
            options = options.with_tesseract_path(path);
        }

        options.validate()?;
        Ok(options)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Per-page results with status and counts
    Json,
    /// Page texts joined in order
    Text,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum CleanupLevel {
    /// Unicode normalization and whitespace only
    Minimal,
    /// Also ligatures, replacement characters and hyphenation
    Standard,
}

impl From<CleanupLevel> for CleanupPreset {
    fn from(level: CleanupLevel) -> Self {
        match level {
            CleanupLevel::Minimal => CleanupPreset::Minimal,
            CleanupLevel::Standard => CleanupPreset::Standard,
        }
    }
}

/// Advances a progress bar as pages finish.
struct ProgressObserver {
    bar: ProgressBar,
}

impl PageObserver for ProgressObserver {
    fn on_page_done(&self, result: &PageResult) {
        let status = match &result.outcome {
            ExtractionResult::NativeText { .. } => "native",
            ExtractionResult::OcrText { .. } => "ocr",
            ExtractionResult::Failed { .. } => "failed",
        };
        self.bar
            .set_message(format!("page {} {}", result.number, status));
        self.bar.inc(1);
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            input,
            output,
            format,
            compact,
            max_chars,
            cleanup,
            require_text,
            pipeline,
        } => {
            let text_options = text_options(max_chars, cleanup);
            let format = match format {
                OutputFormat::Json if compact => Output::Json(JsonFormat::Compact),
                OutputFormat::Json => Output::Json(JsonFormat::Pretty),
                OutputFormat::Text => Output::Text(text_options),
            };
            cmd_extract(&input, output.as_deref(), format, require_text, &pipeline).await
        }
        Commands::Probe { input, pipeline } => cmd_probe(&input, &pipeline),
        Commands::Doctor { pipeline } => cmd_doctor(&pipeline).await,
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

enum Output {
    Json(JsonFormat),
    Text(TextOptions),
}

fn text_options(max_chars: Option<usize>, cleanup: Option<CleanupLevel>) -> TextOptions {
    let mut options = TextOptions::new();
    if let Some(max) = max_chars {
        options = options.with_max_chars(max);
    }
    if let Some(level) = cleanup {
        options = options.with_cleanup(CleanupOptions::from_preset(level.into()));
    }
    options
}

async fn cmd_extract(
    input: &Path,
    output: Option<&Path>,
    format: Output,
    require_text: bool,
    args: &PipelineArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = args.options()?;
    let data = fs::read(input)?;
    let extension = input.extension().and_then(|e| e.to_str());
    let source = SourceId::new(input.display().to_string());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, cancelling remaining pages");
            on_interrupt.cancel();
        }
    });

    let result = match detect_format(&data, extension)? {
        SourceFormat::Pdf => {
            let doc = Arc::new(Document::load_with_id(data, source)?);

            let pb = ProgressBar::new(doc.page_count() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );

            let pipeline = Pipeline::new(options)?.with_observer(Arc::new(ProgressObserver {
                bar: pb.clone(),
            }));
            let result = pipeline.process(doc, cancel).await?;
            pb.finish_with_message("Done!");
            result
        }
        _ => {
            Pipeline::new(options)?
                .run_source(data, extension, source, cancel)
                .await?
        }
    };

    if require_text {
        result.require_text()?;
    }

    let rendered = match format {
        Output::Json(format) => render::to_json(&result, format)?,
        Output::Text(options) => render::to_text(&result, &options)?,
    };

    if let Some(path) = output {
        fs::write(path, &rendered)?;
        println!("{} {}", "Saved to".green(), path.display());
    } else {
        println!("{}", rendered);
    }

    let stats = &result.stats;
    eprintln!(
        "{} {} pages: {} native, {} ocr, {}",
        "Summary".cyan().bold(),
        stats.page_count,
        stats.native_pages,
        stats.ocr_pages,
        if stats.failed_pages == 0 {
            "0 failed".green()
        } else {
            format!("{} failed", stats.failed_pages).red()
        }
    );

    Ok(())
}

fn cmd_probe(input: &Path, args: &PipelineArgs) -> Result<(), Box<dyn std::error::Error>> {
    let options = args.options()?;
    let doc = Document::open(input)?;
    let scans = NativeExtractor::new(options.strategy.full_page_chars).extract_all(&doc);

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "File".bold(), input.display());
    println!("{}: PDF {}", "Format".bold(), doc.version());
    println!("{}: {}", "Pages".bold(), doc.page_count());
    println!();

    println!(
        "{}",
        format!("{:>5}  {:>7}  {:>8}  {}", "Page", "Chars", "Density", "Strategy")
            .cyan()
            .bold()
    );
    println!("{}", "─".repeat(40).dimmed());

    let mut needs_ocr = 0;
    for scan in &scans {
        let strategy = strategy::select(scan, &options.strategy);
        let label = match strategy {
            Strategy::NativeOnly if scan.is_blank() => "blank".dimmed(),
            Strategy::NativeOnly => "native".green(),
            Strategy::Both => "both".yellow(),
            Strategy::OcrFallback => "ocr".yellow(),
        };
        if strategy.needs_ocr() {
            needs_ocr += 1;
        }
        println!(
            "{:>5}  {:>7}  {:>8.3}  {}",
            scan.index + 1,
            scan.chars,
            scan.density,
            label
        );
    }

    println!();
    println!(
        "{}: {} of {}",
        "Pages needing OCR".bold(),
        needs_ocr,
        scans.len()
    );

    Ok(())
}

async fn cmd_doctor(args: &PipelineArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::new(args.options()?)?;
    let tools = pipeline.check_tools().await;

    println!("{}", "External Tools".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    let mut missing = 0;
    for tool in &tools {
        match &tool.version {
            Some(version) => println!(
                "{} {} ({})",
                "✓".green(),
                tool.name.bold(),
                version.dimmed()
            ),
            None => {
                missing += 1;
                println!(
                    "{} {} not found at {}",
                    "✗".red(),
                    tool.name.bold(),
                    tool.path.display()
                );
            }
        }
    }

    if missing > 0 {
        return Err(format!("{} of {} tools unavailable", missing, tools.len()).into());
    }
    Ok(())
}

fn cmd_version() {
    println!("{} {}", "casetext".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Per-page PDF text extraction with OCR fallback");
    println!();
    println!("License: MIT");
}
