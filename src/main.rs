//! CLI entry point for `mailpress`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailpress::config::{self, Config};
use mailpress::pipeline::{ConversionOptions, ConversionPipeline, ConversionReport, Status};
use mailpress::render::{Orientation, PageSize};

#[derive(Parser)]
#[command(name = "mailpress", version, about = "Convert mail artifacts to PDF")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one mail file (.eml, .mbox, .msg, or .zip) to PDF
    Convert {
        input: PathBuf,
        /// Output directory for PDFs and extracted attachments
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Page size (a4, letter, a3)
        #[arg(long)]
        page_size: Option<String>,
        /// Page orientation (portrait, landscape)
        #[arg(long)]
        orientation: Option<String>,
        /// Do not extract attachments alongside the PDF
        #[arg(long)]
        no_attachments: bool,
    },
    /// Convert many files in parallel
    Batch {
        inputs: Vec<PathBuf>,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        #[arg(long)]
        page_size: Option<String>,
        #[arg(long)]
        orientation: Option<String>,
        #[arg(long)]
        no_attachments: bool,
    },
    /// Check that a file is recognized and parseable, without converting
    Validate {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let pipeline = ConversionPipeline::new(&config);

    match cli.command {
        Commands::Convert {
            input,
            output,
            page_size,
            orientation,
            no_attachments,
        } => {
            let options = build_options(
                &config,
                page_size.as_deref(),
                orientation.as_deref(),
                no_attachments,
            )?;
            cmd_convert(&pipeline, &input, &output, &options)
        }
        Commands::Batch {
            inputs,
            output,
            page_size,
            orientation,
            no_attachments,
        } => {
            let options = build_options(
                &config,
                page_size.as_deref(),
                orientation.as_deref(),
                no_attachments,
            )?;
            cmd_batch(&pipeline, &inputs, &output, &options)
        }
        Commands::Validate { path, json } => cmd_validate(&pipeline, &path, json),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailpress.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Merge CLI overrides into the configured conversion defaults.
fn build_options(
    config: &Config,
    page_size: Option<&str>,
    orientation: Option<&str>,
    no_attachments: bool,
) -> anyhow::Result<ConversionOptions> {
    let mut options = ConversionOptions::from_config(config);

    if let Some(name) = page_size {
        options.page_size = PageSize::from_name(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown page size '{name}'. Supported: a4, letter, a3"))?;
    }
    if let Some(name) = orientation {
        options.orientation = Orientation::from_name(name).ok_or_else(|| {
            anyhow::anyhow!("Unknown orientation '{name}'. Supported: portrait, landscape")
        })?;
    }
    if no_attachments {
        options.extract_attachments = false;
    }

    Ok(options)
}

/// Convert one input file and print the per-message results.
fn cmd_convert(
    pipeline: &ConversionPipeline,
    input: &Path,
    output: &Path,
    options: &ConversionOptions,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let reports = pipeline.convert(input, output, options);
    let elapsed = start.elapsed();

    print_report_table(&reports, elapsed);

    if reports.iter().all(|r| r.status == Status::Error) {
        anyhow::bail!("no message converted from {}", input.display());
    }
    Ok(())
}

/// Convert many inputs on the worker pool with a progress bar.
fn cmd_batch(
    pipeline: &ConversionPipeline,
    inputs: &[PathBuf],
    output: &Path,
    options: &ConversionOptions,
) -> anyhow::Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("no input files given");
    }

    println!(
        "  Converting {} file(s) to {}",
        inputs.len(),
        output.display()
    );

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Converting [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    let start = Instant::now();
    let reports = pipeline.convert_batch(inputs, output, options);
    let elapsed = start.elapsed();

    pb.finish_and_clear();
    print_report_table(&reports, elapsed);

    Ok(())
}

/// Validate a file and print the result as a table or JSON.
fn cmd_validate(pipeline: &ConversionPipeline, path: &Path, json: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let report = pipeline.validate(path);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("  {:<12} {}", "File", report.file.display());
        println!("  {:<12} {}", "Format", report.format);
        println!("  {:<12} {}", "Size", format_size(report.size, BINARY));
        if !report.sha256.is_empty() {
            println!("  {:<12} {}", "SHA-256", report.sha256);
        }
        println!(
            "  {:<12} {}",
            "Parseable",
            if report.parseable { "yes" } else { "no" }
        );
        for error in &report.errors {
            println!("  {:<12} {}", "Issue", error);
        }
        println!();
    }

    if !report.parseable {
        anyhow::bail!("{} is not parseable", path.display());
    }
    Ok(())
}

/// Print conversion results in a human-readable table.
fn print_report_table(reports: &[ConversionReport], elapsed: std::time::Duration) {
    let ok = reports.iter().filter(|r| r.status == Status::Success).count();
    let failed = reports.len() - ok;

    println!();
    for report in reports {
        match report.status {
            Status::Success => {
                let output = report
                    .output
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!("  ok    {:<40} -> {}", report.source, output);
                if !report.attachments.is_empty() {
                    println!("        {} attachment(s) extracted", report.attachments.len());
                }
            }
            Status::Error => {
                println!(
                    "  FAIL  {:<40} {}",
                    report.source,
                    report.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        for warning in &report.warnings {
            println!("        warning: {warning}");
        }
    }
    println!();
    println!(
        "  {} converted, {} failed in {:.2?}",
        ok, failed, elapsed
    );
    println!();
}
