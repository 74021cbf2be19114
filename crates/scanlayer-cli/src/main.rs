// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanlayer — scanned PDF to searchable PDF converter.
//
// Entry point. Initialises logging, builds the pipeline configuration from a
// JSON file and command-line overrides, and converts one document.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scanlayer_core::config::PipelineConfig;
use scanlayer_core::error::ScanlayerError;
use scanlayer_core::human_errors::humanize_error;
use scanlayer_core::types::output_filename_for;
use scanlayer_document::{CancellationToken, Pipeline};

/// Add an invisible OCR text layer to a scanned PDF.
#[derive(Debug, Parser)]
#[command(name = "scanlayer", version, about)]
struct Args {
    /// Scanned PDF to convert.
    #[arg(required_unless_present = "print_config")]
    input: Option<PathBuf>,

    /// Where to write the searchable PDF [default: OCR_<input name> next to the input].
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON pipeline configuration; command-line flags override it.
    #[arg(long, env = "SCANLAYER_CONFIG")]
    config: Option<PathBuf>,

    /// Rasterization resolution in dots per inch.
    #[arg(long)]
    dpi: Option<u32>,

    /// Tesseract language model; repeat for several (e.g. --lang jpn --lang jpn_vert).
    #[arg(short, long = "lang")]
    languages: Vec<String>,

    /// Tesseract page segmentation mode.
    #[arg(long)]
    psm: Option<u8>,

    /// Tesseract OCR engine mode.
    #[arg(long)]
    oem: Option<u8>,

    /// Pages converted concurrently.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-page recognition timeout in seconds (0 disables it).
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

impl Args {
    /// Configuration file (or defaults) with command-line overrides applied.
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(dpi) = self.dpi {
            config.dpi = dpi;
        }
        if !self.languages.is_empty() {
            config.recognition.languages = self.languages.clone();
        }
        if let Some(psm) = self.psm {
            config.recognition.page_segmentation = psm;
        }
        if let Some(oem) = self.oem {
            config.recognition.engine_mode = oem;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.recognition.page_timeout_secs = (timeout > 0).then_some(timeout);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Default output path: `OCR_<name>` in the input's directory.
fn default_output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(output_filename_for(&name))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ScanlayerError>() {
                Some(scan_err) => {
                    let human = humanize_error(scan_err);
                    eprintln!("error: {}", human.message);
                    eprintln!("hint: {}", human.suggestion);
                    tracing::debug!(error = %scan_err, "Conversion error detail");
                }
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = args.pipeline_config()?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let input = args.input.clone().context("no input file given")?;
    let output = args.output.clone().unwrap_or_else(|| default_output_path(&input));
    let bytes = std::fs::read(&input).with_context(|| format!("failed to read {}", input.display()))?;
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    tracing::info!(input = %input.display(), output = %output.display(), "Scanlayer starting");

    let pipeline = Pipeline::new(config)?;
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")?
            .progress_chars("█▓░"),
    );

    let result = pipeline.process_named(
        &name,
        &bytes,
        |update| {
            progress.set_length(update.pages_total as u64);
            progress.set_position(update.pages_done.saturating_sub(1) as u64);
            progress.set_message(update.message.clone());
        },
        &CancellationToken::new(),
    );
    let result = match result {
        Ok(result) => result,
        Err(err) => {
            progress.abandon();
            return Err(err.into());
        }
    };
    progress.set_position(result.page_count as u64);
    progress.finish_with_message("done");

    std::fs::write(&output, &result.bytes).with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "{} pages -> {} (run {}, input sha256 {})",
        result.page_count,
        output.display(),
        result.run_id,
        result.source_sha256
    );
    Ok(())
}
