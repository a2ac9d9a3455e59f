// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagetally — count the pages of print jobs.
//
// Entry point. Parses arguments, initialises logging, analyses every input in
// turn and prints the total page count (or per-page ink coverage). Inputs
// that fail are reported on stderr and make the process exit non-zero.

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pagetally_core::config::{AnalyzerOptions, MAX_RESOLUTION, MIN_RESOLUTION};
use pagetally_core::error::PagetallyError;
use pagetally_core::human_errors::humanize_error;
use pagetally_core::types::{Colorspace, JobReport, PageCoverage};
use pagetally_pdl::{Analyzer, InputSource};

/// Count the pages of print jobs written in PostScript, PDF, PCL and other
/// page description languages.
#[derive(Debug, Parser)]
#[command(name = "pagetally", author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Total pages of two jobs
    pagetally report.ps invoice.pcl

    # Per-page CMYK coverage of a job read from a pipe
    lpr-filter | pagetally -c cmyk -r 150")]
struct Cli {
    /// Job files to analyse. `-` reads standard input.
    files: Vec<String>,

    /// Log what the parsers find
    #[arg(short, long)]
    debug: bool,

    /// Report ink coverage in this colorspace: bw, rgb, cmyk, cmy or gc
    #[arg(short, long, value_parser = parse_colorspace)]
    colorspace: Option<Colorspace>,

    /// Rendering resolution for ink coverage, in DPI
    #[arg(
        short,
        long,
        default_value_t = MIN_RESOLUTION,
        value_parser = clap::value_parser!(u32).range(i64::from(MIN_RESOLUTION)..=i64::from(MAX_RESOLUTION))
    )]
    resolution: u32,

    /// Print one JSON record per input instead of the total
    #[arg(long)]
    json: bool,
}

/// Per-page coverage of one input, as printed with `--json`.
#[derive(Debug, Serialize)]
struct CoverageRecord {
    input: String,
    pages: Vec<PageCoverage>,
}

fn parse_colorspace(value: &str) -> Result<Colorspace, String> {
    Colorspace::from_keyword(value)
        .ok_or_else(|| format!("unknown colorspace `{value}`, expected bw, rgb, cmyk, cmy or gc"))
}

/// Standard input joins the inputs when nothing else was named, or when data
/// is being piped in and `-` was not listed explicitly.
fn with_stdin(mut files: Vec<String>, stdin_is_terminal: bool) -> Vec<String> {
    let has_dash = files.iter().any(|file| file == "-");
    if files.is_empty() || (!stdin_is_terminal && !has_dash) {
        files.push("-".to_string());
    }
    files
}

/// `C:  12.500000      M:   0.000000 ...`
fn coverage_line(page: &PageCoverage) -> String {
    page.planes
        .iter()
        .map(|(plane, percent)| format!("{plane}: {percent:>10.6}"))
        .collect::<Vec<_>>()
        .join("      ")
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn report_failure(input: &str, err: PagetallyError) {
    let human = humanize_error(&err);
    debug!(input, severity = ?human.severity, retriable = human.retriable, "input failed");
    eprintln!("ERROR: {}", err.in_job(input));
    eprintln!("       {}", human.suggestion);
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let options = AnalyzerOptions {
        resolution: cli.resolution,
        colorspace: cli.colorspace,
        ..AnalyzerOptions::from_env()
    };
    let analyzer = match Analyzer::new(options) {
        Ok(analyzer) => analyzer,
        Err(err) => {
            report_failure("pagetally", err);
            return ExitCode::FAILURE;
        }
    };

    let mut failed = false;
    let mut total = 0u64;
    let mut reports: Vec<JobReport> = Vec::new();
    let mut coverage: Vec<CoverageRecord> = Vec::new();

    for arg in with_stdin(cli.files, std::io::stdin().is_terminal()) {
        let source = InputSource::from_arg(&arg);
        let outcome = match cli.colorspace {
            Some(colorspace) => analyzer
                .open(source)
                .and_then(|job| job.ink_coverage(colorspace))
                .map(|pages| {
                    coverage.push(CoverageRecord {
                        input: arg.clone(),
                        pages,
                    })
                }),
            None if cli.json => analyzer.report(source).map(|report| {
                total += report.pages;
                reports.push(report);
            }),
            None => analyzer.count_pages(source).map(|pages| total += pages),
        };
        if let Err(err) = outcome {
            report_failure(&arg, err);
            failed = true;
        }
    }

    let printed = match (cli.json, cli.colorspace.is_some()) {
        (true, true) => serde_json::to_string_pretty(&coverage),
        (true, false) => serde_json::to_string_pretty(&reports),
        (false, true) => Ok(coverage
            .iter()
            .flat_map(|record| record.pages.iter())
            .map(coverage_line)
            .collect::<Vec<_>>()
            .join("\n")),
        (false, false) => Ok(total.to_string()),
    };
    match printed {
        Ok(text) => println!("{text}"),
        Err(err) => {
            report_failure("output", err.into());
            failed = true;
        }
    }

    debug!(total, failed, "done");
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
