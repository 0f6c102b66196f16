//! PII Redaction Tool - Command Line Interface
//!
//! `redact` seals the input with the configured key, runs the pipeline and writes the
//! opened result; `status` reports liveness.

use std::path::{Path, PathBuf};
use std::process;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use pii_redact::utils::{init_logging, logger::LOG_LEVELS, read_file, validate_payload, write_file_atomic};
use pii_redact::{Document, Error, Filters, Pipeline, ProcessingConfig, Result};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();
    let matches = build_cli().get_matches();
    let level = matches
        .get_one::<String>("verbose")
        .map(String::as_str)
        .unwrap_or("info");
    if let Err(e) = init_logging(level) {
        eprintln!("❌ {}", e);
        process::exit(2);
    }
    if let Ok(path) = dotenv {
        info!("⚙️ Loaded environment from {}", path.display());
    }

    let code = match matches.subcommand() {
        Some(("redact", args)) => redact(args).await,
        Some(("status", args)) => status(args),
        _ => 2,
    };
    process::exit(code);
}

fn build_cli() -> Command {
    Command::new("pii-redact")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Removes PII from PDF documents and empties their metadata")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .value_parser(LOG_LEVELS)
                .default_value("info")
                .help("Set logging verbosity"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file (JSON/YAML)"),
        )
        .subcommand(
            Command::new("redact")
                .about("Redact PII matching the filters and scrub metadata")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .required(true)
                        .help("Input PDF file path"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .required(true)
                        .help("Output PDF file path"),
                )
                .arg(
                    Arg::new("filter")
                        .short('f')
                        .long("filter")
                        .value_name("CATEGORY")
                        .action(ArgAction::Append)
                        .value_delimiter(',')
                        .help("PII category to redact, e.g. email, ssn, phone (repeatable)"),
                )
                .arg(
                    Arg::new("report")
                        .short('r')
                        .long("report")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write a JSON processing report"),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite an existing output file"),
                ),
        )
        .subcommand(Command::new("status").about("Report whether the pipeline can be constructed"))
}

fn load_config(args: &ArgMatches) -> Result<ProcessingConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => {
            info!("⚙️ Loading configuration from {}", path.display());
            ProcessingConfig::load(path)
        }
        None => Ok(ProcessingConfig::default()),
    }
}

fn status(args: &ArgMatches) -> i32 {
    match load_config(args).and_then(Pipeline::from_config) {
        Ok(pipeline) => {
            println!("{}", pipeline.status());
            0
        }
        Err(e) => {
            error!("❌ Pipeline unavailable: {}", e);
            1
        }
    }
}

async fn redact(args: &ArgMatches) -> i32 {
    let (Some(input), Some(output)) = (
        args.get_one::<PathBuf>("input"),
        args.get_one::<PathBuf>("output"),
    ) else {
        return 2;
    };
    let report_path = args.get_one::<PathBuf>("report");
    let filters: Filters = args
        .get_many::<String>("filter")
        .map(|values| values.collect())
        .unwrap_or_default();

    if output.exists() && !args.get_flag("force") {
        error!("❌ Output file already exists: {}", output.display());
        error!("   Use --force to overwrite existing files");
        return 1;
    }
    if filters.is_empty() {
        warn!("⚠️ No filters given, nothing will be redacted; metadata is still scrubbed");
    }

    let pipeline = match load_config(args).and_then(Pipeline::from_config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("❌ {}", e);
            return 2;
        }
    };

    let sealed = match seal_input(&pipeline, input) {
        Ok(sealed) => sealed,
        Err(e) => {
            error!("❌ {}", e);
            return 1;
        }
    };

    match pipeline.process(&sealed, &filters).await {
        Ok(outcome) => {
            let written = pipeline
                .cipher()
                .open(&outcome.ciphertext)
                .map(Document::from_bytes)
                .and_then(|document| write_file_atomic(output, document.as_bytes()));
            if let Err(e) = written {
                error!("❌ Failed to write output: {}", e);
                return 1;
            }
            info!("📄 Redacted PDF written to {}", output.display());

            if outcome.report.coverage_degraded {
                warn!("⚠️ Classifier coverage was degraded; review the output before sharing it");
            }
            if let Some(path) = report_path {
                write_report(path, outcome.report.to_json());
            }
            0
        }
        Err(failure) => {
            error!("❌ {} ({:?})", failure, failure.kind());
            if let Some(path) = report_path {
                write_report(path, failure.report.to_json());
            }
            1
        }
    }
}

/// Reads and validates the input, then seals it as a client would before upload.
fn seal_input(pipeline: &Pipeline, input: &Path) -> Result<Vec<u8>> {
    let payload = Document::from_bytes(read_file(input).map_err(|e| {
        Error::InvalidRequest(format!("cannot read {}: {}", input.display(), e))
    })?);
    validate_payload(payload.as_bytes())?;
    pipeline.cipher().seal(payload.as_bytes())
}

fn write_report(path: &Path, json: Result<String>) {
    match json.and_then(|json| write_file_atomic(path, json.as_bytes())) {
        Ok(()) => info!("📋 Report written to {}", path.display()),
        Err(e) => error!("❌ Failed to write report: {}", e),
    }
}
