//! actis: validate and run agent action scripts from the command line.
//!
//! ```bash
//! actis check plan.py
//! actis run --config actis.toml --intent "summarise notes" plan.py
//! cat plan.py | actis run --config actis.toml -
//! actis catalogue
//! ```
//!
//! Logs go to stderr and respect `RUST_LOG`; stdout carries only results.

mod config;

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use actis_kernel::tools::ToolSet;
use actis_kernel::{Diagnostic, IncrementalValidator, Pipeline, ScriptAssembler};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{ActisConfig, registry_from};

#[derive(Parser)]
#[command(name = "actis", version, about = "Validate agent action scripts as they stream in, then run them in a sandbox")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a script line by line and print its diagnostics
    Check {
        /// Script file, or `-` for stdin
        script: PathBuf,
        /// Config file supplying the capability table
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate and execute a script, printing the report as JSON
    Run {
        /// Config file with the execution limits
        #[arg(short, long)]
        config: PathBuf,
        /// What the script was written to achieve, kept with completed runs
        #[arg(long)]
        intent: Option<String>,
        /// Script file, or `-` for stdin
        script: PathBuf,
    },
    /// Print the capabilities a script may call
    Catalogue {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

const EXIT_REJECTED: u8 = 2;
const EXIT_NOT_COMPLETED: u8 = 3;

fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match Cli::parse().command {
        Command::Check { script, config } => check(&script, config.as_deref()),
        Command::Run {
            config,
            intent,
            script,
        } => run(&config, intent, &script),
        Command::Catalogue { config } => catalogue(config.as_deref()),
    }
}

fn read_script(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read script from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read script {}", path.display()))
}

fn print_diagnostics(diagnostics: &[Diagnostic], source: &str) {
    for diagnostic in diagnostics {
        eprint!("{}", diagnostic.render(source));
    }
}

fn check(path: &Path, config: Option<&Path>) -> Result<ExitCode> {
    let registry = match config {
        Some(path) => ActisConfig::load(path)?.registry()?,
        None => registry_from(None)?,
    };
    let source = read_script(path)?;
    let validator = IncrementalValidator::new(registry);

    let mut session = validator.begin();
    for line in source.split_inclusive('\n') {
        validator.feed(&mut session, line)?;
        if session.fatal().is_some() {
            break;
        }
    }
    if session.fatal().is_none() {
        validator.finalize(&mut session)?;
    }
    print_diagnostics(session.diagnostics(), &session.source());

    match ScriptAssembler::new().accept(session) {
        Ok(script) => {
            println!("accepted: {}", script.id());
            Ok(ExitCode::SUCCESS)
        }
        Err(reason) => {
            println!("rejected: {reason}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run(config_path: &Path, intent: Option<String>, path: &Path) -> Result<ExitCode> {
    let config = ActisConfig::load(config_path)?;
    let source = read_script(path)?;
    let pipeline = Pipeline::new(config.registry()?, Arc::new(ToolSet::builtin()));

    let report = pipeline
        .run_stream(source.split_inclusive('\n'), &config.limits)
        .context("Failed to start the sandbox")?;
    print_diagnostics(&report.diagnostics, &source);

    let classification = report.classify();
    tracing::info!(%classification, "attempt finished");
    if !classification.is_success() {
        eprint!("{}", report.feedback());
    }

    let output = match intent {
        Some(intent) => serde_json::json!({
            "report": &report,
            "consolidation": report.consolidation_record(intent),
        }),
        None => serde_json::to_value(&report)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(match report.result() {
        Some(result) if result.is_completed() => ExitCode::SUCCESS,
        Some(_) => ExitCode::from(EXIT_NOT_COMPLETED),
        None => ExitCode::from(EXIT_REJECTED),
    })
}

fn catalogue(config: Option<&Path>) -> Result<ExitCode> {
    let registry = match config {
        Some(path) => ActisConfig::load(path)?.registry()?,
        None => registry_from(None)?,
    };
    print!("{}", registry.render_catalogue());
    Ok(ExitCode::SUCCESS)
}
