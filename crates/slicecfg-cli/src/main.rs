use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use slicecfg_upgrade::{DocumentKind, UpgradeEngine};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

/// slicecfg: Upgrade tool for slicer configuration documents.
///
/// Inspect document versions, upgrade single files, and migrate whole
/// data directories from the command line.
#[derive(Parser)]
#[command(name = "slicecfg", version, about, long_about = None)]
struct Cli {
    /// Log rule decisions (same as SLICECFG_LOG=debug).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the declared format and setting version of a document.
    Version {
        /// Path to the document.
        file: PathBuf,

        /// Print a JSON report.
        #[arg(long)]
        json: bool,
    },

    /// Upgrade a single document to the current version.
    Upgrade {
        /// Path to the document.
        file: PathBuf,

        /// Kind of document (machine_stack, quality_changes, preferences, ...).
        #[arg(short, long)]
        kind: DocumentKind,

        /// Write into this directory instead of overwriting the input.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the upgraded document instead of writing it.
        #[arg(long)]
        dry_run: bool,

        /// Print a JSON report.
        #[arg(long)]
        json: bool,
    },

    /// Upgrade every outdated document under a data directory.
    Migrate {
        /// Data directory root.
        root: PathBuf,

        /// Configuration file. Defaults to <root>/slicecfg.toml when present.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Print a JSON report.
        #[arg(long)]
        json: bool,
    },

    /// List registered upgrade steps.
    Steps,
}

fn init_tracing(verbose: bool) {
    // SLICECFG_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("SLICECFG_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("SLICECFG_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let engine = UpgradeEngine::with_default_steps();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Version { file, json } => commands::version(&file, json),
        Commands::Upgrade {
            file,
            kind,
            output,
            dry_run,
            json,
        } => commands::upgrade(&engine, &file, kind, output.as_deref(), dry_run, json),
        Commands::Migrate {
            root,
            config,
            dry_run,
            json,
        } => commands::migrate(&engine, &root, config.as_deref(), dry_run, json),
        Commands::Steps => commands::steps(&engine),
    };

    if let Err(e) = result {
        tracing::debug!("command failed: {e}");
        eprintln!("error: {e}");
        process::exit(1);
    }
}
