use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use filinglens::commands::{self, LocateArgs};
use filinglens::diagnostics;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filinglens", version, about = "Page segmentation and reference highlighting for financial filings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Log engine decisions to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Highlight a reference code in a document and print the result
    Locate {
        /// Markup file
        file: PathBuf,
        /// Reference code, e.g. #54b9a1c0
        code: String,
        /// Document kind tag (10-K, transcript, 8-K, intl, ...)
        #[arg(long)]
        kind: String,
        /// Zoom scale to render at
        #[arg(long)]
        zoom: Option<f64>,
        /// Print a JSON report instead of the highlighted markup
        #[arg(long)]
        json: bool,
    },
    /// Show which locator a reference code resolves to for a kind
    Resolve {
        /// Reference code
        code: String,
        /// Document kind tag
        #[arg(long)]
        kind: String,
    },
    /// Split a document into logical pages
    Segment {
        /// Markup file
        file: PathBuf,
        /// Print pages as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Locate {
            file,
            code,
            kind,
            zoom,
            json,
        } => commands::locate(&LocateArgs {
            code,
            file,
            json,
            kind,
            zoom,
        }),
        Commands::Resolve { code, kind } => commands::resolve(&code, &kind),
        Commands::Segment { file, json } => commands::segment(&file, json),
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            if e.is_soft() { ExitCode::from(1) } else { ExitCode::from(2) }
        },
    };
}

/// Logs go to stderr. `RUST_LOG` wins unless `--verbose` is given.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
