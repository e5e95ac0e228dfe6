//! Command-line interface
//!
//! Argument parsing and logging setup. Logging is configured from an
//! explicit [`LogConfig`] handed down by the caller; nothing here reads
//! global state besides the standard `RUST_LOG` override.

use crate::error::Result;
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cyclecast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bicycle-sharing demand prediction experiments")]
pub struct Cli {
    /// Experiments to run, comma separated (or `all`)
    #[arg(short, long, value_delimiter = ',', default_value = "all")]
    pub experiment: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Mirror logs to a file under the output directory
    #[arg(long)]
    pub log_file: bool,

    /// Directory with the per-station training CSVs and test.csv
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory with the pre-trained coefficient CSVs
    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    /// Directory results are written under
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,
}

impl Cli {
    /// Whether the named experiment was selected.
    pub fn selected(&self, name: &str) -> bool {
        self.experiment
            .iter()
            .any(|e| e == name || e == "all")
    }
}

/// Explicit logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub directive: String,
    /// Log file path; stderr when absent.
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Derive the configuration from parsed arguments.
    pub fn from_cli(cli: &Cli) -> Self {
        let level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        Self {
            directive: format!("cyclecast={level}"),
            file: cli
                .log_file
                .then(|| cli.output_dir.join("cyclecast.log")),
        }
    }
}

/// Install the global tracing subscriber.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.directive));

    match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}
