//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// chartdeck - charts and filterable dashboards from CSV datasets
///
/// Exports the passenger survival and rental listings charts as standalone
/// HTML documents, or serves the survival dashboards with live filters.
///
/// Examples:
///   chartdeck --titanic Titanic-Dataset.csv --listings AB_NYC_2019.csv
///   chartdeck --listings AB_NYC_2019.csv -o plots
///   chartdeck --titanic Titanic-Dataset.csv --serve --port 8080
///   chartdeck --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Passenger survival CSV (Titanic-Dataset.csv)
    #[arg(long, value_name = "FILE")]
    pub titanic: Option<PathBuf>,

    /// Rental listings CSV (AB_NYC_2019.csv)
    #[arg(long, value_name = "FILE")]
    pub listings: Option<PathBuf>,

    /// Directory for exported chart documents
    ///
    /// Defaults to "charts" or the value in .chartdeck.toml
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Serve the interactive dashboards instead of exporting
    #[arg(long)]
    pub serve: bool,

    /// Address to listen on in serve mode
    #[arg(long, value_name = "ADDR")]
    pub host: Option<String>,

    /// Port to listen on in serve mode
    #[arg(short, long, value_name = "PORT", env = "CHARTDECK_PORT")]
    pub port: Option<u16>,

    /// Don't open the dashboards in a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .chartdeck.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .chartdeck.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        for path in [&self.titanic, &self.listings].into_iter().flatten() {
            if !path.is_file() {
                return Err(format!("Dataset file does not exist: {}", path.display()));
            }
        }

        if let Some(ref dir) = self.output_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(format!(
                    "Output path is not a directory: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
