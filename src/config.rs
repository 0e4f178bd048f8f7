//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.chartdeck.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".chartdeck.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Dataset locations.
    #[serde(default)]
    pub data: DataConfig,

    /// Interactive server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Static export settings.
    #[serde(default)]
    pub export: ExportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory receiving exported documents.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("charts")
}

/// Dataset paths. Either may be left unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// Passenger survival CSV.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titanic: Option<PathBuf>,

    /// Rental listings CSV.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listings: Option<PathBuf>,
}

/// Interactive server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Open the dashboards in a browser on start.
    #[serde(default = "default_true")]
    pub open_browser: bool,

    /// Seconds a browser session may stay unused before it is dropped.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open_browser: true,
            session_ttl_secs: default_session_ttl(),
        }
    }
}

fn default_session_ttl() -> u64 {
    1800
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5006
}

fn default_true() -> bool {
    true
}

/// Static export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Show a progress bar while writing documents.
    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Chart names to export; empty exports everything.
    #[serde(default)]
    pub include: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            show_progress: true,
            include: Vec::new(),
        }
    }
}

impl ExportConfig {
    /// Whether a chart passes the `include` filter.
    pub fn includes(&self, name: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|n| n == name)
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings. Only values
    /// given on the command line override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref path) = args.titanic {
            self.data.titanic = Some(path.clone());
        }
        if let Some(ref path) = args.listings {
            self.data.listings = Some(path.clone());
        }
        if let Some(ref dir) = args.output_dir {
            self.general.output_dir = dir.clone();
        }

        if let Some(ref host) = args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }

        // Flags always override
        if args.no_browser {
            self.server.open_browser = false;
        }
        if args.quiet {
            self.export.show_progress = false;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Log level after merging: `--quiet` wins, then `verbose` from either
    /// the file or the command line.
    pub fn log_level(&self, args: &crate::cli::Args) -> Level {
        if args.quiet {
            args.log_level()
        } else if self.general.verbose || args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output_dir, PathBuf::from("charts"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5006);
        assert!(config.server.open_browser);
        assert!(config.data.titanic.is_none());
        assert_eq!(config.server.session_ttl_secs, 1800);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output_dir = "plots"
verbose = true

[data]
listings = "AirBnB_NY/AB_NYC_2019.csv"

[server]
port = 8080

[export]
include = ["class_gender"]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output_dir, PathBuf::from("plots"));
        assert!(config.general.verbose);
        assert_eq!(
            config.data.listings,
            Some(PathBuf::from("AirBnB_NY/AB_NYC_2019.csv"))
        );
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.export.includes("class_gender"));
        assert!(!config.export.includes("fare_vs_survival"));
    }

    #[test]
    fn test_merge_with_args() {
        let mut config: Config = toml::from_str("[server]\nport = 8080\nhost = \"0.0.0.0\"").unwrap();
        let args = Args::parse_from([
            "chartdeck",
            "--titanic",
            "t.csv",
            "--port",
            "9000",
            "--no-browser",
            "--quiet",
        ]);
        config.merge_with_args(&args);

        assert_eq!(config.data.titanic, Some(PathBuf::from("t.csv")));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.server.open_browser);
        assert!(!config.export.show_progress);
    }

    #[test]
    fn test_verbose_from_file_sets_log_level() {
        let verbose: Config = toml::from_str("[general]\nverbose = true").unwrap();
        let plain = Args::parse_from(["chartdeck"]);
        assert_eq!(verbose.log_level(&plain), Level::DEBUG);
        assert_eq!(Config::default().log_level(&plain), Level::INFO);

        let quiet = Args::parse_from(["chartdeck", "--quiet"]);
        assert_eq!(verbose.log_level(&quiet), Level::ERROR);

        let loud = Args::parse_from(["chartdeck", "--verbose"]);
        assert_eq!(Config::default().log_level(&loud), Level::DEBUG);
    }

    #[test]
    fn test_session_ttl_from_file() {
        let config: Config = toml::from_str("[server]\nsession_ttl_secs = 60").unwrap();
        assert_eq!(config.server.session_ttl_secs, 60);
        assert!(config.server.open_browser);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[export]"));
    }

    #[test]
    fn test_empty_include_exports_everything() {
        assert!(ExportConfig::default().includes("anything"));
    }
}
