use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Application configuration.
///
/// Read from a TOML file where every section and field is optional, then
/// patched with command-line flags and environment variables.
///
/// # Fields Overview
///
/// - `web`: HTTP listener and the route prefix of published streams
/// - `catalog`: database file or playlist the catalog is built from
/// - `relay`: output root, readiness polling and reclaim delay
/// - `transcoder`: program to run and HLS segmenting options
/// - `shutdown`: delay between teardown and process exit
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web: WebConfig,
    pub catalog: CatalogConfig,
    pub relay: RelayConfig,
    pub transcoder: TranscoderConfig,
    pub shutdown: ShutdownConfig,
}

/// Command-line interface.
#[derive(Parser, Debug, Clone)]
#[command(name = "restream")]
#[command(version)]
#[command(about = "Relays one catalog stream at a time through ffmpeg as HLS")]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "RESTREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address the HTTP server binds to
    #[arg(long)]
    pub bind_address: Option<String>,

    /// Port the HTTP server listens on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// SQLite catalog database
    #[arg(long)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Run the HTTP server (default)
    Serve,
    /// Replace the catalog with the entries of an M3U playlist
    Import {
        /// Playlist file to read
        playlist: PathBuf,
    },
}

impl Config {
    /// Loads the configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Builds the effective configuration for a command line: file first,
    /// then flag overrides, then validation.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("No configuration file given, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(address) = &cli.bind_address {
            self.web.bind_address = address.clone();
        }
        if let Some(port) = cli.port {
            self.web.port = port;
        }
        if let Some(database) = &cli.database {
            self.catalog.database_path = Some(database.clone());
        }
    }

    /// Rejects values the relay cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.web
            .bind_address
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::BadAddress(format!("{}: {}", self.web.bind_address, e)))?;

        let route = self.web.hls_route.as_str();
        if route.is_empty() {
            return Err(ConfigError::MissingValue("web.hls_route".to_string()));
        }
        if !route
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::NotInRange(format!(
                "web.hls_route must be a single path segment, got '{}'",
                route
            )));
        }

        if self.relay.output_root.as_os_str().is_empty() {
            return Err(ConfigError::MissingValue("relay.output_root".to_string()));
        }
        if self.relay.readiness_attempts == 0 {
            return Err(ConfigError::NotInRange(
                "relay.readiness_attempts must be at least 1".to_string(),
            ));
        }
        if self.relay.readiness_interval_ms == 0 {
            return Err(ConfigError::NotInRange(
                "relay.readiness_interval_ms must be at least 1".to_string(),
            ));
        }

        if self.transcoder.program.trim().is_empty() {
            return Err(ConfigError::MissingValue("transcoder.program".to_string()));
        }
        if self.transcoder.segment_duration_secs == 0 || self.transcoder.playlist_size == 0 {
            return Err(ConfigError::NotInRange(
                "transcoder.segment_duration_secs and transcoder.playlist_size must be at least 1"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
