use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    pub port: u16,
    /// First path segment under which the output root is served
    pub hls_route: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3001,
            hls_route: "hls".to_string(),
        }
    }
}

/// Where the catalog comes from.
///
/// With a `database_path` the SQLite catalog is used; otherwise an in-memory
/// catalog is seeded from `playlist_path` at startup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub database_path: Option<PathBuf>,
    pub playlist_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Parent of every per-source output directory
    pub output_root: PathBuf,
    pub readiness_attempts: u32,
    pub readiness_interval_ms: u64,
    pub reclaim_delay_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("stream_data"),
            readiness_attempts: 20,
            readiness_interval_ms: 1000,
            reclaim_delay_ms: 3000,
        }
    }
}

impl RelayConfig {
    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn reclaim_delay(&self) -> Duration {
        Duration::from_millis(self.reclaim_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub program: String,
    /// Arguments placed before the generated ffmpeg arguments, for wrappers
    /// such as `nice -n 10 ffmpeg`
    pub program_args: Vec<String>,
    pub segment_duration_secs: u32,
    pub playlist_size: u32,
    pub stop_grace_ms: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            program_args: Vec::new(),
            segment_duration_secs: 4,
            playlist_size: 5,
            stop_grace_ms: 2000,
        }
    }
}

impl TranscoderConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub exit_delay_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { exit_delay_ms: 1000 }
    }
}

impl ShutdownConfig {
    pub fn exit_delay(&self) -> Duration {
        Duration::from_millis(self.exit_delay_ms)
    }
}
