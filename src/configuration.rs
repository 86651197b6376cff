pub mod config;
pub mod types;

pub use config::{Cli, CliCommand, Config};
pub use types::{CatalogConfig, RelayConfig, ShutdownConfig, TranscoderConfig, WebConfig};
