use std::fmt;

use crate::catalog::types::SourceId;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadAddress(String),
    NotInRange(String),
    MissingValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadAddress(e) => write!(f, "Address formatting error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::MissingValue(e) => write!(f, "Missing configuration value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum CatalogError {
    ConnectionFailed(String),
    ReadFailed(String),
    WriteFailed(String),
    InvalidFilter(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::ConnectionFailed(e) => write!(f, "Catalog connection failed: {}", e),
            CatalogError::ReadFailed(e) => write!(f, "Catalog read failed: {}", e),
            CatalogError::WriteFailed(e) => write!(f, "Catalog write failed: {}", e),
            CatalogError::InvalidFilter(e) => write!(f, "Invalid catalog filter: {}", e),
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Debug)]
pub enum ImportError {
    IoError(std::io::Error),
    EmptyPlaylist,
    CatalogError(CatalogError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::IoError(e) => write!(f, "Playlist IO error: {}", e),
            ImportError::EmptyPlaylist => write!(f, "Playlist contains no entries"),
            ImportError::CatalogError(e) => write!(f, "Playlist storage error: {}", e),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::IoError(err)
    }
}

impl From<CatalogError> for ImportError {
    fn from(err: CatalogError) -> Self {
        ImportError::CatalogError(err)
    }
}

#[derive(Debug)]
pub enum TranscoderError {
    ProgramNotFound(String),
    SpawnFailed(String),
}

impl fmt::Display for TranscoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscoderError::ProgramNotFound(e) => write!(f, "Transcoder program not found: {}", e),
            TranscoderError::SpawnFailed(e) => write!(f, "Transcoder spawn failed: {}", e),
        }
    }
}

impl std::error::Error for TranscoderError {}

/// Failures surfaced to a playback request.
///
/// The type is `Clone` because one failure may answer several queued
/// requests for the same source.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayError {
    InvalidRequest(String),
    NotFound(SourceId),
    Catalog(String),
    ProcessStartFailure(String),
    ProcessRuntimeError(String),
    ReadinessTimeout { source_id: SourceId, attempts: u32 },
    ShuttingDown,
    ManagerUnavailable,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            RelayError::NotFound(id) => write!(f, "Source {} not found", id),
            RelayError::Catalog(e) => write!(f, "Catalog lookup failed: {}", e),
            RelayError::ProcessStartFailure(e) => {
                write!(f, "Failed to start stream: {}", e)
            }
            RelayError::ProcessRuntimeError(e) => {
                write!(f, "Failed to start stream: transcoder runtime error: {}", e)
            }
            RelayError::ReadinessTimeout {
                source_id,
                attempts,
            } => write!(
                f,
                "Failed to start stream: playlist for source {} not created after {} checks",
                source_id, attempts
            ),
            RelayError::ShuttingDown => write!(f, "Server is shutting down"),
            RelayError::ManagerUnavailable => write!(f, "Relay manager is not running"),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<CatalogError> for RelayError {
    fn from(err: CatalogError) -> Self {
        RelayError::Catalog(err.to_string())
    }
}

impl From<TranscoderError> for RelayError {
    fn from(err: TranscoderError) -> Self {
        RelayError::ProcessStartFailure(err.to_string())
    }
}

#[derive(Debug)]
pub enum WebError {
    BadAddress(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BadAddress(e) => write!(f, "Invalid web bind address: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    CatalogError(CatalogError),
    ImportError(ImportError),
    WebError(WebError),
    SignalError(std::io::Error),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::CatalogError(e) => write!(f, "Catalog error: {}", e),
            ControllerError::ImportError(e) => write!(f, "Import error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
            ControllerError::SignalError(e) => write!(f, "Signal handling error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<CatalogError> for ControllerError {
    fn from(err: CatalogError) -> Self {
        ControllerError::CatalogError(err)
    }
}

impl From<ImportError> for ControllerError {
    fn from(err: ImportError) -> Self {
        ControllerError::ImportError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}
