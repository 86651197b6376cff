use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::catalog::{Catalog, DatabaseCatalog, MemoryCatalog};
use crate::configuration::config::Config;
use crate::controller::shutdown::ShutdownCoordinator;
use crate::error_handling::types::*;
use crate::playlist_import::{import_playlist_file, ImportSummary};
use crate::relay_management::{RelayManager, RelaySettings};
use crate::transcoder_management::TranscoderSupervisor;
use crate::web_interface::WebServer;

pub struct Controller {
    pub config: Config,
    catalog: Arc<dyn Catalog>,
    relay_manager: RelayManager,
    web_server: WebServer,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Controller {
    /// Wires every component together. Must be called within a tokio runtime.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Building controller");

        let catalog = open_catalog(&config).await?;
        let supervisor = Arc::new(TranscoderSupervisor::new(config.transcoder.clone()));
        let relay_manager = RelayManager::spawn(
            RelaySettings::from_config(&config),
            catalog.clone(),
            supervisor,
        );
        let web_server = WebServer::new(&config, catalog.clone(), relay_manager.clone())?;
        let shutdown = Arc::new(ShutdownCoordinator::new(
            relay_manager.clone(),
            config.shutdown.exit_delay(),
        ));

        Ok(Self {
            config,
            catalog,
            relay_manager,
            web_server,
            shutdown,
        })
    }

    pub fn catalog(&self) -> Arc<dyn Catalog> {
        self.catalog.clone()
    }

    pub fn relay_manager(&self) -> &RelayManager {
        &self.relay_manager
    }

    /// Serves until SIGINT or SIGTERM, then shuts down.
    pub async fn run(&self) -> Result<(), ControllerError> {
        info!("Running controller");

        let output_root = &self.config.relay.output_root;
        if let Err(e) = tokio::fs::create_dir_all(output_root).await {
            warn!("Cannot create output root {}: {}", output_root.display(), e);
        }

        tokio::select! {
            _ = self.web_server.start() => {
                error!("Web server stopped unexpectedly");
            }
            signal = wait_for_signal() => {
                let signal = signal.map_err(ControllerError::SignalError)?;

                // later signals only hit the coordinator's guard
                let coordinator = self.shutdown.clone();
                tokio::spawn(async move {
                    while let Ok(again) = wait_for_signal().await {
                        coordinator.initiate(again).await;
                    }
                });

                self.shutdown.initiate(signal).await;
            }
        }

        info!("Controller stopped");
        Ok(())
    }
}

/// Opens the configured catalog backend.
///
/// A database path wins; without one the catalog lives in memory and is
/// seeded from the configured playlist, if any.
pub async fn open_catalog(config: &Config) -> Result<Arc<dyn Catalog>, ControllerError> {
    if let Some(path) = &config.catalog.database_path {
        info!("Using catalog database {}", path.display());
        let catalog = DatabaseCatalog::new_file(path).await?;
        return Ok(Arc::new(catalog));
    }

    let catalog = Arc::new(MemoryCatalog::new());
    match &config.catalog.playlist_path {
        Some(playlist) => {
            let summary = import_playlist_file(playlist, catalog.as_ref()).await?;
            info!(
                "In-memory catalog seeded from {} ({} channels)",
                playlist.display(),
                summary.inserted
            );
        }
        None => warn!("No database or playlist configured, the catalog is empty"),
    }
    Ok(catalog)
}

/// Replaces the configured database's content with a playlist.
pub async fn run_import(config: &Config, playlist: &Path) -> Result<ImportSummary, ControllerError> {
    let Some(database) = &config.catalog.database_path else {
        return Err(ControllerError::ConfigurationError(ConfigError::MissingValue(
            "catalog.database_path is required to import".to_string(),
        )));
    };
    let catalog = DatabaseCatalog::new_file(database).await?;
    let summary = import_playlist_file(playlist, &catalog).await?;
    debug!("Import summary: {:?}", summary);
    Ok(summary)
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{ChannelFilter, SourceId};
    use tempfile::TempDir;

    const PLAYLIST: &str = "#EXTM3U\n\
        #EXTINF:-1 tvg-id=\"a.uk\" group-title=\"UK| News\",Alpha\n\
        http://example.com/a\n\
        #EXTINF:-1 group-title=\"FR| Sport\",Beta\n\
        http://example.com/b\n";

    #[tokio::test]
    async fn memory_catalog_is_seeded_from_playlist() {
        let dir = TempDir::new().unwrap();
        let playlist = dir.path().join("list.m3u");
        std::fs::write(&playlist, PLAYLIST).unwrap();
        let mut config = Config::default();
        config.catalog.playlist_path = Some(playlist);

        let catalog = open_catalog(&config).await.unwrap();

        let page = catalog.list_channels(&ChannelFilter::default()).await.unwrap();
        assert_eq!(page.pagination.total_items, 2);
        assert_eq!(
            catalog.lookup_source_address(SourceId(1)).await.unwrap().as_deref(),
            Some("http://example.com/a")
        );
    }

    #[tokio::test]
    async fn import_requires_a_database() {
        let dir = TempDir::new().unwrap();
        let playlist = dir.path().join("list.m3u");
        std::fs::write(&playlist, PLAYLIST).unwrap();

        let result = run_import(&Config::default(), &playlist).await;
        assert!(matches!(
            result,
            Err(ControllerError::ConfigurationError(ConfigError::MissingValue(_)))
        ));
    }

    #[tokio::test]
    async fn import_fills_the_database() {
        let dir = TempDir::new().unwrap();
        let playlist = dir.path().join("list.m3u");
        std::fs::write(&playlist, PLAYLIST).unwrap();
        let mut config = Config::default();
        config.catalog.database_path = Some(dir.path().join("catalog.db"));

        let summary = run_import(&config, &playlist).await.unwrap();
        assert_eq!((summary.parsed, summary.inserted), (2, 2));

        let catalog = open_catalog(&config).await.unwrap();
        assert_eq!(
            catalog.list_groups().await.unwrap(),
            vec!["News".to_string(), "Sport".to_string()]
        );
    }

    #[tokio::test]
    async fn controller_wires_components() {
        let mut config = Config::default();
        config.web.bind_address = "127.0.0.1".to_string();

        let controller = Controller::new(config).await.unwrap();
        assert_eq!(controller.relay_manager().current_active_source(), None);
        assert!(controller
            .catalog()
            .list_groups()
            .await
            .unwrap()
            .is_empty());
    }
}
