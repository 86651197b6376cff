use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use warp::{Filter, Rejection, Reply};

use crate::catalog::Catalog;
use crate::configuration::config::Config;
use crate::error_handling::types::WebError;
use crate::relay_management::RelayManager;
use crate::web_interface::routes::{
    channel_routes, hls_route, liveness_route, playlist_route, status_route,
};

/// Web server for the relay, catalog and HLS endpoints
pub struct WebServer {
    address: SocketAddr,
    hls_route: String,
    output_root: PathBuf,
    catalog: Arc<dyn Catalog>,
    relay_manager: RelayManager,
}

impl WebServer {
    pub fn new(
        config: &Config,
        catalog: Arc<dyn Catalog>,
        relay_manager: RelayManager,
    ) -> Result<Self, WebError> {
        let ip: IpAddr = config
            .web
            .bind_address
            .parse()
            .map_err(|e| WebError::BadAddress(format!("{}: {}", config.web.bind_address, e)))?;
        Ok(Self {
            address: SocketAddr::new(ip, config.web.port),
            hls_route: config.web.hls_route.clone(),
            output_root: config.relay.output_root.clone(),
            catalog,
            relay_manager,
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Every endpoint, with CORS open to any origin and request logging.
    pub fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        let cors = warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "OPTIONS"]);

        liveness_route()
            .or(status_route(self.relay_manager.clone()))
            .or(playlist_route(self.relay_manager.clone()))
            .or(channel_routes(self.catalog.clone()))
            .or(hls_route(self.hls_route.clone(), self.output_root.clone()))
            .with(cors)
            .with(warp::log("restream::web"))
    }

    /// Serves until the returned future is dropped.
    pub async fn start(&self) {
        info!(
            "Web server listening on http://{} (HLS under /{})",
            self.address, self.hls_route
        );
        warp::serve(self.routes()).run(self.address).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::relay_management::RelaySettings;
    use crate::transcoder_management::TranscoderSupervisor;

    fn relay(config: &Config) -> RelayManager {
        RelayManager::spawn(
            RelaySettings::from_config(config),
            Arc::new(MemoryCatalog::new()),
            Arc::new(TranscoderSupervisor::new(config.transcoder.clone())),
        )
    }

    #[tokio::test]
    async fn address_comes_from_web_section() {
        let mut config = Config::default();
        config.web.bind_address = "127.0.0.1".to_string();
        config.web.port = 8089;

        let server = WebServer::new(&config, Arc::new(MemoryCatalog::new()), relay(&config)).unwrap();
        assert_eq!(server.address(), "127.0.0.1:8089".parse().unwrap());
    }

    #[tokio::test]
    async fn malformed_bind_address_is_rejected() {
        let mut config = Config::default();
        config.web.bind_address = "not-an-ip".to_string();

        let result = WebServer::new(&config, Arc::new(MemoryCatalog::new()), relay(&config));
        assert!(matches!(result, Err(WebError::BadAddress(_))));
    }
}
