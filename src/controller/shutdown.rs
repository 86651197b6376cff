use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{error, info, warn};

use crate::relay_management::RelayManager;

/// Turns the first termination signal into an orderly stop.
pub struct ShutdownCoordinator {
    relay_manager: RelayManager,
    exit_delay: Duration,
    initiated: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(relay_manager: RelayManager, exit_delay: Duration) -> Self {
        Self {
            relay_manager,
            exit_delay,
            initiated: AtomicBool::new(false),
        }
    }

    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Tears the relay down, then waits `exit_delay` so the teardown can
    /// proceed before the process exits.
    ///
    /// Only the first call does anything; it returns `true`.
    pub async fn initiate(&self, signal: &str) -> bool {
        if self.initiated.swap(true, Ordering::SeqCst) {
            warn!("{} received while already shutting down, ignoring", signal);
            return false;
        }

        info!("{} received, shutting down", signal);
        if let Err(e) = self.relay_manager.shutdown().await {
            error!("Relay manager did not acknowledge shutdown: {}", e);
        }
        info!("Exiting in {:?}", self.exit_delay);
        tokio::time::sleep(self.exit_delay).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::configuration::types::TranscoderConfig;
    use crate::error_handling::types::RelayError;
    use crate::relay_management::{RelaySettings, RelayStatus};
    use crate::transcoder_management::TranscoderSupervisor;
    use std::sync::Arc;

    fn coordinator(root: &std::path::Path) -> ShutdownCoordinator {
        let relay = RelayManager::spawn(
            RelaySettings {
                output_root: root.to_path_buf(),
                hls_route: "hls".to_string(),
                readiness_attempts: 1,
                readiness_interval: Duration::from_millis(10),
                reclaim_delay: Duration::from_millis(10),
            },
            Arc::new(MemoryCatalog::new()),
            Arc::new(TranscoderSupervisor::new(TranscoderConfig::default())),
        );
        ShutdownCoordinator::new(relay, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn second_signal_is_a_no_op() {
        let root = tempfile::TempDir::new().unwrap();
        let coordinator = coordinator(root.path());

        assert!(coordinator.initiate("SIGTERM").await);
        assert!(coordinator.is_initiated());
        assert!(!coordinator.initiate("SIGINT").await);

        assert_eq!(coordinator.relay_manager.status(), RelayStatus::idle());
        assert_eq!(
            coordinator
                .relay_manager
                .request_playback(crate::catalog::types::SourceId(1))
                .await,
            Err(RelayError::ShuttingDown)
        );
    }

    #[tokio::test]
    async fn exit_waits_for_the_delay() {
        let root = tempfile::TempDir::new().unwrap();
        let coordinator = coordinator(root.path());

        let started = tokio::time::Instant::now();
        coordinator.initiate("SIGINT").await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
