use log::debug;
use std::path::Path;
use std::time::Duration;

/// Result of waiting for a manifest file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestReadiness {
    Ready,
    TimedOut,
    /// The existence check itself failed
    Failed(String),
}

/// Checks every `interval` whether `path` exists, at most `attempts` times.
///
/// The first check happens after one interval, matching the time the
/// transcoder needs to open its input.
pub async fn await_manifest(path: &Path, attempts: u32, interval: Duration) -> ManifestReadiness {
    for attempt in 1..=attempts {
        tokio::time::sleep(interval).await;
        match tokio::fs::try_exists(path).await {
            Ok(true) => {
                debug!(
                    "Manifest {} ready after {} checks",
                    path.display(),
                    attempt
                );
                return ManifestReadiness::Ready;
            }
            Ok(false) => debug!(
                "Manifest {} not there yet ({}/{})",
                path.display(),
                attempt,
                attempts
            ),
            Err(e) => return ManifestReadiness::Failed(e.to_string()),
        }
    }
    ManifestReadiness::TimedOut
}
