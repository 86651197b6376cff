//! Core types used by the transcoder management subsystem.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::catalog::types::SourceId;

const MANIFEST_FILE: &str = "playlist.m3u8";
const SEGMENT_PATTERN: &str = "segment%03d.ts";

/// Where a source's stream is written and published.
///
/// Everything is derived from the source id, so two requests for the same
/// source always agree on the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub source_id: SourceId,
    /// `<output_root>/<id>`
    pub output_dir: PathBuf,
    /// `<output_dir>/playlist.m3u8`
    pub manifest_path: PathBuf,
    /// `<output_dir>/segment%03d.ts`, expanded by the transcoder
    pub segment_pattern: PathBuf,
    /// Public URL of the manifest, `/<route>/<id>/playlist.m3u8`
    pub manifest_url: String,
}

impl OutputLayout {
    pub fn new(output_root: &Path, hls_route: &str, source_id: SourceId) -> Self {
        let output_dir = output_root.join(source_id.to_string());
        Self {
            source_id,
            manifest_path: output_dir.join(MANIFEST_FILE),
            segment_pattern: output_dir.join(SEGMENT_PATTERN),
            manifest_url: format!("/{}/{}/{}", hls_route, source_id, MANIFEST_FILE),
            output_dir,
        }
    }
}

/// Why a transcoder process is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscoderExit {
    /// Exited on its own with status 0
    Ended,
    /// Exited after a stop request
    Stopped,
    /// Non-zero exit or wait error not caused by a stop; carries the reason
    /// and the last stderr lines
    Failed(String),
}

/// Lifecycle event reported by the process monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderEvent {
    pub instance: Uuid,
    pub exit: TranscoderExit,
}

/// Aggregate counters describing current and historical transcoder state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscoderStats {
    /// Processes currently running.
    pub active_count: usize,
    /// Processes successfully spawned since the supervisor was created.
    pub total_started: u64,
    /// Spawn failures plus processes that ended with `Failed`.
    pub failed_count: u64,
}

/// Resolves once a transcoder process has been reaped.
///
/// Clones observe the same process. A monitor that went away without
/// reporting counts as exited.
#[derive(Debug, Clone)]
pub struct ProcessExited(watch::Receiver<bool>);

impl ProcessExited {
    pub(crate) fn new(exited: watch::Receiver<bool>) -> Self {
        Self(exited)
    }

    pub fn has_exited(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    pub async fn wait(mut self) {
        let _ = self.0.wait_for(|exited| *exited).await;
    }
}

/// Exclusive ownership of one running transcoder.
///
/// Stopping is fire and forget: the monitor task sends the signal and
/// reports the exit as a `TranscoderEvent`. Dropping the handle stops the
/// process as well.
#[derive(Debug)]
pub struct TranscoderHandle {
    pub instance: Uuid,
    pub source_id: SourceId,
    pub pid: Option<u32>,
    pub output_dir: PathBuf,
    pub command_line: String,
    pub started_at: DateTime<Utc>,
    pub(crate) stop_tx: Option<oneshot::Sender<()>>,
    pub(crate) exited: ProcessExited,
}

impl TranscoderHandle {
    /// Asks the monitor to terminate the process. Later calls are no-ops.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            debug!(
                "Stop requested for transcoder of source {} (pid {:?})",
                self.source_id, self.pid
            );
            // the monitor is gone when the process already exited
            let _ = stop_tx.send(());
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_tx.is_none()
    }

    /// Tracks the process past the lifetime of this handle.
    pub fn exited(&self) -> ProcessExited {
        self.exited.clone()
    }
}

impl Drop for TranscoderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
