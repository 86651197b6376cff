use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::catalog::types::SourceId;
use crate::relay_management::reclaimer::OutputReclaimer;
use crate::transcoder_management::types::{OutputLayout, ProcessExited, TranscoderHandle};

/// The one live relay: a committed transcoder process and its output.
#[derive(Debug)]
pub struct Session {
    pub instance: Uuid,
    pub source_id: SourceId,
    pub layout: OutputLayout,
    pub started_at: DateTime<Utc>,
    /// Present from commit until teardown
    pub process: Option<TranscoderHandle>,
    /// Readiness poll still in flight
    pub pending_timer: Option<JoinHandle<()>>,
    exited: ProcessExited,
    cleanup_scheduled: bool,
}

impl Session {
    pub fn new(process: TranscoderHandle, layout: OutputLayout) -> Self {
        Self {
            instance: process.instance,
            exited: process.exited(),
            source_id: layout.source_id,
            layout,
            started_at: Utc::now(),
            process: Some(process),
            pending_timer: None,
            cleanup_scheduled: false,
        }
    }

    /// Resolves when the process is gone, including after teardown.
    pub fn exited(&self) -> ProcessExited {
        self.exited.clone()
    }

    pub fn cleanup_scheduled(&self) -> bool {
        self.cleanup_scheduled
    }

    /// Cancels the readiness poll, stops the process and schedules the
    /// output directory for deletion.
    ///
    /// Safe to call more than once; only the first call schedules the
    /// deletion. Returns whether this call did.
    pub fn teardown(&mut self, reclaimer: &OutputReclaimer) -> bool {
        if let Some(timer) = self.pending_timer.take() {
            debug!("Cancelling readiness poll for source {}", self.source_id);
            timer.abort();
        }
        if let Some(mut process) = self.process.take() {
            process.stop();
        }
        if self.cleanup_scheduled {
            return false;
        }
        self.cleanup_scheduled = true;
        info!(
            "Session {} for source {} torn down after {}s",
            self.instance,
            self.source_id,
            (Utc::now() - self.started_at).num_seconds()
        );
        reclaimer.schedule(self.layout.output_dir.clone());
        true
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(timer) = self.pending_timer.take() {
            timer.abort();
        }
    }
}
