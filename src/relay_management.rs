//! Relay management core module.
//!
//! At most one source is relayed at a time. The [`RelayManager`] handle
//! forwards requests to a single actor task that owns the session slot and
//! decides, for every playback request, whether to start the transcoder,
//! reuse the running one, or redirect the client to whatever is live.

use serde::Serialize;

use crate::catalog::types::SourceId;

/// Waits for the transcoder's manifest to appear.
pub mod readiness;
/// Delayed, cancellable deletion of output directories.
pub mod reclaimer;
/// The actor owning the session slot and its handle.
pub mod relay_manager;
/// The committed session and its teardown.
pub mod session;
#[cfg(test)]
pub mod tests;

pub use readiness::{await_manifest, ManifestReadiness};
pub use reclaimer::OutputReclaimer;
pub use relay_manager::{RelayManager, RelaySettings};
pub use session::Session;

/// Lifecycle of the session slot.
///
/// Variants:
/// - `Idle`: nothing is relayed.
/// - `Launching`: the slot is reserved while the source is looked up and
///   the transcoder spawned; no session is committed yet.
/// - `Starting`: the transcoder runs, its manifest is not there yet.
/// - `Running`: the manifest exists and clients are redirected to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Idle,
    Launching,
    Starting,
    Running,
}

/// Snapshot published after every committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub active_source_id: Option<SourceId>,
    pub state: RelayState,
}

impl RelayStatus {
    pub fn idle() -> Self {
        Self {
            active_source_id: None,
            state: RelayState::Idle,
        }
    }
}

/// Successful answer to a playback request; every variant is a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The requested source was started and its manifest is ready
    Started { manifest_url: String },
    /// The requested source was already live
    AlreadyActive { manifest_url: String },
    /// Another source is live; it is not pre-empted
    Conflict {
        requested: SourceId,
        active: SourceId,
        manifest_url: String,
    },
}

impl PlaybackOutcome {
    pub fn redirect_target(&self) -> &str {
        match self {
            PlaybackOutcome::Started { manifest_url }
            | PlaybackOutcome::AlreadyActive { manifest_url }
            | PlaybackOutcome::Conflict { manifest_url, .. } => manifest_url,
        }
    }
}
