use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::catalog::types::SourceId;
use crate::catalog::Catalog;
use crate::configuration::config::Config;
use crate::error_handling::types::RelayError;
use crate::relay_management::readiness::{await_manifest, ManifestReadiness};
use crate::relay_management::reclaimer::OutputReclaimer;
use crate::relay_management::session::Session;
use crate::relay_management::{PlaybackOutcome, RelayState, RelayStatus};
use crate::transcoder_management::{
    OutputLayout, ProcessExited, TranscoderEvent, TranscoderExit, TranscoderHandle,
    TranscoderSupervisor,
};

const COMMAND_BUFFER: usize = 64;

/// Slack on top of the stop grace period for a retired process to be reaped.
const RETIRED_EXIT_MARGIN: Duration = Duration::from_secs(1);

type Reply = oneshot::Sender<Result<PlaybackOutcome, RelayError>>;

/// Tunables of the relay core.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub output_root: PathBuf,
    pub hls_route: String,
    pub readiness_attempts: u32,
    pub readiness_interval: Duration,
    pub reclaim_delay: Duration,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_root: config.relay.output_root.clone(),
            hls_route: config.web.hls_route.clone(),
            readiness_attempts: config.relay.readiness_attempts,
            readiness_interval: config.relay.readiness_interval(),
            reclaim_delay: config.relay.reclaim_delay(),
        }
    }
}

enum Command {
    Play { source_id: SourceId, reply: Reply },
    Shutdown { done: oneshot::Sender<()> },
}

/// Results of work the actor handed to background tasks.
enum Internal {
    Launched {
        instance: Uuid,
        layout: OutputLayout,
        result: Result<TranscoderHandle, RelayError>,
    },
    Readiness {
        instance: Uuid,
        outcome: ManifestReadiness,
    },
    ManifestChecked {
        instance: Uuid,
        source_id: SourceId,
        exists: bool,
        reply: Reply,
    },
}

/// Requests answered when the pending start resolves.
#[derive(Default)]
struct Waiters {
    /// Same source as the one starting
    same: Vec<Reply>,
    /// Other sources, with the id they asked for
    others: Vec<(SourceId, Reply)>,
}

impl Waiters {
    fn push(&mut self, starting: SourceId, requested: SourceId, reply: Reply) {
        if starting == requested {
            debug!("Request for source {} joins the pending start", requested);
            self.same.push(reply);
        } else {
            debug!(
                "Request for source {} queued behind the start of source {}",
                requested, starting
            );
            self.others.push((requested, reply));
        }
    }
}

enum Slot {
    Idle,
    /// Reserved while the source is resolved and the process spawned
    Launching {
        instance: Uuid,
        layout: OutputLayout,
        waiters: Waiters,
        /// Exit reported before the launch result arrived
        early_exit: Option<TranscoderExit>,
    },
    Starting {
        session: Session,
        waiters: Waiters,
    },
    Running {
        session: Session,
    },
}

enum Admission {
    Launch,
    CheckManifest {
        instance: Uuid,
        manifest_path: PathBuf,
    },
    Redirect {
        active: SourceId,
        manifest_url: String,
    },
}

/// Handle to the relay actor.
///
/// Cheap to clone; every clone talks to the same actor. The actor stops
/// (tearing down any live session) once the last handle is dropped.
#[derive(Clone)]
pub struct RelayManager {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<RelayStatus>,
    reclaimer: OutputReclaimer,
}

impl RelayManager {
    /// Starts the actor task. Must be called within a tokio runtime.
    pub fn spawn(
        settings: RelaySettings,
        catalog: Arc<dyn Catalog>,
        supervisor: Arc<TranscoderSupervisor>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RelayStatus::idle());
        let reclaimer = OutputReclaimer::new(settings.reclaim_delay);

        let actor = RelayActor {
            settings,
            catalog,
            supervisor,
            reclaimer: reclaimer.clone(),
            slot: Slot::Idle,
            retiring: Vec::new(),
            shutting_down: false,
            status: status_tx,
            internal_tx,
            events_tx,
        };
        tokio::spawn(actor.run(commands_rx, internal_rx, events_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
            reclaimer,
        }
    }

    /// Asks for `source_id` to be played and waits for the redirect target.
    pub async fn request_playback(
        &self,
        source_id: SourceId,
    ) -> Result<PlaybackOutcome, RelayError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Play { source_id, reply })
            .await
            .map_err(|_| RelayError::ManagerUnavailable)?;
        response.await.map_err(|_| RelayError::ManagerUnavailable)?
    }

    /// Last committed status.
    pub fn status(&self) -> RelayStatus {
        self.status.borrow().clone()
    }

    pub fn current_active_source(&self) -> Option<SourceId> {
        self.status.borrow().active_source_id
    }

    pub fn subscribe(&self) -> watch::Receiver<RelayStatus> {
        self.status.clone()
    }

    pub fn reclaimer(&self) -> &OutputReclaimer {
        &self.reclaimer
    }

    /// Tears down the live session and refuses new requests from then on.
    /// Returns once the teardown has been issued.
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        let (done, finished) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { done })
            .await
            .map_err(|_| RelayError::ManagerUnavailable)?;
        finished.await.map_err(|_| RelayError::ManagerUnavailable)
    }
}

/// Owns the session slot. Every transition happens in one message step,
/// and nothing here awaits I/O: lookups, spawning, polling and manifest
/// checks run in tasks that report back through `internal_tx`.
struct RelayActor {
    settings: RelaySettings,
    catalog: Arc<dyn Catalog>,
    supervisor: Arc<TranscoderSupervisor>,
    reclaimer: OutputReclaimer,
    slot: Slot,
    /// Stopped processes that may still write into their output directory
    retiring: Vec<(PathBuf, ProcessExited)>,
    shutting_down: bool,
    status: watch::Sender<RelayStatus>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    events_tx: mpsc::UnboundedSender<TranscoderEvent>,
}

impl RelayActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut events: mpsc::UnboundedReceiver<TranscoderEvent>,
    ) {
        info!(
            "Relay manager started (output root: {})",
            self.settings.output_root.display()
        );
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Play { source_id, reply }) => self.admit(source_id, reply),
                    Some(Command::Shutdown { done }) => {
                        self.shutdown();
                        let _ = done.send(());
                    }
                    None => break,
                },
                Some(message) = internal.recv() => self.handle_internal(message),
                Some(event) = events.recv() => self.on_transcoder_exit(event.instance, event.exit),
            }
        }

        self.shutting_down = true;
        self.release_slot(RelayError::ManagerUnavailable);
        info!("Relay manager stopped");
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Launched {
                instance,
                layout,
                result,
            } => self.on_launched(instance, layout, result),
            Internal::Readiness { instance, outcome } => self.on_readiness(instance, outcome),
            Internal::ManifestChecked {
                instance,
                source_id,
                exists,
                reply,
            } => self.on_manifest_checked(instance, source_id, exists, reply),
        }
    }

    fn admit(&mut self, source_id: SourceId, reply: Reply) {
        if self.shutting_down {
            let _ = reply.send(Err(RelayError::ShuttingDown));
            return;
        }

        let admission = match &mut self.slot {
            Slot::Idle => Admission::Launch,
            Slot::Launching {
                layout, waiters, ..
            } => {
                waiters.push(layout.source_id, source_id, reply);
                return;
            }
            Slot::Starting { session, waiters } => {
                waiters.push(session.source_id, source_id, reply);
                return;
            }
            Slot::Running { session } if session.source_id == source_id => {
                Admission::CheckManifest {
                    instance: session.instance,
                    manifest_path: session.layout.manifest_path.clone(),
                }
            }
            Slot::Running { session } => Admission::Redirect {
                active: session.source_id,
                manifest_url: session.layout.manifest_url.clone(),
            },
        };

        match admission {
            Admission::Launch => self.begin_launch(source_id, reply),
            Admission::CheckManifest {
                instance,
                manifest_path,
            } => self.check_manifest(instance, source_id, manifest_path, reply),
            Admission::Redirect {
                active,
                manifest_url,
            } => {
                info!(
                    "Source {} requested while {} is live, redirecting",
                    source_id, active
                );
                let _ = reply.send(Ok(PlaybackOutcome::Conflict {
                    requested: source_id,
                    active,
                    manifest_url,
                }));
            }
        }
    }

    fn begin_launch(&mut self, source_id: SourceId, reply: Reply) {
        let instance = Uuid::new_v4();
        let layout = OutputLayout::new(
            &self.settings.output_root,
            &self.settings.hls_route,
            source_id,
        );
        info!("Launching relay of source {} (instance {})", source_id, instance);

        let previous = self.take_retiring(&layout.output_dir);
        let exit_wait = self.supervisor.stop_grace() + RETIRED_EXIT_MARGIN;

        let mut waiters = Waiters::default();
        waiters.same.push(reply);
        self.slot = Slot::Launching {
            instance,
            layout: layout.clone(),
            waiters,
            early_exit: None,
        };
        self.publish();

        let catalog = self.catalog.clone();
        let supervisor = self.supervisor.clone();
        let reclaimer = self.reclaimer.clone();
        let events = self.events_tx.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = launch(
                catalog.as_ref(),
                &supervisor,
                &reclaimer,
                instance,
                &layout,
                previous,
                exit_wait,
                events,
            )
            .await;
            let _ = internal.send(Internal::Launched {
                instance,
                layout,
                result,
            });
        });
    }

    fn on_launched(
        &mut self,
        instance: Uuid,
        layout: OutputLayout,
        result: Result<TranscoderHandle, RelayError>,
    ) {
        let (waiters, early_exit) = match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Launching {
                instance: current,
                waiters,
                early_exit,
                ..
            } if current == instance => (waiters, early_exit),
            other => {
                self.slot = other;
                if let Ok(mut handle) = result {
                    warn!(
                        "Discarding transcoder of retired instance {} (source {})",
                        instance, layout.source_id
                    );
                    handle.stop();
                    self.track_exit(layout.output_dir.clone(), handle.exited());
                    if !self.slot_uses_dir(&layout.output_dir) {
                        self.reclaimer.schedule(layout.output_dir);
                    }
                }
                return;
            }
        };

        match result {
            Ok(handle) => {
                let mut session = Session::new(handle, layout);
                session.pending_timer = Some(self.spawn_readiness(&session));
                info!(
                    "Relay of source {} committed, waiting for its manifest",
                    session.source_id
                );
                self.slot = Slot::Starting { session, waiters };
                self.publish();

                if let Some(exit) = early_exit {
                    self.on_transcoder_exit(instance, exit);
                }
            }
            Err(err) => {
                warn!("Launch of source {} failed: {}", layout.source_id, err);
                if matches!(err, RelayError::ProcessStartFailure(_)) {
                    self.reclaimer.schedule(layout.output_dir);
                }
                self.publish();
                self.fail_waiters(waiters, err);
            }
        }
    }

    fn spawn_readiness(&self, session: &Session) -> JoinHandle<()> {
        let instance = session.instance;
        let manifest_path = session.layout.manifest_path.clone();
        let attempts = self.settings.readiness_attempts;
        let interval = self.settings.readiness_interval;
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = await_manifest(&manifest_path, attempts, interval).await;
            let _ = internal.send(Internal::Readiness { instance, outcome });
        })
    }

    fn on_readiness(&mut self, instance: Uuid, outcome: ManifestReadiness) {
        let source_id = match &self.slot {
            Slot::Starting { session, .. } if session.instance == instance => session.source_id,
            _ => {
                debug!("Ignoring readiness result of retired instance {}", instance);
                return;
            }
        };

        match outcome {
            ManifestReadiness::Ready => self.commit_running(),
            ManifestReadiness::TimedOut => self.fail_starting(RelayError::ReadinessTimeout {
                source_id,
                attempts: self.settings.readiness_attempts,
            }),
            ManifestReadiness::Failed(reason) => self.fail_starting(
                RelayError::ProcessRuntimeError(format!("manifest check failed: {}", reason)),
            ),
        }
    }

    fn commit_running(&mut self) {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Starting {
                mut session,
                waiters,
            } => {
                session.pending_timer = None;
                let active = session.source_id;
                let manifest_url = session.layout.manifest_url.clone();
                info!("Source {} is live at {}", active, manifest_url);
                self.slot = Slot::Running { session };
                self.publish();

                for reply in waiters.same {
                    let _ = reply.send(Ok(PlaybackOutcome::Started {
                        manifest_url: manifest_url.clone(),
                    }));
                }
                for (requested, reply) in waiters.others {
                    let _ = reply.send(Ok(PlaybackOutcome::Conflict {
                        requested,
                        active,
                        manifest_url: manifest_url.clone(),
                    }));
                }
            }
            other => self.slot = other,
        }
    }

    fn fail_starting(&mut self, err: RelayError) {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Starting { session, waiters } => {
                error!("Relay of source {} failed: {}", session.source_id, err);
                self.retire(session);
                self.publish();
                self.fail_waiters(waiters, err);
            }
            other => self.slot = other,
        }
    }

    /// Answers the requests of a failed start. Requests for other sources
    /// did not cause the failure; they are admitted again on the idle slot.
    fn fail_waiters(&mut self, waiters: Waiters, err: RelayError) {
        for reply in waiters.same {
            let _ = reply.send(Err(err.clone()));
        }
        for (requested, reply) in waiters.others {
            self.admit(requested, reply);
        }
    }

    fn on_transcoder_exit(&mut self, instance: Uuid, exit: TranscoderExit) {
        if self.slot_instance() != Some(instance) {
            debug!(
                "Ignoring exit of retired transcoder instance {}: {:?}",
                instance, exit
            );
            return;
        }

        match &mut self.slot {
            Slot::Launching { early_exit, .. } => {
                debug!("Transcoder exited before its launch was recorded");
                *early_exit = Some(exit);
            }
            Slot::Starting { .. } => {
                let err = match exit {
                    TranscoderExit::Failed(reason) => RelayError::ProcessRuntimeError(reason),
                    TranscoderExit::Ended => RelayError::ProcessRuntimeError(
                        "transcoder exited before the playlist was ready".to_string(),
                    ),
                    TranscoderExit::Stopped => RelayError::ProcessRuntimeError(
                        "transcoder stopped before the playlist was ready".to_string(),
                    ),
                };
                self.fail_starting(err);
            }
            Slot::Running { session } => {
                match &exit {
                    TranscoderExit::Failed(reason) => error!(
                        "Transcoder of live source {} failed: {}",
                        session.source_id, reason
                    ),
                    TranscoderExit::Ended => {
                        info!("Source {} ended", session.source_id)
                    }
                    TranscoderExit::Stopped => warn!(
                        "Transcoder of live source {} stopped externally",
                        session.source_id
                    ),
                }
                self.release_slot(RelayError::ShuttingDown);
            }
            Slot::Idle => {}
        }
    }

    fn check_manifest(
        &self,
        instance: Uuid,
        source_id: SourceId,
        manifest_path: PathBuf,
        reply: Reply,
    ) {
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let exists = match tokio::fs::try_exists(&manifest_path).await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!("Cannot check {}: {}", manifest_path.display(), e);
                    false
                }
            };
            let _ = internal.send(Internal::ManifestChecked {
                instance,
                source_id,
                exists,
                reply,
            });
        });
    }

    fn on_manifest_checked(
        &mut self,
        instance: Uuid,
        source_id: SourceId,
        exists: bool,
        reply: Reply,
    ) {
        let manifest_url = match &self.slot {
            Slot::Running { session } if session.instance == instance => {
                session.layout.manifest_url.clone()
            }
            _ => {
                debug!("Slot changed during manifest check, admitting source {} again", source_id);
                self.admit(source_id, reply);
                return;
            }
        };

        if exists {
            debug!("Source {} already live, redirecting", source_id);
            let _ = reply.send(Ok(PlaybackOutcome::AlreadyActive { manifest_url }));
        } else {
            warn!(
                "Manifest of live source {} is missing, restarting the relay",
                source_id
            );
            self.release_slot(RelayError::ShuttingDown);
            self.admit(source_id, reply);
        }
    }

    fn shutdown(&mut self) {
        if self.shutting_down {
            debug!("Relay manager already shut down");
            return;
        }
        info!("Relay manager shutting down");
        self.shutting_down = true;
        self.release_slot(RelayError::ShuttingDown);
    }

    /// Empties the slot, answering pending requests with `err`.
    fn release_slot(&mut self, err: RelayError) {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Idle => return,
            Slot::Launching {
                layout, waiters, ..
            } => {
                info!("Abandoning launch of source {}", layout.source_id);
                self.fail_waiters(waiters, err);
            }
            Slot::Starting { session, waiters } => {
                self.retire(session);
                self.fail_waiters(waiters, err);
            }
            Slot::Running { session } => self.retire(session),
        }
        self.publish();
    }

    fn retire(&mut self, mut session: Session) {
        session.teardown(&self.reclaimer);
        self.track_exit(session.layout.output_dir.clone(), session.exited());
    }

    fn track_exit(&mut self, output_dir: PathBuf, exited: ProcessExited) {
        self.retiring.retain(|(_, exited)| !exited.has_exited());
        if !exited.has_exited() {
            self.retiring.push((output_dir, exited));
        }
    }

    /// Removes and returns the processes still alive in `output_dir`.
    fn take_retiring(&mut self, output_dir: &Path) -> Vec<ProcessExited> {
        let mut previous = Vec::new();
        self.retiring.retain(|(dir, exited)| {
            if exited.has_exited() {
                false
            } else if dir == output_dir {
                previous.push(exited.clone());
                false
            } else {
                true
            }
        });
        previous
    }

    fn slot_instance(&self) -> Option<Uuid> {
        match &self.slot {
            Slot::Idle => None,
            Slot::Launching { instance, .. } => Some(*instance),
            Slot::Starting { session, .. } | Slot::Running { session } => Some(session.instance),
        }
    }

    fn slot_uses_dir(&self, dir: &Path) -> bool {
        match &self.slot {
            Slot::Idle => false,
            Slot::Launching { layout, .. } => layout.output_dir == dir,
            Slot::Starting { session, .. } | Slot::Running { session } => {
                session.layout.output_dir == dir
            }
        }
    }

    fn publish(&self) {
        let status = match &self.slot {
            Slot::Idle => RelayStatus::idle(),
            Slot::Launching { .. } => RelayStatus {
                active_source_id: None,
                state: RelayState::Launching,
            },
            Slot::Starting { session, .. } => RelayStatus {
                active_source_id: Some(session.source_id),
                state: RelayState::Starting,
            },
            Slot::Running { session } => RelayStatus {
                active_source_id: Some(session.source_id),
                state: RelayState::Running,
            },
        };
        debug!("Relay status: {:?}", status);
        self.status.send_replace(status);
    }
}

/// Resolves the source, prepares its output directory and spawns the
/// transcoder. Runs outside the actor.
///
/// `previous` are stopped processes of the same directory. Their last
/// writes must land before the directory is emptied, otherwise the new
/// session could be declared ready on a stale manifest.
#[allow(clippy::too_many_arguments)]
async fn launch(
    catalog: &dyn Catalog,
    supervisor: &TranscoderSupervisor,
    reclaimer: &OutputReclaimer,
    instance: Uuid,
    layout: &OutputLayout,
    previous: Vec<ProcessExited>,
    exit_wait: Duration,
    events: mpsc::UnboundedSender<TranscoderEvent>,
) -> Result<TranscoderHandle, RelayError> {
    let source_id = layout.source_id;
    let address = catalog
        .lookup_source_address(source_id)
        .await?
        .ok_or(RelayError::NotFound(source_id))?;
    debug!("Source {} resolves to {}", source_id, address);

    for exited in previous {
        debug!("Waiting for the previous transcoder of source {} to exit", source_id);
        if tokio::time::timeout(exit_wait, exited.wait()).await.is_err() {
            return Err(RelayError::ProcessStartFailure(format!(
                "previous transcoder of source {} still running after {:?}",
                source_id, exit_wait
            )));
        }
    }

    // a previous session of this source may still be waiting for reclaim
    reclaimer.cancel(&layout.output_dir);
    reclaimer
        .reclaim_now(&layout.output_dir)
        .await
        .map_err(|e| prepare_failed(&layout.output_dir, e))?;
    tokio::fs::create_dir_all(&layout.output_dir)
        .await
        .map_err(|e| prepare_failed(&layout.output_dir, e))?;

    Ok(supervisor.start(instance, &address, layout, events)?)
}

fn prepare_failed(dir: &Path, e: std::io::Error) -> RelayError {
    RelayError::ProcessStartFailure(format!(
        "cannot prepare output directory {}: {}",
        dir.display(),
        e
    ))
}
