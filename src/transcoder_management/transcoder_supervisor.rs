use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::catalog::types::SourceId;
use crate::configuration::types::TranscoderConfig;
use crate::error_handling::types::TranscoderError;
use crate::transcoder_management::types::{
    OutputLayout, ProcessExited, TranscoderEvent, TranscoderExit, TranscoderHandle,
    TranscoderStats,
};

/// Number of stderr lines kept for failure reports.
const STDERR_TAIL_LINES: usize = 20;

/// How long a failed process's stderr reader may take to drain.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Starts and stops the external HLS transcoder.
///
/// Each started process gets a monitor task that owns the child, forwards
/// its stderr to the log and reports exactly one `TranscoderEvent` when the
/// process is gone.
///
/// Design notes:
/// - The generated arguments copy the input streams into an HLS playlist,
///   keeping only the last `playlist_size` segments on disk.
/// - `program_args` come before the generated arguments so the program can
///   be a wrapper such as `nice`.
/// - Stopping sends SIGTERM, then kills the process after `stop_grace`.
pub struct TranscoderSupervisor {
    config: TranscoderConfig,
    stats: Arc<Mutex<TranscoderStats>>,
}

impl TranscoderSupervisor {
    pub fn new(config: TranscoderConfig) -> Self {
        info!(
            "Initializing TranscoderSupervisor with program: {}",
            config.program
        );
        Self {
            config,
            stats: Arc::new(Mutex::new(TranscoderStats::default())),
        }
    }

    /// Full argument list passed to `program` for one source.
    pub fn build_arguments(&self, source_address: &str, layout: &OutputLayout) -> Vec<String> {
        let mut args = self.config.program_args.clone();
        args.extend([
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            source_address.to_string(),
        ]);
        // remux only, subtitles dropped
        args.extend(["-c".to_string(), "copy".to_string(), "-sn".to_string()]);
        args.extend([
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.config.segment_duration_secs.to_string(),
            "-hls_list_size".to_string(),
            self.config.playlist_size.to_string(),
            "-hls_flags".to_string(),
            "delete_segments".to_string(),
            "-hls_segment_filename".to_string(),
            layout.segment_pattern.to_string_lossy().into_owned(),
        ]);
        args.push(layout.manifest_path.to_string_lossy().into_owned());
        args
    }

    /// Spawns the transcoder for `layout.source_id`.
    ///
    /// A returned handle means the process was spawned. Its exit is reported
    /// later on `events`, tagged with `instance`. The output directory must
    /// already exist.
    pub fn start(
        &self,
        instance: Uuid,
        source_address: &str,
        layout: &OutputLayout,
        events: mpsc::UnboundedSender<TranscoderEvent>,
    ) -> Result<TranscoderHandle, TranscoderError> {
        let source_id = layout.source_id;
        let args = self.build_arguments(source_address, layout);
        let command_line = format!("{} {}", self.config.program, args.join(" "));
        info!("Starting transcoder for source {}", source_id);
        debug!("Transcoder command for source {}: {}", source_id, command_line);

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn transcoder for source {}: {}", source_id, e);
            update_stats(&self.stats, |stats| stats.failed_count += 1);
            if e.kind() == std::io::ErrorKind::NotFound {
                TranscoderError::ProgramNotFound(self.config.program.clone())
            } else {
                TranscoderError::SpawnFailed(e.to_string())
            }
        })?;

        let pid = child.id();
        update_stats(&self.stats, |stats| {
            stats.total_started += 1;
            stats.active_count += 1;
        });

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!("[transcoder:{}][stderr] {}", source_id, line);
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
                debug!("stderr monitoring ended for source: {}", source_id);
            })
        });

        let (stop_tx, stop_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        let monitor = ProcessMonitor {
            instance,
            source_id,
            stop_grace: self.config.stop_grace(),
            stderr_tail,
            stderr_task,
            stats: self.stats.clone(),
            events,
            exited: exited_tx,
        };
        tokio::spawn(monitor.run(child, stop_rx));

        info!(
            "Transcoder for source {} started with pid {:?}",
            source_id, pid
        );
        Ok(TranscoderHandle {
            instance,
            source_id,
            pid,
            output_dir: layout.output_dir.clone(),
            command_line,
            started_at: Utc::now(),
            stop_tx: Some(stop_tx),
            exited: ProcessExited::new(exited_rx),
        })
    }

    /// How long a stopped process may take before it is killed.
    pub fn stop_grace(&self) -> Duration {
        self.config.stop_grace()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> TranscoderStats {
        let stats = self
            .stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default();
        debug!(
            "Retrieved transcoder stats: active={}, total={}, failed={}",
            stats.active_count, stats.total_started, stats.failed_count
        );
        stats
    }
}

fn update_stats(stats: &Mutex<TranscoderStats>, f: impl FnOnce(&mut TranscoderStats)) {
    match stats.lock() {
        Ok(mut guard) => f(&mut guard),
        Err(_) => warn!("Transcoder stats lock poisoned, counters not updated"),
    }
}

struct ProcessMonitor {
    instance: Uuid,
    source_id: SourceId,
    stop_grace: Duration,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_task: Option<JoinHandle<()>>,
    stats: Arc<Mutex<TranscoderStats>>,
    events: mpsc::UnboundedSender<TranscoderEvent>,
    exited: watch::Sender<bool>,
}

impl ProcessMonitor {
    async fn run(mut self, mut child: Child, stop_rx: oneshot::Receiver<()>) {
        let exit = tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => {
                    info!("Transcoder for source {} ended on its own", self.source_id);
                    TranscoderExit::Ended
                }
                Ok(status) => {
                    let reason = self.failure_reason(format!("exited with {}", status)).await;
                    error!("Transcoder for source {} failed: {}", self.source_id, reason);
                    TranscoderExit::Failed(reason)
                }
                Err(e) => {
                    let reason = self.failure_reason(format!("wait failed: {}", e)).await;
                    error!("Transcoder for source {} failed: {}", self.source_id, reason);
                    TranscoderExit::Failed(reason)
                }
            },
            // a dropped handle stops the process too
            _ = stop_rx => {
                self.terminate(&mut child).await;
                info!("Transcoder for source {} stopped", self.source_id);
                TranscoderExit::Stopped
            }
        };
        self.exited.send_replace(true);

        update_stats(&self.stats, |stats| {
            stats.active_count = stats.active_count.saturating_sub(1);
            if matches!(exit, TranscoderExit::Failed(_)) {
                stats.failed_count += 1;
            }
        });

        if self
            .events
            .send(TranscoderEvent {
                instance: self.instance,
                exit,
            })
            .is_err()
        {
            debug!(
                "No listener for transcoder events of source {}",
                self.source_id
            );
        }
    }

    async fn terminate(&self, child: &mut Child) {
        if let Some(pid) = child.id() {
            debug!("Sending SIGTERM to transcoder pid {}", pid);
            send_terminate(child, pid);
        }

        match tokio::time::timeout(self.stop_grace, child.wait()).await {
            Ok(Ok(status)) => debug!(
                "Transcoder for source {} exited with {} after stop",
                self.source_id, status
            ),
            Ok(Err(e)) => warn!(
                "Failed to wait for transcoder of source {}: {}",
                self.source_id, e
            ),
            Err(_) => {
                warn!(
                    "Transcoder for source {} ignored SIGTERM for {:?}, killing it",
                    self.source_id, self.stop_grace
                );
                if let Err(e) = child.kill().await {
                    warn!(
                        "Failed to kill transcoder of source {}: {}",
                        self.source_id, e
                    );
                }
            }
        }
    }

    async fn failure_reason(&mut self, status: String) -> String {
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await;
        }
        let tail = self
            .stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        if tail.is_empty() {
            status
        } else {
            format!("{}: {}", status, tail)
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child, pid: u32) {
    // SAFETY: kill(2) has no memory-safety requirements; the pid belongs to
    // a child we have not reaped yet.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        warn!(
            "SIGTERM to pid {} failed ({}), killing instead",
            pid,
            std::io::Error::last_os_error()
        );
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child, _pid: u32) {
    let _ = child.start_kill();
}
