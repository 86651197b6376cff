//! End-to-end tests of the relay manager with a scripted transcoder.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use crate::catalog::types::{NewChannel, SourceId};
use crate::catalog::{Catalog, MemoryCatalog};
use crate::error_handling::types::RelayError;
use crate::relay_management::{
    PlaybackOutcome, RelayManager, RelaySettings, RelayState, RelayStatus,
};
use crate::transcoder_management::tests::{
    script_config, CRASH_SCRIPT, EARLY_END_SCRIPT, NEVER_READY_SCRIPT, READY_SCRIPT,
    SLOW_READY_SCRIPT,
};
use crate::transcoder_management::TranscoderSupervisor;

const RECLAIM_DELAY: Duration = Duration::from_millis(100);

/// Writes its manifest, stays up briefly, then dies.
const SHORT_LIVED_SCRIPT: &str = r#"for last; do :; done; mkdir -p "$(dirname "$last")"; printf '#EXTM3U\n' > "$last"; sleep 0.4; echo gone >&2; exit 3"#;
/// Crashes for source 1 only, behaves for every other source.
const FIRST_SOURCE_CRASHES_SCRIPT: &str = r#"case "$*" in *example.com/1\ *) sleep 0.2; echo boom >&2; exit 1;; esac; for last; do :; done; mkdir -p "$(dirname "$last")"; printf '#EXTM3U\n' > "$last"; exec sleep 30"#;

/// First run only: writes a manifest, and on SIGTERM writes a final ended
/// playlist before exiting. Later runs never produce a manifest.
const FLUSH_ON_STOP_SCRIPT: &str = r##"for last; do :; done; dir="$(dirname "$last")"; marker="$(dirname "$dir")/first-run"; if [ -e "$marker" ]; then exec sleep 30; fi; : > "$marker"; mkdir -p "$dir"; printf '#EXTM3U\n' > "$last"; trap 'sleep 0.1; printf "#EXTM3U\n#EXT-X-ENDLIST\n" > "$last"; exit 0' TERM; while :; do sleep 0.05; done"##;

struct Harness {
    manager: RelayManager,
    supervisor: Arc<TranscoderSupervisor>,
    output_root: PathBuf,
    _root: TempDir,
}

impl Harness {
    fn output_dir(&self, id: i32) -> PathBuf {
        self.output_root.join(id.to_string())
    }

    fn manifest(&self, id: i32) -> PathBuf {
        self.output_dir(id).join("playlist.m3u8")
    }

    fn started(&self) -> u64 {
        self.supervisor.stats().total_started
    }

    async fn wait_for_state(&self, state: RelayState) -> RelayStatus {
        let mut status = self.manager.subscribe();
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if status.borrow_and_update().state == state {
                    return;
                }
                if status.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        assert!(waited.is_ok(), "relay never reached {:?}", state);
        self.manager.status()
    }
}

async fn harness(script: &str, readiness_attempts: u32) -> Harness {
    let root = TempDir::new().unwrap();
    let catalog = Arc::new(MemoryCatalog::new());
    let channels: Vec<NewChannel> = (1..=3)
        .map(|i| NewChannel {
            name: format!("Channel {}", i),
            location_code: None,
            group_title: None,
            tvg_id: None,
            tvg_logo: None,
            url: format!("http://example.com/{}", i),
        })
        .collect();
    catalog.replace_channels(channels).await.unwrap();

    let supervisor = Arc::new(TranscoderSupervisor::new(script_config(script)));
    let output_root = root.path().join("stream_data");
    let settings = RelaySettings {
        output_root: output_root.clone(),
        hls_route: "hls".to_string(),
        readiness_attempts,
        readiness_interval: Duration::from_millis(20),
        reclaim_delay: RECLAIM_DELAY,
    };
    let manager = RelayManager::spawn(settings, catalog, supervisor.clone());

    Harness {
        manager,
        supervisor,
        output_root,
        _root: root,
    }
}

fn started_at(url: &str) -> PlaybackOutcome {
    PlaybackOutcome::Started {
        manifest_url: url.to_string(),
    }
}

#[tokio::test]
#[serial]
async fn first_request_starts_relay_and_redirects() {
    let h = harness(READY_SCRIPT, 50).await;
    assert_eq!(h.manager.status(), RelayStatus::idle());

    let outcome = h.manager.request_playback(SourceId(1)).await.unwrap();

    assert_eq!(outcome, started_at("/hls/1/playlist.m3u8"));
    assert_eq!(outcome.redirect_target(), "/hls/1/playlist.m3u8");
    assert_eq!(
        h.manager.status(),
        RelayStatus {
            active_source_id: Some(SourceId(1)),
            state: RelayState::Running,
        }
    );
    assert_eq!(h.manager.current_active_source(), Some(SourceId(1)));
    assert!(h.manifest(1).exists());
    assert_eq!(h.started(), 1);
}

#[tokio::test]
#[serial]
async fn concurrent_requests_for_one_source_spawn_once() {
    let h = harness(SLOW_READY_SCRIPT, 50).await;

    let (a, b, c) = tokio::join!(
        h.manager.request_playback(SourceId(1)),
        h.manager.request_playback(SourceId(1)),
        h.manager.request_playback(SourceId(1)),
    );

    for outcome in [a, b, c] {
        assert_eq!(outcome.unwrap(), started_at("/hls/1/playlist.m3u8"));
    }
    assert_eq!(h.started(), 1);
}

#[tokio::test]
#[serial]
async fn other_source_is_redirected_without_preemption() {
    let h = harness(READY_SCRIPT, 50).await;
    h.manager.request_playback(SourceId(1)).await.unwrap();

    let outcome = h.manager.request_playback(SourceId(2)).await.unwrap();

    assert_eq!(
        outcome,
        PlaybackOutcome::Conflict {
            requested: SourceId(2),
            active: SourceId(1),
            manifest_url: "/hls/1/playlist.m3u8".to_string(),
        }
    );
    assert_eq!(h.manager.current_active_source(), Some(SourceId(1)));
    assert_eq!(h.started(), 1);
    assert!(!h.output_dir(2).exists());
}

#[tokio::test]
#[serial]
async fn different_sources_during_start_get_one_winner() {
    let h = harness(SLOW_READY_SCRIPT, 50).await;

    let first = h.manager.request_playback(SourceId(1));
    let second = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        h.manager.request_playback(SourceId(2)).await
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), started_at("/hls/1/playlist.m3u8"));
    assert_eq!(
        second.unwrap(),
        PlaybackOutcome::Conflict {
            requested: SourceId(2),
            active: SourceId(1),
            manifest_url: "/hls/1/playlist.m3u8".to_string(),
        }
    );
    assert_eq!(h.started(), 1);
}

#[tokio::test]
#[serial]
async fn repeated_request_reuses_live_relay() {
    let h = harness(READY_SCRIPT, 50).await;
    h.manager.request_playback(SourceId(1)).await.unwrap();

    let outcome = h.manager.request_playback(SourceId(1)).await.unwrap();

    assert_eq!(
        outcome,
        PlaybackOutcome::AlreadyActive {
            manifest_url: "/hls/1/playlist.m3u8".to_string(),
        }
    );
    assert_eq!(h.started(), 1);
}

#[tokio::test]
#[serial]
async fn missing_manifest_restarts_the_relay() {
    let h = harness(READY_SCRIPT, 50).await;
    h.manager.request_playback(SourceId(1)).await.unwrap();
    std::fs::remove_file(h.manifest(1)).unwrap();

    let outcome = h.manager.request_playback(SourceId(1)).await.unwrap();

    assert_eq!(outcome, started_at("/hls/1/playlist.m3u8"));
    assert_eq!(h.started(), 2);
    assert!(!h.manager.reclaimer().is_pending(&h.output_dir(1)));

    // the teardown of the stale session must not remove the new output
    tokio::time::sleep(RECLAIM_DELAY * 3).await;
    assert!(h.manifest(1).exists());
}

#[tokio::test]
#[serial]
async fn restart_ignores_manifest_flushed_by_stopped_transcoder() {
    let h = harness(FLUSH_ON_STOP_SCRIPT, 10).await;
    h.manager.request_playback(SourceId(1)).await.unwrap();
    std::fs::remove_file(h.manifest(1)).unwrap();

    let second = h.manager.request_playback(SourceId(1)).await;

    assert_eq!(
        second,
        Err(RelayError::ReadinessTimeout {
            source_id: SourceId(1),
            attempts: 10,
        })
    );
    assert!(!h.manifest(1).exists());
    assert_eq!(h.started(), 2);
    assert_eq!(h.manager.status(), RelayStatus::idle());
}

#[tokio::test]
#[serial]
async fn shutdown_during_launch_answers_and_discards_the_process() {
    let h = harness(SLOW_READY_SCRIPT, 50).await;

    // both commands are queued before the launch task can finish
    let (pending, shutdown) = tokio::join!(
        h.manager.request_playback(SourceId(1)),
        h.manager.shutdown(),
    );

    assert_eq!(pending, Err(RelayError::ShuttingDown));
    shutdown.unwrap();
    assert_eq!(h.manager.status(), RelayStatus::idle());

    tokio::time::sleep(RECLAIM_DELAY * 4).await;
    assert_eq!(h.supervisor.stats().active_count, 0);
    assert!(!h.output_dir(1).exists());
}

#[tokio::test]
#[serial]
async fn shutdown_while_starting_answers_every_waiter() {
    let h = harness(SLOW_READY_SCRIPT, 50).await;

    let first = h.manager.request_playback(SourceId(1));
    let rest = async {
        h.wait_for_state(RelayState::Starting).await;
        let joined = h.manager.request_playback(SourceId(1));
        let other = h.manager.request_playback(SourceId(2));
        let stop = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.manager.shutdown().await
        };
        tokio::join!(joined, other, stop)
    };
    let (first, (joined, other, stop)) = tokio::join!(first, rest);

    stop.unwrap();
    assert_eq!(first, Err(RelayError::ShuttingDown));
    assert_eq!(joined, Err(RelayError::ShuttingDown));
    assert_eq!(other, Err(RelayError::ShuttingDown));
    assert_eq!(h.started(), 1);

    tokio::time::sleep(RECLAIM_DELAY * 4).await;
    assert_eq!(h.supervisor.stats().active_count, 0);
    assert!(!h.output_dir(1).exists());
    assert!(!h.output_dir(2).exists());
}

#[tokio::test]
#[serial]
async fn manifest_never_appearing_times_out() {
    let h = harness(NEVER_READY_SCRIPT, 5).await;

    let err = h.manager.request_playback(SourceId(1)).await.unwrap_err();

    assert_eq!(
        err,
        RelayError::ReadinessTimeout {
            source_id: SourceId(1),
            attempts: 5,
        }
    );
    assert_eq!(h.manager.status(), RelayStatus::idle());
    assert!(h.manager.reclaimer().is_pending(&h.output_dir(1)));

    tokio::time::sleep(RECLAIM_DELAY * 3).await;
    assert!(!h.output_dir(1).exists());
    assert_eq!(h.supervisor.stats().active_count, 0);
}

#[tokio::test]
#[serial]
async fn crash_before_ready_reports_stderr() {
    let h = harness(CRASH_SCRIPT, 50).await;

    let err = h.manager.request_playback(SourceId(1)).await.unwrap_err();

    match err {
        RelayError::ProcessRuntimeError(reason) => assert!(reason.contains("boom"), "{}", reason),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.manager.status(), RelayStatus::idle());
}

#[tokio::test]
#[serial]
async fn clean_exit_before_ready_is_a_failure() {
    let h = harness(EARLY_END_SCRIPT, 50).await;

    let err = h.manager.request_playback(SourceId(1)).await.unwrap_err();

    assert_eq!(
        err,
        RelayError::ProcessRuntimeError(
            "transcoder exited before the playlist was ready".to_string()
        )
    );
    assert_eq!(h.manager.status(), RelayStatus::idle());
}

#[tokio::test]
#[serial]
async fn unknown_source_is_not_found() {
    let h = harness(READY_SCRIPT, 50).await;

    let err = h.manager.request_playback(SourceId(42)).await.unwrap_err();

    assert_eq!(err, RelayError::NotFound(SourceId(42)));
    assert_eq!(h.manager.status(), RelayStatus::idle());
    assert_eq!(h.started(), 0);
    assert!(!h.output_dir(42).exists());
}

#[tokio::test]
#[serial]
async fn missing_program_is_a_start_failure() {
    let root = TempDir::new().unwrap();
    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .replace_channels(vec![NewChannel {
            name: "Channel".to_string(),
            location_code: None,
            group_title: None,
            tvg_id: None,
            tvg_logo: None,
            url: "http://example.com/1".to_string(),
        }])
        .await
        .unwrap();
    let mut config = script_config(READY_SCRIPT);
    config.program = root.path().join("no-such-ffmpeg").to_string_lossy().into_owned();
    let settings = RelaySettings {
        output_root: root.path().join("out"),
        hls_route: "hls".to_string(),
        readiness_attempts: 5,
        readiness_interval: Duration::from_millis(20),
        reclaim_delay: RECLAIM_DELAY,
    };
    let manager = RelayManager::spawn(
        settings,
        catalog,
        Arc::new(TranscoderSupervisor::new(config)),
    );

    let err = manager.request_playback(SourceId(1)).await.unwrap_err();

    assert!(matches!(err, RelayError::ProcessStartFailure(_)), "{:?}", err);
    assert_eq!(manager.status(), RelayStatus::idle());
    tokio::time::sleep(RECLAIM_DELAY * 3).await;
    assert!(!root.path().join("out").join("1").exists());
}

#[tokio::test]
#[serial]
async fn shutdown_stops_relay_and_refuses_requests() {
    let h = harness(READY_SCRIPT, 50).await;
    h.manager.request_playback(SourceId(1)).await.unwrap();

    h.manager.shutdown().await.unwrap();
    // a second shutdown is harmless
    h.manager.shutdown().await.unwrap();

    assert_eq!(h.manager.status(), RelayStatus::idle());
    assert_eq!(
        h.manager.request_playback(SourceId(1)).await,
        Err(RelayError::ShuttingDown)
    );
    tokio::time::sleep(RECLAIM_DELAY * 3).await;
    assert!(!h.output_dir(1).exists());
    assert_eq!(h.supervisor.stats().active_count, 0);
}

#[tokio::test]
#[serial]
async fn live_transcoder_exit_frees_the_slot() {
    let h = harness(SHORT_LIVED_SCRIPT, 50).await;
    h.manager.request_playback(SourceId(1)).await.unwrap();

    h.wait_for_state(RelayState::Idle).await;

    assert_eq!(h.manager.current_active_source(), None);
    let outcome = h.manager.request_playback(SourceId(2)).await.unwrap();
    assert_eq!(outcome, started_at("/hls/2/playlist.m3u8"));
}

#[tokio::test]
#[serial]
async fn queued_request_for_other_source_runs_after_failure() {
    let h = harness(FIRST_SOURCE_CRASHES_SCRIPT, 50).await;

    let first = h.manager.request_playback(SourceId(1));
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.manager.request_playback(SourceId(2)).await
    };
    let (first, second) = tokio::join!(first, second);

    assert!(
        matches!(first, Err(RelayError::ProcessRuntimeError(_))),
        "{:?}",
        first
    );
    assert_eq!(second.unwrap(), started_at("/hls/2/playlist.m3u8"));
    assert_eq!(h.manager.current_active_source(), Some(SourceId(2)));
    assert_eq!(h.started(), 2);
}

#[tokio::test]
async fn dropped_manager_stops_the_actor() {
    let h = harness(READY_SCRIPT, 50).await;
    let status = h.manager.subscribe();
    drop(h.manager);

    let mut status = status;
    let closed = tokio::time::timeout(Duration::from_secs(5), status.changed()).await;
    assert!(matches!(closed, Ok(Err(_))));
}
