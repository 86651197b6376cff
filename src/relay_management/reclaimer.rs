use log::{debug, info, warn};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

struct PendingReclaim {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Pending {
    next_generation: u64,
    by_dir: HashMap<PathBuf, PendingReclaim>,
}

/// Deletes session output directories after a grace delay.
///
/// The delay lets clients finish fetching the last segments. Output
/// directories are reused by later sessions of the same source, so a
/// pending deletion can be cancelled before the directory is written again.
///
/// Deletions run one at a time under `removal`. A timer that passed its
/// generation check holds it until the directory is gone, so a later
/// `reclaim_now` of the same directory waits for it.
#[derive(Clone)]
pub struct OutputReclaimer {
    delay: Duration,
    pending: Arc<Mutex<Pending>>,
    removal: Arc<AsyncMutex<()>>,
}

impl OutputReclaimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(Pending::default())),
            removal: Arc::new(AsyncMutex::new(())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        // the map stays consistent even if a holder panicked
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Schedules deletion of `dir`. Returns `false` when one is already pending.
    pub fn schedule(&self, dir: PathBuf) -> bool {
        let mut pending = self.lock();
        if pending.by_dir.contains_key(&dir) {
            debug!("Reclaim of {} already scheduled", dir.display());
            return false;
        }

        pending.next_generation += 1;
        let generation = pending.next_generation;
        let shared = self.pending.clone();
        let removal = self.removal.clone();
        let delay = self.delay;
        let task_dir = dir.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _removing = removal.lock().await;
            {
                let mut pending = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                match pending.by_dir.get(&task_dir) {
                    Some(entry) if entry.generation == generation => {
                        pending.by_dir.remove(&task_dir);
                    }
                    _ => return,
                }
            }
            if let Err(e) = remove_dir(&task_dir).await {
                warn!("Failed to reclaim {}: {}", task_dir.display(), e);
            }
        });

        info!(
            "Scheduled reclaim of {} in {:?}",
            dir.display(),
            self.delay
        );
        pending
            .by_dir
            .insert(dir, PendingReclaim { generation, task });
        true
    }

    /// Cancels a pending deletion of `dir`. Returns `false` if none was pending.
    pub fn cancel(&self, dir: &Path) -> bool {
        match self.lock().by_dir.remove(dir) {
            Some(entry) => {
                entry.task.abort();
                info!("Cancelled pending reclaim of {}", dir.display());
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, dir: &Path) -> bool {
        self.lock().by_dir.contains_key(dir)
    }

    /// Removes `dir` and its content. A missing directory is not an error.
    ///
    /// Waits for a scheduled deletion already in progress. Returns whether
    /// this call removed something.
    pub async fn reclaim_now(&self, dir: &Path) -> io::Result<bool> {
        let _removing = self.removal.lock().await;
        remove_dir(dir).await
    }
}

async fn remove_dir(dir: &Path) -> io::Result<bool> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            info!("Reclaimed output directory {}", dir.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Output directory {} already gone", dir.display());
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
