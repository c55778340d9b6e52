use crate::error::{AnalysisError, Result};
use crate::runner::{AnalysisRunner, RunReport, RunRequest, RunTarget};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};

const QUEUE_CAPACITY: usize = 16;
const LOCK_DIR: &str = ".locks";

/// Returned as soon as a run is queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAck {
    pub run_id: u64,
    pub target: RunTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Milliseconds since the Unix epoch
    pub accepted_at: u64,
}

/// Published by the worker when a queued run ends
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub run_id: u64,
    pub target: RunTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Admits at most one in-flight run per target.
///
/// Holds an in-process set of busy targets and, when a lock directory is
/// configured, an exclusive lock file per target so separate processes
/// sharing an output directory also exclude each other.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    busy: Arc<Mutex<HashSet<String>>>,
    lock_dir: Option<PathBuf>,
}

impl RunLock {
    pub fn in_process() -> Self {
        Self::default()
    }

    /// Lock files live under `<output_dir>/.locks`
    pub fn with_output_dir(output_dir: &Path) -> Self {
        Self {
            busy: Arc::default(),
            lock_dir: Some(output_dir.join(LOCK_DIR)),
        }
    }

    pub fn is_busy(&self, target: &RunTarget) -> bool {
        self.busy
            .lock()
            .map(|busy| busy.contains(&target.lock_key()))
            .unwrap_or(true)
    }

    /// Fails with [`AnalysisError::RunInProgress`] when `target` is taken.
    pub async fn acquire(&self, target: &RunTarget) -> Result<RunGuard> {
        let key = target.lock_key();
        {
            let mut busy = self
                .busy
                .lock()
                .map_err(|_| AnalysisError::Other("run lock poisoned".to_string()))?;
            if !busy.insert(key.clone()) {
                return Err(AnalysisError::RunInProgress(target.to_string()));
            }
        }

        let mut guard = RunGuard {
            key,
            busy: Arc::clone(&self.busy),
            file: None,
        };
        if let Some(dir) = &self.lock_dir {
            guard.file = Some(lock_file(dir, &guard.key, target).await?);
        }
        Ok(guard)
    }
}

async fn lock_file(dir: &Path, key: &str, target: &RunTarget) -> Result<std::fs::File> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{key}.lock"));
    let target = target.clone();

    tokio::task::spawn_blocking(move || -> Result<std::fs::File> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                AnalysisError::Other(format!("open run lock {}: {err}", path.display()))
            })?;

        file.try_lock_exclusive()
            .map_err(|_| AnalysisError::RunInProgress(target.to_string()))?;
        Ok(file)
    })
    .await
    .map_err(|err| AnalysisError::Other(format!("join run lock task: {err}")))?
}

/// Releases the target when dropped
#[derive(Debug)]
pub struct RunGuard {
    key: String,
    busy: Arc<Mutex<HashSet<String>>>,
    file: Option<std::fs::File>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = file.unlock();
        }
        if let Ok(mut busy) = self.busy.lock() {
            busy.remove(&self.key);
        }
    }
}

/// Single background worker executing submitted runs in order.
///
/// Submitting returns a [`RunAck`] immediately; results are only visible
/// through the sink, the logs and [`RunQueue::subscribe`].
#[derive(Clone)]
pub struct RunQueue {
    inner: Arc<RunQueueInner>,
}

struct RunQueueInner {
    command_tx: mpsc::Sender<QueueCommand>,
    outcome_tx: broadcast::Sender<RunOutcome>,
    next_id: AtomicU64,
}

enum QueueCommand {
    Run { ack: RunAck, request: RunRequest },
    Shutdown,
}

impl RunQueue {
    /// Spawn the worker; must be called inside a tokio runtime.
    pub fn start(runner: Arc<AnalysisRunner>, lock: RunLock) -> Self {
        let (command_tx, command_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (outcome_tx, _) = broadcast::channel(QUEUE_CAPACITY);
        spawn_worker_loop(runner, lock, command_rx, outcome_tx.clone());
        Self {
            inner: Arc::new(RunQueueInner {
                command_tx,
                outcome_tx,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub async fn submit(&self, request: RunRequest) -> Result<RunAck> {
        let ack = RunAck {
            run_id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            target: request.target.clone(),
            pattern: request.pattern.clone(),
            accepted_at: unix_millis(),
        };
        self.inner
            .command_tx
            .try_send(QueueCommand::Run {
                ack: ack.clone(),
                request,
            })
            .map_err(|e| AnalysisError::Other(format!("analysis queue unavailable: {e}")))?;
        log::info!("Queued run {} for {}", ack.run_id, ack.target);
        Ok(ack)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunOutcome> {
        self.inner.outcome_tx.subscribe()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.inner
            .command_tx
            .send(QueueCommand::Shutdown)
            .await
            .map_err(|e| AnalysisError::Other(format!("failed to stop analysis queue: {e}")))
    }
}

impl Drop for RunQueue {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(QueueCommand::Shutdown);
        }
    }
}

fn spawn_worker_loop(
    runner: Arc<AnalysisRunner>,
    lock: RunLock,
    mut command_rx: mpsc::Receiver<QueueCommand>,
    outcome_tx: broadcast::Sender<RunOutcome>,
) {
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let (ack, request) = match command {
                QueueCommand::Run { ack, request } => (ack, request),
                QueueCommand::Shutdown => break,
            };

            let result = match lock.acquire(&request.target).await {
                Ok(_guard) => runner.run(&request).await,
                Err(e) => Err(e),
            };

            let outcome = match result {
                Ok(report) => RunOutcome {
                    run_id: ack.run_id,
                    target: ack.target,
                    report: Some(report),
                    error: None,
                },
                Err(e) => {
                    log::error!("Run {} for {} failed: {e}", ack.run_id, ack.target);
                    RunOutcome {
                        run_id: ack.run_id,
                        target: ack.target,
                        report: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            let _ = outcome_tx.send(outcome);
        }
        log::debug!("Analysis queue worker stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_target_is_exclusive_until_released() {
        let lock = RunLock::in_process();
        let target = RunTarget::Namespace("shop".to_string());

        let guard = lock.acquire(&target).await.unwrap();
        assert!(lock.is_busy(&target));
        let err = lock.acquire(&target).await.unwrap_err();
        assert!(matches!(err, AnalysisError::RunInProgress(_)));

        let other = lock.acquire(&RunTarget::Cluster).await;
        assert!(other.is_ok());

        drop(guard);
        assert!(!lock.is_busy(&target));
        assert!(lock.acquire(&target).await.is_ok());
    }

    #[tokio::test]
    async fn lock_files_exclude_other_holders() {
        let dir = tempfile::tempdir().unwrap();
        let first = RunLock::with_output_dir(dir.path());
        let second = RunLock::with_output_dir(dir.path());

        let guard = first.acquire(&RunTarget::Cluster).await.unwrap();
        assert!(dir.path().join(".locks/cluster.lock").exists());

        let err = second.acquire(&RunTarget::Cluster).await.unwrap_err();
        assert!(matches!(err, AnalysisError::RunInProgress(_)));
        assert!(!second.is_busy(&RunTarget::Cluster));

        drop(guard);
        assert!(second.acquire(&RunTarget::Cluster).await.is_ok());
    }
}
