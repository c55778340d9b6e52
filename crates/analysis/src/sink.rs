use crate::error::{AnalysisError, Result};
use crate::runner::RunTarget;
use crate::source::MatchSink;
use async_trait::async_trait;
use kubepattern_protocol::PatternRecord;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use walkdir::WalkDir;

/// Whether a run over `target` owns `record`.
///
/// A namespace run owns records whose resources all live in that namespace
/// (the Namespace object itself included). A single-pattern run owns only
/// the records of that pattern.
pub fn record_in_scope(record: &PatternRecord, target: &RunTarget, pattern: Option<&str>) -> bool {
    if pattern.is_some_and(|name| record.spec.name != name) {
        return false;
    }
    match target {
        RunTarget::Cluster => true,
        RunTarget::Namespace(ns) => {
            !record.spec.resources.is_empty()
                && record.spec.resources.iter().all(|r| {
                    r.namespace.as_deref() == Some(ns.as_str())
                        || (r.kind == "Namespace" && r.name == *ns)
                })
        }
    }
}

/// Writes one JSON file per record at `<root>/<namespace>/<name>.json`
#[derive(Debug, Clone)]
pub struct FileMatchSink {
    root: PathBuf,
}

impl FileMatchSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, record: &PatternRecord) -> PathBuf {
        self.root
            .join(&record.metadata.namespace)
            .join(format!("{}.json", record.metadata.name))
    }

    /// Every record currently on disk
    pub fn load_all(&self) -> Result<Vec<PatternRecord>> {
        Ok(scan_records(&self.root)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }
}

fn scan_records(root: &Path) -> Result<Vec<(PathBuf, PatternRecord)>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = entry
            .map_err(|e| AnalysisError::Other(format!("Failed to scan {}: {e}", root.display())))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let text = std::fs::read_to_string(path)?;
        match serde_json::from_str::<PatternRecord>(&text) {
            Ok(record) => records.push((path.to_path_buf(), record)),
            Err(e) => log::debug!("Ignoring {}: not a match record ({e})", path.display()),
        }
    }
    records.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(records)
}

#[async_trait]
impl MatchSink for FileMatchSink {
    async fn replace_all(&self, target: &RunTarget, pattern: Option<&str>) -> Result<usize> {
        let root = self.root.clone();
        let target = target.clone();
        let pattern = pattern.map(str::to_string);
        tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut removed = 0;
            for (path, record) in scan_records(&root)? {
                if record_in_scope(&record, &target, pattern.as_deref()) {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await
        .map_err(|e| AnalysisError::Other(format!("replace task failed: {e}")))?
    }

    async fn save(&self, record: &PatternRecord) -> Result<()> {
        let path = self.record_path(record);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, json).await?;
        log::debug!("Saved {}", path.display());
        Ok(())
    }
}

/// Keeps records in memory; used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<PatternRecord>>,
    replace_calls: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PatternRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchSink for MemorySink {
    async fn replace_all(&self, target: &RunTarget, pattern: Option<&str>) -> Result<usize> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self
            .records
            .lock()
            .map_err(|_| AnalysisError::Other("memory sink poisoned".to_string()))?;
        let before = records.len();
        records.retain(|r| !record_in_scope(r, target, pattern));
        Ok(before - records.len())
    }

    async fn save(&self, record: &PatternRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| AnalysisError::Other("memory sink poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}
