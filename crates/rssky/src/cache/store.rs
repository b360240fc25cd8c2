//! Hierarchical on-disk artifact cache.
//!
//! Directory layout:
//! ```text
//! cache_dir/
//!   Example_Feed_b714320b/        <- SourceIdentity
//!     rawfeed.json                <- SourceSnapshot
//!     Some_Article_1a2b3c4d/      <- ItemIdentity
//!       fulltext.txt              <- extracted content
//!       summary.json              <- SummaryRecord
//! ```
//!
//! Reads never fail: a missing or unreadable artifact is a miss, logged at
//! warn level when the cause is anything other than absence. Writes return
//! a [`StorageError`] so the caller can report it and carry on with the
//! in-memory value.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::records::{SourceSnapshot, SummaryRecord};
use crate::error::StorageError;
use crate::identity::{ItemIdentity, SourceIdentity};
use crate::pipeline::events::{EventHandler, PipelineEvent};

pub const SNAPSHOT_FILE: &str = "rawfeed.json";
pub const CONTENT_FILE: &str = "fulltext.txt";
pub const SUMMARY_FILE: &str = "summary.json";

/// Item directories untouched for longer than this are evicted at start-up.
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

/// Default freshness window for source snapshots.
pub const DEFAULT_SNAPSHOT_MAX_AGE_HOURS: f64 = 6.0;

/// Start-up behaviour for [`ArtifactStore::initialize`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Remove every source subtree before anything else.
    pub clear_on_start: bool,
    pub retention_days: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            clear_on_start: false,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Outcome of an age-based sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Item directories removed.
    pub removed: usize,
    /// Item directories that were due but could not be removed.
    pub failed: usize,
}

/// Outcome of [`ArtifactStore::clear_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Source subtrees removed.
    pub removed: usize,
    /// Source subtrees that could not be removed.
    pub failed: usize,
}

/// Owner of every persisted artifact, keyed by (source, item).
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open a store, creating the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Open a store and run the start-up maintenance: an optional full clear
    /// followed by an age sweep.
    pub fn initialize(
        root: impl Into<PathBuf>,
        settings: &CacheSettings,
        events: &dyn EventHandler,
    ) -> Result<Self, StorageError> {
        let store = Self::open(root)?;
        if settings.clear_on_start {
            let report = store.clear_all()?;
            info!(
                "Cleared {} cached source(s) at start-up, {} failure(s)",
                report.removed, report.failed
            );
        }
        store.evict_older_than(settings.retention_days, events);
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self, source: &SourceIdentity) -> PathBuf {
        self.root.join(source.as_str())
    }

    pub fn item_dir(&self, source: &SourceIdentity, item: &ItemIdentity) -> PathBuf {
        self.source_dir(source).join(item.as_str())
    }

    pub fn snapshot_path(&self, source: &SourceIdentity) -> PathBuf {
        self.source_dir(source).join(SNAPSHOT_FILE)
    }

    pub fn content_path(&self, source: &SourceIdentity, item: &ItemIdentity) -> PathBuf {
        self.item_dir(source, item).join(CONTENT_FILE)
    }

    pub fn summary_path(&self, source: &SourceIdentity, item: &ItemIdentity) -> PathBuf {
        self.item_dir(source, item).join(SUMMARY_FILE)
    }

    // ── Source snapshots ───────────────────────────────────────────

    pub fn put_source_snapshot(
        &self,
        source: &SourceIdentity,
        snapshot: &SourceSnapshot,
    ) -> Result<(), StorageError> {
        write_json(&self.source_dir(source), SNAPSHOT_FILE, snapshot)
    }

    /// Snapshot for `source`, or `None` when missing or older than
    /// `max_age_hours` by its embedded timestamp.
    pub fn get_source_snapshot(
        &self,
        source: &SourceIdentity,
        max_age_hours: f64,
    ) -> Option<SourceSnapshot> {
        let snapshot: SourceSnapshot = read_or_miss(&self.snapshot_path(source))?;
        let now = SystemTime::now();
        if snapshot.is_fresh(max_age_hours, now) {
            Some(snapshot)
        } else {
            debug!(
                "Snapshot for {source} is stale ({:.1}h old, limit {max_age_hours}h)",
                snapshot.age_secs(now) / 3600.0
            );
            None
        }
    }

    // ── Extracted content ──────────────────────────────────────────

    pub fn put_content(
        &self,
        source: &SourceIdentity,
        item: &ItemIdentity,
        text: &str,
    ) -> Result<(), StorageError> {
        write_atomic(&self.item_dir(source, item), CONTENT_FILE, text.as_bytes())
    }

    pub fn get_content(&self, source: &SourceIdentity, item: &ItemIdentity) -> Option<String> {
        let path = self.content_path(source, item);
        match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Treating unreadable content at {} as a miss: {e}", path.display());
                None
            }
        }
    }

    // ── Summaries ──────────────────────────────────────────────────

    pub fn put_summary(
        &self,
        source: &SourceIdentity,
        item: &ItemIdentity,
        record: &SummaryRecord,
    ) -> Result<(), StorageError> {
        write_json(&self.item_dir(source, item), SUMMARY_FILE, record)
    }

    pub fn get_summary(
        &self,
        source: &SourceIdentity,
        item: &ItemIdentity,
    ) -> Option<SummaryRecord> {
        read_or_miss(&self.summary_path(source, item))
    }

    pub fn has_summary(&self, source: &SourceIdentity, item: &ItemIdentity) -> bool {
        self.summary_path(source, item).is_file()
    }

    /// Remove a cached summary. Returns whether a file was removed.
    pub fn delete_summary(&self, source: &SourceIdentity, item: &ItemIdentity) -> bool {
        let path = self.summary_path(source, item);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Failed to delete summary at {}: {e}", path.display());
                false
            }
        }
    }

    // ── Bulk removal ───────────────────────────────────────────────

    /// Remove everything cached for one source, snapshot included.
    pub fn clear_source(&self, source: &SourceIdentity) -> Result<(), StorageError> {
        let dir = self.source_dir(source);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(dir, e)),
        }
    }

    /// Remove every source subtree, keeping the root.
    ///
    /// A subtree that cannot be removed is logged and counted, and the clear
    /// carries on with the rest. Only an unreadable root is an error.
    pub fn clear_all(&self) -> Result<ClearReport, StorageError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        let mut report = ClearReport::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read entry under {}: {e}", self.root.display());
                    report.failed += 1;
                    continue;
                }
            };
            if !entry.file_type().is_ok_and(|ft| ft.is_dir()) {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to clear {}: {e}", path.display());
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Remove item directories not modified in the last `retention_days`.
    pub fn evict_older_than(&self, retention_days: u64, events: &dyn EventHandler) -> EvictionReport {
        let window = Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60));
        let cutoff = SystemTime::now()
            .checked_sub(window)
            .unwrap_or(UNIX_EPOCH);
        self.evict_before(cutoff, events)
    }

    /// Remove item directories whose mtime is strictly before `cutoff`.
    ///
    /// Source snapshots are never touched. Entries that vanish mid-walk are
    /// skipped, and a failed removal is counted without stopping the sweep.
    pub fn evict_before(&self, cutoff: SystemTime, events: &dyn EventHandler) -> EvictionReport {
        let mut report = EvictionReport::default();

        let sources = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot sweep cache at {}: {e}", self.root.display());
                return report;
            }
        };

        for source in sources.flatten() {
            if !source.file_type().is_ok_and(|ft| ft.is_dir()) {
                continue;
            }
            let source_name = source.file_name().to_string_lossy().to_string();
            let items = match fs::read_dir(source.path()) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Skipping source {source_name} during sweep: {e}");
                    continue;
                }
            };

            for item in items.flatten() {
                if !item.file_type().is_ok_and(|ft| ft.is_dir()) {
                    continue;
                }
                let item_name = item.file_name().to_string_lossy().to_string();
                let modified = match item.metadata().and_then(|m| m.modified()) {
                    Ok(t) => t,
                    Err(e) => {
                        debug!("Skipping {source_name}/{item_name} during sweep: {e}");
                        continue;
                    }
                };
                if modified >= cutoff {
                    continue;
                }

                match fs::remove_dir_all(item.path()) {
                    Ok(()) => {
                        report.removed += 1;
                        events.on_event(&PipelineEvent::ItemEvicted {
                            source: &source_name,
                            item: &item_name,
                        });
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!("Failed to evict {source_name}/{item_name}: {e}");
                        report.failed += 1;
                    }
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                "Cache sweep removed {} item(s), {} failure(s)",
                report.removed, report.failed
            );
        }
        report
    }
}

// ── File helpers ───────────────────────────────────────────────────

/// Write `bytes` to `dir/file_name` via a temp file and rename.
fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<(), StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

    let final_path = dir.join(file_name);
    let tmp_path = dir.join(format!(".{file_name}.tmp"));

    let result = fs::write(&tmp_path, bytes)
        .map_err(|e| StorageError::io(&tmp_path, e))
        .and_then(|()| {
            fs::rename(&tmp_path, &final_path).map_err(|e| StorageError::io(&final_path, e))
        });
    if result.is_err()
        && let Err(e) = fs::remove_file(&tmp_path)
        && e.kind() != ErrorKind::NotFound
    {
        warn!("Failed to remove temp file {}: {e}", tmp_path.display());
    }
    result
}

fn write_json<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StorageError::Serialize {
        path: dir.join(file_name),
        source,
    })?;
    write_atomic(dir, file_name, json.as_bytes())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| StorageError::Deserialize {
            path: path.to_path_buf(),
            source,
        })
}

fn read_or_miss<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match read_json(path) {
        Ok(value) => value,
        Err(e) => {
            warn!("Treating cache entry as a miss: {e}");
            None
        }
    }
}
