//! File-backed report store
//!
//! One JSON file per stage run, named `<kind>-<timestamp>-<seq>.json`. Files
//! are created with `create_new`, so a report is never overwritten; a name
//! collision bumps the sequence suffix instead. The latest report for a kind
//! is the file with the greatest modification time, file name breaking ties.

use crate::cache::LatestReportCache;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use mv_core::{StageKind, ValidationReport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Default reports directory, relative to the working directory
pub const DEFAULT_REPORTS_DIR: &str = "reports";

/// Upper bound on the sequence suffix for one kind and timestamp
const MAX_SEQUENCE: u32 = 1000;

/// A stored report file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    /// File name inside the reports directory
    pub file_name: String,
    /// Full path
    #[serde(skip)]
    pub path: PathBuf,
    /// File size
    pub size_bytes: u64,
    /// Modification time
    pub modified: DateTime<Utc>,
}

/// Append-only report store
#[derive(Debug)]
pub struct ReportStore {
    dir: PathBuf,
    cache: LatestReportCache,
    /// Bumped on every save; loads only populate the cache if unchanged
    generation: AtomicU64,
}

impl ReportStore {
    /// Create a store rooted at `dir`; the directory is created lazily
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_cache(dir, LatestReportCache::default())
    }

    /// Create a store with a custom cache
    #[must_use]
    pub fn with_cache(dir: impl Into<PathBuf>, cache: LatestReportCache) -> Self {
        Self {
            dir: dir.into(),
            cache,
            generation: AtomicU64::new(0),
        }
    }

    /// Reports directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })
    }

    /// Persist a report; never overwrites an existing file
    ///
    /// # Errors
    /// - `StoreError::Io` if the directory or file cannot be written
    /// - `StoreError::Serialize` if the report cannot be encoded
    /// - `StoreError::Exhausted` if every sequence suffix is taken
    pub async fn save(
        &self,
        kind: StageKind,
        report: &ValidationReport,
    ) -> Result<PathBuf, StoreError> {
        self.ensure_dir().await?;

        let bytes = serde_json::to_vec_pretty(report).map_err(StoreError::Serialize)?;
        let stem = format!("{}-{}", kind, file_timestamp(report.timestamp));

        for seq in 0..MAX_SEQUENCE {
            let path = self.dir.join(format!("{stem}-{seq:03}.json"));
            let open = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            let mut file = match open {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(StoreError::Io { path, source }),
            };

            let io = |source| StoreError::Io {
                path: path.clone(),
                source,
            };
            file.write_all(&bytes).await.map_err(io)?;
            file.sync_all().await.map_err(io)?;

            self.generation.fetch_add(1, Ordering::SeqCst);
            self.cache.invalidate(kind).await;
            tracing::debug!(%kind, path = %path.display(), "report saved");
            return Ok(path);
        }

        Err(StoreError::Exhausted { stem })
    }

    /// Stored reports for a kind, newest first
    ///
    /// # Errors
    /// `StoreError::Io` if the directory cannot be read
    pub async fn history(&self, kind: StageKind) -> Result<Vec<ReportEntry>, StoreError> {
        self.ensure_dir().await?;

        let io = |source| StoreError::Io {
            path: self.dir.clone(),
            source,
        };
        let prefix = format!("{kind}-");
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await.map_err(io)?;

        while let Some(entry) = dir.next_entry().await.map_err(io)? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.starts_with(&prefix) || !file_name.ends_with(".json") {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(source) => {
                    return Err(StoreError::Io {
                        path: entry.path(),
                        source,
                    })
                }
            };
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .map_err(|source| StoreError::Io {
                    path: entry.path(),
                    source,
                })?;
            entries.push(ReportEntry {
                file_name,
                path: entry.path(),
                size_bytes: metadata.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(entries)
    }

    /// Latest report for a kind, or `None` if none was written yet
    ///
    /// # Errors
    /// - `StoreError::Io` if the directory or file cannot be read
    /// - `StoreError::Malformed` if the newest file is not a valid report
    pub async fn load_latest(
        &self,
        kind: StageKind,
    ) -> Result<Option<ValidationReport>, StoreError> {
        if let Some(cached) = self.cache.get(kind).await {
            return Ok(Some((*cached).clone()));
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let entries = self.history(kind).await?;
        let Some(latest) = entries.first() else {
            return Ok(None);
        };

        let report = read_report(&latest.path).await?;
        self.cache_if_current(kind, &report, generation).await;
        Ok(Some(report))
    }

    /// Cache a report read at `generation`; dropped again if a save happened
    /// since, including one that finished before the insert landed.
    async fn cache_if_current(&self, kind: StageKind, report: &ValidationReport, generation: u64) {
        self.cache.insert(kind, report.clone()).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            self.cache.invalidate(kind).await;
        }
    }

    /// Latest report of every kind that has one
    ///
    /// # Errors
    /// Propagates the first `load_latest` failure
    pub async fn load_all_latest(
        &self,
    ) -> Result<BTreeMap<StageKind, ValidationReport>, StoreError> {
        let mut out = BTreeMap::new();
        for kind in StageKind::ALL {
            if let Some(report) = self.load_latest(kind).await? {
                out.insert(kind, report);
            }
        }
        Ok(out)
    }
}

async fn read_report(path: &Path) -> Result<ValidationReport, StoreError> {
    let bytes = fs::read(path).await.map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// ISO-8601 timestamp with `:` replaced so it is safe in file names
fn file_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H-%M-%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report(passed: usize) -> ValidationReport {
        let results = (0..passed)
            .map(|i| mv_core::ValidationResult::passed(format!("ok_{i}"), mv_core::ItemKind::Table))
            .collect();
        ValidationReport::new(
            mv_core::StageId::from(StageKind::Tables),
            StageKind::Tables,
            results,
            std::time::Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn save_during_load_keeps_stale_report_out_of_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path());
        let stale = report(1);
        store.save(StageKind::Tables, &stale).await.unwrap();

        // reader samples the generation, then a save completes before its insert
        let generation = store.generation.load(Ordering::SeqCst);
        store.save(StageKind::Tables, &report(2)).await.unwrap();
        store.cache_if_current(StageKind::Tables, &stale, generation).await;

        assert!(store.cache.get(StageKind::Tables).await.is_none());
    }

    #[tokio::test]
    async fn load_without_concurrent_save_is_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path());
        store.save(StageKind::Tables, &report(3)).await.unwrap();

        store.load_latest(StageKind::Tables).await.unwrap();
        let cached = store.cache.get(StageKind::Tables).await.unwrap();
        assert_eq!(cached.summary.passed, 3);
    }

    #[test]
    fn timestamp_is_filename_safe() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).unwrap();
        let s = file_timestamp(ts);
        assert_eq!(s, "2026-10-19T08-30-05.000Z");
        assert!(!s.contains(':'));
    }
}
