//! Latest-report cache using moka
//!
//! Holds the most recent report per stage kind so that score reads do not hit
//! the filesystem every time. The store invalidates an entry whenever it
//! writes a report of that kind.

use moka::future::Cache;
use mv_core::{StageKind, ValidationReport};
use std::sync::Arc;
use std::time::Duration;

/// Cache of the latest report per stage kind
#[derive(Debug, Clone)]
pub struct LatestReportCache {
    inner: Cache<StageKind, Arc<ValidationReport>>,
}

impl LatestReportCache {
    /// Create new cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create cache with time-based expiration, for reports directories that
    /// other processes write into
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Insert the latest report for a kind
    #[inline]
    pub async fn insert(&self, kind: StageKind, report: ValidationReport) {
        self.inner.insert(kind, Arc::new(report)).await;
    }

    /// Get the cached latest report for a kind
    #[inline]
    pub async fn get(&self, kind: StageKind) -> Option<Arc<ValidationReport>> {
        self.inner.get(&kind).await
    }

    /// Invalidate one kind
    #[inline]
    pub async fn invalidate(&self, kind: StageKind) {
        self.inner.invalidate(&kind).await;
    }

    /// Invalidate all entries
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

impl Default for LatestReportCache {
    fn default() -> Self {
        Self::new(StageKind::ALL.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mv_core::StageId;

    fn report(kind: StageKind) -> ValidationReport {
        ValidationReport::new(StageId::from(kind), kind, Vec::new(), Duration::ZERO)
    }

    #[tokio::test]
    async fn insert_get_invalidate() {
        let cache = LatestReportCache::default();
        assert!(cache.get(StageKind::Tables).await.is_none());

        cache.insert(StageKind::Tables, report(StageKind::Tables)).await;
        let cached = cache.get(StageKind::Tables).await.unwrap();
        assert_eq!(cached.kind, StageKind::Tables);
        assert!(cache.get(StageKind::Functions).await.is_none());

        cache.invalidate(StageKind::Tables).await;
        assert!(cache.get(StageKind::Tables).await.is_none());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = LatestReportCache::with_ttl(4, Duration::from_millis(50));
        cache.insert(StageKind::Tables, report(StageKind::Tables)).await;
        assert!(cache.get(StageKind::Tables).await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get(StageKind::Tables).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_kind() {
        let cache = LatestReportCache::default();
        for kind in StageKind::ALL {
            cache.insert(kind, report(kind)).await;
        }
        cache.invalidate_all();
        for kind in StageKind::ALL {
            assert!(cache.get(kind).await.is_none());
        }
    }
}
