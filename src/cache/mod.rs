//! Bounded per-path cache of synthesized tags.
//!
//! Lookups refresh an entry only when the real file's mtime is strictly newer
//! than the entry. The cache is an LRU sized to `max_entries`; building or
//! refreshing one path runs under moka's per-key compute so concurrent
//! lookups of that path wait for the single build instead of racing it.

mod entry;

pub use entry::CacheEntry;

use crate::tag::{FrameLayout, TagResult};
use chrono::{DateTime, Utc};
use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_MAX_ENTRIES: u64 = 1000;

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
    pub evictions: u64,
}

pub struct EntryCache {
    root: PathBuf,
    layout: FrameLayout,
    entries: Cache<PathBuf, Arc<CacheEntry>>,
    counters: Arc<Counters>,
}

impl EntryCache {
    pub fn new(root: impl Into<PathBuf>, max_entries: u64, layout: FrameLayout) -> Self {
        let counters = Arc::new(Counters::default());
        let listener_counters = counters.clone();

        let entries: Cache<PathBuf, Arc<CacheEntry>> = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |path: Arc<PathBuf>, _entry, cause| {
                if cause == RemovalCause::Size {
                    listener_counters.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(path = %path.display(), "Evicted tag cache entry");
                }
            })
            .build();

        Self { root: root.into(), layout, entries, counters }
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Fetch the entry for the real file at `path`, building it on first use
    /// and rebuilding it when the file changed since it was built.
    pub fn lookup(&self, path: &Path) -> TagResult<Arc<CacheEntry>> {
        let modified: DateTime<Utc> = std::fs::metadata(path)?.modified()?.into();

        if let Some(entry) = self.entries.get(path) {
            if !entry.is_stale(modified) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry);
            }
        }

        let result = self
            .entries
            .entry(path.to_path_buf())
            .and_try_compute_with(|existing| {
                self.build_or_refresh(path, modified, existing.map(|e| e.into_value()))
            })?;

        match result {
            CompResult::Inserted(entry) => {
                // apply the capacity bound before anyone can observe an extra entry
                self.entries.run_pending_tasks();
                Ok(entry.into_value())
            }
            CompResult::ReplacedWith(entry) | CompResult::Unchanged(entry) => {
                Ok(entry.into_value())
            }
            CompResult::StillNone(_) | CompResult::Removed(_) => {
                unreachable!("tag cache compute never removes or skips an entry")
            }
        }
    }

    /// Runs under the per-key compute lock for `path`.
    fn build_or_refresh(
        &self,
        path: &Path,
        modified: DateTime<Utc>,
        existing: Option<Arc<CacheEntry>>,
    ) -> TagResult<Op<Arc<CacheEntry>>> {
        match existing {
            // another lookup rebuilt it while we waited
            Some(entry) if !entry.is_stale(modified) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Op::Nop)
            }
            Some(entry) => {
                tracing::debug!(path = %path.display(), "Refreshing stale tag cache entry");
                let refreshed = entry.refreshed(self.layout)?;
                self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
                Ok(Op::Put(Arc::new(refreshed)))
            }
            None => {
                let built = CacheEntry::build(path, &self.root, self.layout)?;
                tracing::debug!(
                    path = %path.display(),
                    tag_len = built.synthetic_tag.len(),
                    hidden_len = built.original_tag_len,
                    "Built tag cache entry"
                );
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(Op::Put(Arc::new(built)))
            }
        }
    }

    /// Number of cached entries, after applying pending evictions.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}
