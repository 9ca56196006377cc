//! Eviction of idle materialized files

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::stats::MirrorStats;
use crate::store::PlaceholderStore;
use crate::tracker::AccessTracker;

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files turned back into placeholders
    pub evicted: Vec<PathBuf>,
    /// Idle records with nothing to reclaim (already empty or gone)
    pub skipped: usize,
    /// Evictions that failed; these stay tracked and are retried next sweep
    pub failed: usize,
}

#[derive(Debug)]
pub struct Sweeper {
    store: PlaceholderStore,
    tracker: Arc<AccessTracker>,
    expiry: Duration,
    stats: Arc<MirrorStats>,
}

impl Sweeper {
    pub fn new(
        store: PlaceholderStore,
        tracker: Arc<AccessTracker>,
        expiry: Duration,
        stats: Arc<MirrorStats>,
    ) -> Self {
        Self {
            store,
            tracker,
            expiry,
            stats,
        }
    }

    /// Evict every file idle for at least the expiry.
    ///
    /// Each file is handled on its own; a failure is logged and the rest of
    /// the sweep carries on.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for (path, idle) in self.tracker.idle_entries(self.expiry) {
            match self.store.size(&path) {
                Ok(Some(size)) if size > 0 => {}
                Ok(_) => {
                    self.tracker.forget(&path);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "failed to stat idle file");
                    self.stats.record_eviction_failure();
                    report.failed += 1;
                    continue;
                }
            }

            match self.store.evict(&path) {
                Ok(()) => {
                    tracing::info!(
                        file = %path.display(),
                        elapsed_secs = idle.as_secs(),
                        "evicted idle file"
                    );
                    self.tracker.forget(&path);
                    self.stats.record_eviction();
                    report.evicted.push(path);
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "eviction failed");
                    self.stats.record_eviction_failure();
                    report.failed += 1;
                }
            }
        }

        report
    }
}
