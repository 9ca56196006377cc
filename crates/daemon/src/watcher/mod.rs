//! Filesystem watcher for the managed directory
//!
//! This module turns open/close notifications into fetch and touch actions.
//!
//! # Architecture
//!
//! - `EventSource`: blocking-with-timeout supplier of filesystem events
//! - `InotifySource`: the Linux implementation on top of inotify
//! - `Watcher`: per-event state machine (`Unobserved → OpenPending → Idle`)
//! - `InflightGuard`: at most one download per path at a time
//!
//! A failed download never escapes the watcher. The placeholder stays empty
//! and the next OPEN of the same file tries again.

mod inflight;
mod inotify_source;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::stats::MirrorStats;
use crate::store::{PlaceholderStore, StoreError};
use crate::tracker::AccessTracker;

pub use inflight::{InflightGuard, InflightPermit};
pub use inotify_source::InotifySource;

/// Kind of a filesystem notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Open,
    CloseWrite,
    CloseNoWrite,
    /// Anything the watcher has no use for
    Other,
}

/// A notification for one entry of the managed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// File name relative to the managed directory
    pub name: String,
    pub kind: FsEventKind,
}

impl FsEvent {
    pub fn new(name: impl Into<String>, kind: FsEventKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn open(name: impl Into<String>) -> Self {
        Self::new(name, FsEventKind::Open)
    }

    pub fn close(name: impl Into<String>) -> Self {
        Self::new(name, FsEventKind::CloseNoWrite)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    #[error("notification I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("watch on the managed directory was removed")]
    WatchRemoved,
    #[error("notification stream closed")]
    Closed,
}

/// Supplier of filesystem events.
///
/// `next_batch` waits up to `timeout` for at least one event and returns
/// every event available at that point; an empty batch means the timeout
/// elapsed. Errors mean the source itself is broken.
#[async_trait]
pub trait EventSource: Send {
    async fn next_batch(&mut self, timeout: Duration) -> Result<Vec<FsEvent>, EventSourceError>;
}

/// Where a path stands from the watcher's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// No event seen yet, or evicted since
    Unobserved,
    /// A fetch holds or waits on the path's in-flight guard
    OpenPending,
    /// Tracked, no fetch running
    Idle,
}

/// What handling one event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The placeholder was downloaded and materialized
    Fetched { bytes: u64 },
    /// OPEN of a file that already had content
    AlreadyPresent,
    /// The download failed; the placeholder is still empty
    FetchFailed,
    /// CLOSE recorded
    Touched,
    /// Unsupported kind, staging file, unsafe name, or missing file
    Ignored,
}

pub struct Watcher<C: ?Sized> {
    catalog: Arc<C>,
    store: PlaceholderStore,
    tracker: Arc<AccessTracker>,
    inflight: InflightGuard,
    stats: Arc<MirrorStats>,
}

impl<C: Catalog + ?Sized> Watcher<C> {
    pub fn new(
        catalog: Arc<C>,
        store: PlaceholderStore,
        tracker: Arc<AccessTracker>,
        stats: Arc<MirrorStats>,
    ) -> Self {
        Self {
            catalog,
            store,
            tracker,
            inflight: InflightGuard::new(),
            stats,
        }
    }

    pub fn state(&self, name: &str) -> PathState {
        if self.inflight.is_pending(name) {
            return PathState::OpenPending;
        }
        match self.store.path_for(name) {
            Ok(path) if self.tracker.is_tracked(&path) => PathState::Idle,
            _ => PathState::Unobserved,
        }
    }

    /// Dispatch one event.
    pub async fn handle(&self, event: &FsEvent) -> EventOutcome {
        if PlaceholderStore::is_staging_name(&event.name) {
            return EventOutcome::Ignored;
        }
        match event.kind {
            FsEventKind::Open => self.handle_open(&event.name).await,
            FsEventKind::CloseWrite | FsEventKind::CloseNoWrite => self.handle_close(&event.name),
            FsEventKind::Other => EventOutcome::Ignored,
        }
    }

    async fn handle_open(&self, name: &str) -> EventOutcome {
        let path = match self.store.path_for(name) {
            Ok(path) => path,
            Err(_) => return EventOutcome::Ignored,
        };

        let outcome = {
            let _permit = self.inflight.acquire(name).await;
            match self.store.size(&path) {
                Ok(Some(0)) => self.fetch_into(name, &path).await,
                Ok(Some(_)) => EventOutcome::AlreadyPresent,
                Ok(None) => {
                    tracing::debug!(file = %name, "opened file vanished before handling");
                    return EventOutcome::Ignored;
                }
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "failed to stat opened file");
                    return EventOutcome::Ignored;
                }
            }
        };

        self.tracker.touch(&path);
        outcome
    }

    async fn fetch_into(&self, name: &str, path: &std::path::Path) -> EventOutcome {
        tracing::info!(file = %name, "fetching placeholder content");
        let content = match self.catalog.fetch(name).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "fetch failed, placeholder left empty");
                self.stats.record_fetch_failure();
                return EventOutcome::FetchFailed;
            }
        };

        // writing and syncing a large model blocks, keep it off the runtime
        let store = self.store.clone();
        let target = path.to_path_buf();
        let written =
            tokio::task::spawn_blocking(move || store.materialize(&target, &content)).await;

        match written {
            Ok(Ok(bytes)) => {
                tracing::info!(file = %name, bytes, "materialized");
                self.stats.record_fetch(bytes);
                EventOutcome::Fetched { bytes }
            }
            Ok(Err(StoreError::AlreadyMaterialized(_))) => EventOutcome::AlreadyPresent,
            Ok(Err(e)) => {
                tracing::warn!(file = %name, error = %e, "failed to materialize download");
                self.stats.record_fetch_failure();
                EventOutcome::FetchFailed
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "materialize task failed");
                self.stats.record_fetch_failure();
                EventOutcome::FetchFailed
            }
        }
    }

    fn handle_close(&self, name: &str) -> EventOutcome {
        match self.store.path_for(name) {
            Ok(path) => {
                self.tracker.touch(&path);
                EventOutcome::Touched
            }
            Err(_) => EventOutcome::Ignored,
        }
    }
}
