//! Session loop: startup, then the watch/evict cycle
//!
//! Startup authenticates (if configured) and seeds placeholders; both are
//! fatal on failure. The cycle then waits for filesystem events up to the
//! poll interval, dispatches them in arrival order, and sweeps once per
//! wake-up so idle files age out even when nothing happens.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::catalog::{Catalog, CatalogError, Credentials};
use crate::config::Config;
use crate::stats::{MirrorStats, StatsSnapshot};
use crate::store::{PlaceholderStore, SeedReport, StoreError};
use crate::sweeper::{SweepReport, Sweeper};
use crate::tracker::{AccessTracker, Clock};
use crate::watcher::{EventOutcome, EventSource, EventSourceError, FsEvent, Watcher};

/// Session tunables, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub credentials: Option<Credentials>,
    pub expiry: Duration,
    pub poll_interval: Duration,
    pub refresh_interval: Option<Duration>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            credentials: config.credentials(),
            expiry: config.expiry(),
            poll_interval: config.poll_interval(),
            refresh_interval: config.refresh_interval(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Authenticate(#[source] CatalogError),
    #[error("failed to retrieve catalog: {0}")]
    Catalog(#[source] CatalogError),
    #[error("placeholder store error: {0}")]
    Store(#[from] StoreError),
    #[error("event source failed: {0}")]
    EventSource(#[from] EventSourceError),
    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What one wake-up of the loop did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub outcomes: Vec<EventOutcome>,
    pub refreshed: Option<SeedReport>,
    pub sweep: SweepReport,
}

pub struct Session<C: ?Sized> {
    catalog: Arc<C>,
    store: PlaceholderStore,
    tracker: Arc<AccessTracker>,
    watcher: Watcher<C>,
    sweeper: Sweeper,
    stats: Arc<MirrorStats>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    last_refresh: Option<Instant>,
}

impl<C: Catalog + ?Sized> Session<C> {
    pub fn new(
        catalog: Arc<C>,
        store: PlaceholderStore,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stats = Arc::new(MirrorStats::default());
        let tracker = Arc::new(AccessTracker::new(clock.clone()));
        let watcher = Watcher::new(
            catalog.clone(),
            store.clone(),
            tracker.clone(),
            stats.clone(),
        );
        let sweeper = Sweeper::new(
            store.clone(),
            tracker.clone(),
            settings.expiry,
            stats.clone(),
        );

        Self {
            catalog,
            store,
            tracker,
            watcher,
            sweeper,
            stats,
            clock,
            settings,
            last_refresh: None,
        }
    }

    pub fn tracker(&self) -> &Arc<AccessTracker> {
        &self.tracker
    }

    pub fn watcher(&self) -> &Watcher<C> {
        &self.watcher
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Authenticate and seed placeholders.
    pub async fn start(&mut self) -> Result<SeedReport, SessionError> {
        if let Some(credentials) = &self.settings.credentials {
            self.catalog
                .authenticate(credentials)
                .await
                .map_err(SessionError::Authenticate)?;
        }

        let stale = self.store.clean_staging()?;
        if stale > 0 {
            tracing::info!(removed = stale, "cleaned up interrupted downloads");
        }

        let names = self
            .catalog
            .list_entries()
            .await
            .map_err(SessionError::Catalog)?;
        let report = self.store.seed(&names)?;
        self.last_refresh = Some(self.clock.now());

        tracing::info!(
            dir = %self.store.root().display(),
            created = report.created,
            existing = report.existing,
            rejected = report.rejected,
            "seeded placeholders"
        );
        Ok(report)
    }

    /// Handle one batch of events, refresh the catalog if due, then sweep.
    pub async fn process(&mut self, batch: Vec<FsEvent>) -> TickReport {
        let mut outcomes = Vec::with_capacity(batch.len());
        for event in &batch {
            let outcome = self.watcher.handle(event).await;
            tracing::debug!(file = %event.name, kind = ?event.kind, ?outcome, "handled event");
            outcomes.push(outcome);
        }

        let refreshed = self.refresh_if_due().await;
        let sweep = self.sweeper.sweep();

        TickReport {
            outcomes,
            refreshed,
            sweep,
        }
    }

    /// Wait for one batch of events and process it.
    pub async fn tick<S>(&mut self, source: &mut S) -> Result<TickReport, SessionError>
    where
        S: EventSource + ?Sized,
    {
        let batch = source.next_batch(self.settings.poll_interval).await?;
        Ok(self.process(batch).await)
    }

    /// Run the cycle until `shutdown` flips or the event source fails.
    ///
    /// Shutdown is only observed while waiting for events, so a download in
    /// progress always runs to completion first.
    pub async fn run<S>(
        mut self,
        mut source: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<StatsSnapshot, SessionError>
    where
        S: EventSource,
    {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = tokio::select! {
                _ = shutdown.changed() => break,
                batch = source.next_batch(self.settings.poll_interval) => batch,
            };

            match batch {
                Ok(batch) => {
                    self.process(batch).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "event source failed, stopping session");
                    return Err(e.into());
                }
            }
        }

        let stats = self.stats();
        tracing::info!(?stats, "session stopped");
        Ok(stats)
    }

    async fn refresh_if_due(&mut self) -> Option<SeedReport> {
        let interval = self.settings.refresh_interval?;
        let now = self.clock.now();
        if let Some(last) = self.last_refresh {
            if now.saturating_duration_since(last) < interval {
                return None;
            }
        }
        self.last_refresh = Some(now);

        let names = match self.catalog.list_entries().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "catalog refresh failed");
                return None;
            }
        };
        match self.store.seed(&names) {
            Ok(report) => {
                if report.created > 0 {
                    tracing::info!(created = report.created, "catalog refresh added placeholders");
                }
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to seed refreshed catalog");
                None
            }
        }
    }
}
