//! Background execution of the session loop
//!
//! Startup runs on the caller so fatal errors surface before anything is
//! spawned. The watch/evict cycle then runs on its own task until the
//! returned handle asks it to stop.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::catalog::{Catalog, RemoteCatalog};
use crate::config::Config;
use crate::session::{Session, SessionError, SessionSettings};
use crate::stats::StatsSnapshot;
use crate::store::PlaceholderStore;
use crate::tracker::SystemClock;
use crate::watcher::{EventSource, InotifySource};

/// Signals the session loop to stop after its current wake-up
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn shutdown(&self) {
        // the loop may already be gone
        let _ = self.tx.send(true);
    }
}

/// A running session loop
#[derive(Debug)]
pub struct MirrorHandle {
    task: JoinHandle<Result<StatsSnapshot, SessionError>>,
    shutdown: ShutdownHandle,
}

impl MirrorHandle {
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Wait for the loop to end, either by shutdown or by a fatal error.
    pub async fn finished(&mut self) -> Result<StatsSnapshot, SessionError> {
        (&mut self.task).await?
    }
}

/// Spawn the cycle of an already started session onto the runtime.
pub fn spawn_session<C, S>(session: Session<C>, source: S) -> MirrorHandle
where
    C: Catalog + ?Sized + 'static,
    S: EventSource + 'static,
{
    let (shutdown, rx) = ShutdownHandle::new();
    let task = tokio::spawn(session.run(source, rx));
    MirrorHandle { task, shutdown }
}

/// Build the production session from `config`, run startup, and spawn the
/// loop watching the managed directory with inotify.
pub async fn start_mirror(config: &Config) -> Result<MirrorHandle, SessionError> {
    let catalog = Arc::new(RemoteCatalog::new(&config.server_url).map_err(SessionError::Catalog)?);
    let store = PlaceholderStore::open(&config.data_dir)?;
    let mut session = Session::new(
        catalog,
        store.clone(),
        SessionSettings::from_config(config),
        Arc::new(SystemClock),
    );

    session.start().await?;

    // watch only after seeding so placeholder creation is never mistaken
    // for a reader
    let source = InotifySource::watch(store.root())?;
    Ok(spawn_session(session, source))
}
