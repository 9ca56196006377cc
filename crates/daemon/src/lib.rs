//! Lazy-fetch mirror of a MyLora model catalog
//!
//! Remote files appear locally as zero-byte placeholders. Opening one
//! downloads its content; files left alone past the expiry are turned
//! back into placeholders.

pub mod catalog;
pub mod config;
pub mod process;
pub mod session;
pub mod stats;
pub mod store;
pub mod sweeper;
pub mod tracker;
pub mod watcher;

pub use catalog::{Catalog, CatalogError, Credentials, RemoteCatalog};
pub use config::{Config, ConfigError};
pub use process::{spawn_session, start_mirror, MirrorHandle, ShutdownHandle};
pub use session::{Session, SessionError, SessionSettings, TickReport};
pub use stats::{MirrorStats, StatsSnapshot};
pub use store::{PlaceholderStore, SeedReport, StoreError};
pub use sweeper::{SweepReport, Sweeper};
pub use tracker::{AccessTracker, Clock, ManualClock, SystemClock};
pub use watcher::{
    EventOutcome, EventSource, EventSourceError, FsEvent, FsEventKind, InotifySource, PathState,
    Watcher,
};
