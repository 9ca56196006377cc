//! inotify-backed event source
//!
//! Subscribes to `IN_OPEN`, `IN_CLOSE_WRITE` and `IN_CLOSE_NOWRITE` on the
//! managed directory only; subdirectories are not watched.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use inotify::{Event, EventMask, EventStream, Inotify, WatchMask};

use super::{EventSource, EventSourceError, FsEvent, FsEventKind};

const EVENT_BUFFER_SIZE: usize = 4096;

pub struct InotifySource {
    stream: EventStream<[u8; EVENT_BUFFER_SIZE]>,
}

impl InotifySource {
    /// Start watching `dir`. Must be called from within a tokio runtime.
    pub fn watch(dir: &Path) -> Result<Self, EventSourceError> {
        let inotify = Inotify::init()?;
        inotify.watches().add(
            dir,
            WatchMask::OPEN | WatchMask::CLOSE_WRITE | WatchMask::CLOSE_NOWRITE,
        )?;
        let stream = inotify.into_event_stream([0u8; EVENT_BUFFER_SIZE])?;
        tracing::debug!(dir = %dir.display(), "watching for open/close events");
        Ok(Self { stream })
    }

    fn convert(event: Event<OsString>) -> Result<Option<FsEvent>, EventSourceError> {
        if event.mask.contains(EventMask::IGNORED) {
            return Err(EventSourceError::WatchRemoved);
        }
        if event.mask.contains(EventMask::Q_OVERFLOW) {
            tracing::warn!("inotify queue overflowed; some open/close events were lost");
            return Ok(None);
        }
        if event.mask.contains(EventMask::ISDIR) {
            return Ok(None);
        }
        let Some(name) = event.name else {
            return Ok(None);
        };
        let name = match name.into_string() {
            Ok(name) => name,
            Err(raw) => {
                tracing::debug!(name = ?raw, "skipping event for non UTF-8 filename");
                return Ok(None);
            }
        };

        let kind = if event.mask.contains(EventMask::OPEN) {
            FsEventKind::Open
        } else if event.mask.contains(EventMask::CLOSE_WRITE) {
            FsEventKind::CloseWrite
        } else if event.mask.contains(EventMask::CLOSE_NOWRITE) {
            FsEventKind::CloseNoWrite
        } else {
            FsEventKind::Other
        };
        Ok(Some(FsEvent { name, kind }))
    }
}

#[async_trait]
impl EventSource for InotifySource {
    async fn next_batch(&mut self, timeout: Duration) -> Result<Vec<FsEvent>, EventSourceError> {
        let first = match tokio::time::timeout(timeout, self.stream.next()).await {
            Err(_elapsed) => return Ok(Vec::new()),
            Ok(None) => return Err(EventSourceError::Closed),
            Ok(Some(event)) => event?,
        };

        let mut batch = Vec::new();
        batch.extend(Self::convert(first)?);

        // drain whatever is already queued without waiting again
        while let Some(next) = self.stream.next().now_or_never() {
            match next {
                Some(event) => batch.extend(Self::convert(event?)?),
                None => return Err(EventSourceError::Closed),
            }
        }

        Ok(batch)
    }
}
