//! Last-access bookkeeping for managed files
//!
//! The watcher touches a path on every OPEN and CLOSE; the sweeper asks for
//! the paths that have gone quiet. Both run against the same map, guarded by
//! one coarse lock. Event rates are low enough that contention is not a
//! concern.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of "now" for access bookkeeping
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// Lets tests and simulations step through expiry windows without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

/// Map of managed path → last observed access
pub struct AccessTracker {
    records: Mutex<HashMap<PathBuf, Instant>>,
    clock: Arc<dyn Clock>,
}

impl AccessTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Record "now" as the last access of `path`
    pub fn touch(&self, path: &Path) {
        let now = self.clock.now();
        self.records.lock().insert(path.to_path_buf(), now);
    }

    /// Every tracked path idle for at least `threshold`, with its idle time
    pub fn idle_entries(&self, threshold: Duration) -> Vec<(PathBuf, Duration)> {
        let now = self.clock.now();
        self.records
            .lock()
            .iter()
            .filter_map(|(path, last)| {
                let elapsed = now.saturating_duration_since(*last);
                (elapsed >= threshold).then(|| (path.clone(), elapsed))
            })
            .collect()
    }

    /// Stop tracking `path`. Returns whether it was tracked.
    pub fn forget(&self, path: &Path) -> bool {
        self.records.lock().remove(path).is_some()
    }

    #[cfg(test)]
    fn last_access(&self, path: &Path) -> Option<Instant> {
        self.records.lock().get(path).copied()
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.records.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl fmt::Debug for AccessTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTracker")
            .field("tracked", &self.len())
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AccessTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (AccessTracker::new(clock.clone()), clock)
    }

    #[test]
    fn test_touch_creates_and_updates_record() {
        let (tracker, clock) = setup();
        let path = Path::new("/mnt/a.bin");

        assert!(!tracker.is_tracked(path));
        tracker.touch(path);
        let first = tracker.last_access(path).unwrap();

        clock.advance(Duration::from_secs(5));
        tracker.touch(path);
        let second = tracker.last_access(path).unwrap();

        assert_eq!(second - first, Duration::from_secs(5));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_idle_entries_threshold_is_inclusive() {
        let (tracker, clock) = setup();
        let path = Path::new("/mnt/a.bin");
        tracker.touch(path);

        clock.advance(Duration::from_secs(59));
        assert!(tracker.idle_entries(Duration::from_secs(60)).is_empty());

        clock.advance(Duration::from_secs(1));
        let idle = tracker.idle_entries(Duration::from_secs(60));
        assert_eq!(idle, vec![(path.to_path_buf(), Duration::from_secs(60))]);
    }

    #[test]
    fn test_idle_entries_only_reports_quiet_paths() {
        let (tracker, clock) = setup();
        tracker.touch(Path::new("/mnt/old.bin"));
        clock.advance(Duration::from_secs(30));
        tracker.touch(Path::new("/mnt/new.bin"));
        clock.advance(Duration::from_secs(30));

        let idle = tracker.idle_entries(Duration::from_secs(60));
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].0, PathBuf::from("/mnt/old.bin"));
    }

    #[test]
    fn test_forget() {
        let (tracker, _clock) = setup();
        let path = Path::new("/mnt/a.bin");
        tracker.touch(path);

        assert!(tracker.forget(path));
        assert!(!tracker.forget(path));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_concurrent_touches() {
        let (tracker, _clock) = setup();
        let tracker = Arc::new(tracker);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        tracker.touch(&PathBuf::from(format!("/mnt/{}-{}.bin", i, j % 10)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.len(), 80);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now() - start, Duration::from_millis(1500));
    }
}
