//! Sliding-window crash counter deciding when a worker has failed too often.

use std::time::{Duration, Instant};

/// Tracks recent crash timestamps within a rolling window. Not persisted;
/// resets on process start, matching the per-process nature of worker recovery.
pub struct CrashWindow {
    crash_times: Vec<Instant>,
    window: Duration,
    limit: usize,
}

impl CrashWindow {
    pub fn new(window: Duration, limit: usize) -> Self {
        Self {
            crash_times: Vec::new(),
            window,
            limit,
        }
    }

    /// Records a crash at `now`, then prunes entries older than `window` relative
    /// to the newest recorded crash.
    pub fn add_crash(&mut self) {
        self.crash_times.push(Instant::now());
        self.prune();
    }

    fn prune(&mut self) {
        if let Some(&newest) = self.crash_times.last() {
            self.crash_times
                .retain(|&t| newest.duration_since(t) <= self.window);
        }
    }

    /// True once at least `crash_limit` crashes lie within `crash_window` of the
    /// latest recorded crash.
    pub fn too_many(&self) -> bool {
        self.crash_times.len() >= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_not_too_many() {
        let window = CrashWindow::new(Duration::from_secs(30), 5);
        assert!(!window.too_many());
    }

    #[test]
    fn fires_once_limit_reached() {
        let mut window = CrashWindow::new(Duration::from_secs(30), 3);
        window.add_crash();
        window.add_crash();
        assert!(!window.too_many());
        window.add_crash();
        assert!(window.too_many());
    }

    #[test]
    fn prunes_stale_crashes() {
        let mut window = CrashWindow::new(Duration::from_millis(20), 2);
        window.add_crash();
        std::thread::sleep(Duration::from_millis(40));
        window.add_crash();
        // The first crash should have been pruned relative to the second.
        assert!(!window.too_many());
    }
}
