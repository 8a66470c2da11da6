//! Trailing-edge debounce for file change bursts.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// A change seen at `first_seen`, with the window held open by `last_change`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReload {
    pub first_seen: Instant,
    pub last_change: Instant,
    /// Changed paths in first-seen order, without duplicates
    pub paths: Vec<PathBuf>,
}

impl PendingReload {
    fn merge(&mut self, paths: Vec<PathBuf>, now: Instant) {
        for path in paths {
            if !self.paths.contains(&path) {
                self.paths.push(path);
            }
        }
        self.last_change = now;
    }
}

/// Collapses changes into one pending reload until the window elapses quietly.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pending: Option<PendingReload>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a change; opens the window or pushes it out.
    pub fn push(&mut self, paths: Vec<PathBuf>, now: Instant) {
        match self.pending {
            Some(ref mut pending) => pending.merge(paths, now),
            None => {
                let mut pending = PendingReload {
                    first_seen: now,
                    last_change: now,
                    paths: Vec::new(),
                };
                pending.merge(paths, now);
                self.pending = Some(pending);
            }
        }
    }

    /// When the pending reload becomes due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
            .as_ref()
            .map(|pending| pending.last_change + self.window)
    }

    /// Release the pending reload once the window has passed without changes.
    pub fn flush_if_quiet(&mut self, now: Instant) -> Option<PendingReload> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.pending.take(),
            _ => None,
        }
    }

    pub fn flush(&mut self) -> Option<PendingReload> {
        self.pending.take()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_inside_window_fires_once() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(200));
        let mut fired = Vec::new();

        for i in 0..5u64 {
            let now = start + ms(i * 40);
            fired.extend(debouncer.flush_if_quiet(now));
            debouncer.push(vec![PathBuf::from("config/menu.xml")], now);
        }
        // Still inside the window of the last change.
        fired.extend(debouncer.flush_if_quiet(start + ms(300)));
        assert!(fired.is_empty());

        fired.extend(debouncer.flush_if_quiet(start + ms(360)));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].paths, vec![PathBuf::from("config/menu.xml")]);
        assert_eq!(fired[0].first_seen, start);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn spaced_changes_fire_separately() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(200));

        debouncer.push(vec![PathBuf::from("fonts")], start);
        let first = debouncer.flush_if_quiet(start + ms(250));
        debouncer.push(vec![PathBuf::from("assets")], start + ms(300));
        let second = debouncer.flush_if_quiet(start + ms(550));

        assert_eq!(first.unwrap().paths, vec![PathBuf::from("fonts")]);
        assert_eq!(second.unwrap().paths, vec![PathBuf::from("assets")]);
    }

    #[test]
    fn merged_paths_are_deduplicated_in_order() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(200));
        debouncer.push(vec![PathBuf::from("b"), PathBuf::from("a")], start);
        debouncer.push(vec![PathBuf::from("a"), PathBuf::from("c")], start + ms(10));
        assert_eq!(debouncer.deadline(), Some(start + ms(210)));

        let pending = debouncer.flush().unwrap();
        assert_eq!(
            pending.paths,
            vec![PathBuf::from("b"), PathBuf::from("a"), PathBuf::from("c")]
        );
        assert_eq!(pending.last_change, start + ms(10));
    }
}
