use std::time::{Duration, Instant};

use crate::session::Dimensions;

/// Debounces viewport geometry changes before they reach the active
/// session's PTY.
///
/// Rapid successive observations within the window collapse into a single
/// application of the final geometry; every new observation pushes the
/// deadline out. The coordinator only remembers the latest geometry, so a
/// drag that fires dozens of events still costs one PTY resize.
pub(crate) struct ResizeCoordinator {
    window: Duration,
    pending: Option<Dimensions>,
    deadline: Option<Instant>,
}

impl ResizeCoordinator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
        }
    }

    /// Record a geometry observation at `now`.
    pub fn observe(&mut self, dimensions: Dimensions, now: Instant) {
        self.pending = Some(dimensions);
        self.deadline = Some(now + self.window);
    }

    /// Return the settled geometry once the debounce window has passed.
    /// Yields each observed geometry at most once.
    pub fn take_due(&mut self, now: Instant) -> Option<Dimensions> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        self.pending.take()
    }

    /// Drop any pending observation without applying it.
    pub fn clear(&mut self) {
        self.pending = None;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(50);

    fn dims(columns: u16, rows: u16) -> Dimensions {
        Dimensions { columns, rows }
    }

    #[test]
    fn test_nothing_due_before_window() {
        let mut resize = ResizeCoordinator::new(WINDOW);
        let t0 = Instant::now();
        resize.observe(dims(100, 30), t0);
        assert_eq!(resize.take_due(t0 + Duration::from_millis(10)), None);
        assert_eq!(resize.take_due(t0 + WINDOW), Some(dims(100, 30)));
    }

    #[test]
    fn test_rapid_events_coalesce_to_last() {
        let mut resize = ResizeCoordinator::new(WINDOW);
        let t0 = Instant::now();
        resize.observe(dims(90, 25), t0);
        resize.observe(dims(100, 30), t0 + Duration::from_millis(20));
        resize.observe(dims(110, 35), t0 + Duration::from_millis(40));

        // The second event pushed the deadline; nothing due at t0 + window.
        assert_eq!(resize.take_due(t0 + WINDOW), None);
        assert_eq!(
            resize.take_due(t0 + Duration::from_millis(40) + WINDOW),
            Some(dims(110, 35))
        );
    }

    #[test]
    fn test_yields_once() {
        let mut resize = ResizeCoordinator::new(WINDOW);
        let t0 = Instant::now();
        resize.observe(dims(100, 30), t0);
        let due = t0 + WINDOW;
        assert!(resize.take_due(due).is_some());
        assert!(resize.take_due(due + WINDOW).is_none());
    }

    #[test]
    fn test_clear_discards_pending() {
        let mut resize = ResizeCoordinator::new(WINDOW);
        let t0 = Instant::now();
        resize.observe(dims(100, 30), t0);
        resize.clear();
        assert!(resize.take_due(t0 + WINDOW).is_none());
    }
}
