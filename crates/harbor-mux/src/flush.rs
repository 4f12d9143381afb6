use std::mem;
use std::time::{Duration, Instant};

/// Coalesces bursty process output into one applied update per pump tick.
///
/// Two accumulators run side by side: `pending` feeds the session's
/// scrollback once per rendering opportunity, and `side_pending` feeds the
/// external output observer on its own, slower cadence. Splitting the two
/// keeps expensive side-effect scans (port detection and the like) from
/// running once per chunk or once per frame.
pub(crate) struct FlushScheduler {
    pending: String,
    side_pending: String,
    side_interval: Duration,
    last_side_emit: Option<Instant>,
}

/// One coalesced flush: content for the scrollback, plus the side-channel
/// payload when its rate limit allows an emission.
pub(crate) struct Flush {
    pub text: String,
    pub side: Option<String>,
}

impl FlushScheduler {
    pub fn new(side_interval: Duration) -> Self {
        Self {
            pending: String::new(),
            side_pending: String::new(),
            side_interval,
            last_side_emit: None,
        }
    }

    /// Accumulate one inbound chunk. Chunks are concatenated in arrival
    /// order; nothing is applied until the next `take` or `drain`.
    pub fn push(&mut self, chunk: &str) {
        self.pending.push_str(chunk);
        self.side_pending.push_str(chunk);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.side_pending.is_empty()
    }

    /// Take whatever is due at `now`.
    ///
    /// Everything accumulated since the last take comes back as one `text`
    /// block, however many chunks arrived. The side channel only fires when
    /// its interval has elapsed; otherwise its accumulator keeps growing.
    pub fn take(&mut self, now: Instant) -> Option<Flush> {
        let text = mem::take(&mut self.pending);
        let side = if !self.side_pending.is_empty() && self.side_due(now) {
            self.last_side_emit = Some(now);
            Some(mem::take(&mut self.side_pending))
        } else {
            None
        };
        if text.is_empty() && side.is_none() {
            return None;
        }
        Some(Flush { text, side })
    }

    /// Synchronous flush-on-exit: return everything still buffered,
    /// ignoring both cadences. Nothing may be silently dropped.
    pub fn drain(&mut self) -> Flush {
        let text = mem::take(&mut self.pending);
        let side_pending = mem::take(&mut self.side_pending);
        let side = if side_pending.is_empty() { None } else { Some(side_pending) };
        Flush { text, side }
    }

    fn side_due(&self, now: Instant) -> bool {
        match self.last_side_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.side_interval,
        }
    }
}
