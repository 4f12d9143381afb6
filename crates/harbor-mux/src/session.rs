use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use harbor_screen::ScrollbackBuffer;

use crate::flush::FlushScheduler;
use crate::pty::PtyHandle;

/// Unique identifier for a terminal session.
pub type SessionId = u64;

/// Lifecycle state of a session.
///
/// Transitions are one-directional: `PendingSpawn` to `Running` to either
/// terminal state (`PendingSpawn` may go straight to `Failed` when the
/// process cannot be started). Terminal states never revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    PendingSpawn,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub columns: u16,
    pub rows: u16,
}

/// What to run, captured at spawn-request time and consumed when the
/// display surface reports real geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// Read-only copy of a session's metadata, safe to hand across the
/// registry boundary.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub display_name: String,
    pub working_dir: PathBuf,
    pub owner_label: Option<String>,
    pub status: SessionStatus,
    pub exit_code: Option<u32>,
    pub dimensions: Dimensions,
}

/// One terminal session: identity, status machine, owned scrollback,
/// pending-output accumulator, and (while `Running`) the PTY handle.
pub(crate) struct Session {
    pub id: SessionId,
    pub display_name: String,
    pub working_dir: PathBuf,
    pub owner_label: Option<String>,
    status: SessionStatus,
    exit_code: Option<u32>,
    dimensions: Dimensions,
    last_activity: Instant,
    pub buffer: ScrollbackBuffer,
    pub flush: FlushScheduler,
    /// Present only while `Running`. Exactly one per session.
    pub pty: Option<PtyHandle>,
    /// Held until the deferred start consumes it.
    spec: Option<SpawnSpec>,
}

impl Session {
    pub fn new(
        id: SessionId,
        spec: SpawnSpec,
        display_name: String,
        owner_label: Option<String>,
        dimensions: Dimensions,
        scrollback_limit: usize,
        side_channel_interval: Duration,
    ) -> Self {
        let working_dir = spec.working_dir.clone();
        Self {
            id,
            display_name,
            working_dir,
            owner_label,
            status: SessionStatus::PendingSpawn,
            exit_code: None,
            dimensions,
            last_activity: Instant::now(),
            buffer: ScrollbackBuffer::new(scrollback_limit, dimensions.columns, dimensions.rows),
            flush: FlushScheduler::new(side_channel_interval),
            pty: None,
            spec: Some(spec),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Take the stored spawn spec for the deferred start. Returns `None`
    /// once consumed.
    pub fn take_spec(&mut self) -> Option<SpawnSpec> {
        self.spec.take()
    }

    /// Attach the started process handle: `PendingSpawn -> Running`.
    pub fn mark_running(&mut self, pty: PtyHandle) {
        if self.status != SessionStatus::PendingSpawn {
            log::warn!("session {}: mark_running in state {:?} ignored", self.id, self.status);
            return;
        }
        self.status = SessionStatus::Running;
        self.pty = Some(pty);
        self.last_activity = Instant::now();
    }

    /// Record the terminal transition. Returns `false` if the session was
    /// already terminal (the transition, and its callback, happen once).
    pub fn finish(&mut self, code: Option<u32>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = match code {
            Some(0) => SessionStatus::Completed,
            _ => SessionStatus::Failed,
        };
        self.exit_code = code;
        self.pty = None;
        true
    }

    /// Note output activity at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// How long the session has been without output, as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Store new geometry and mirror it into the buffer. Forwarding to the
    /// PTY (when one exists) is the registry's job.
    pub fn set_dimensions(&mut self, dimensions: Dimensions) {
        self.dimensions = dimensions;
        self.buffer.set_geometry(dimensions.columns, dimensions.rows);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            display_name: self.display_name.clone(),
            working_dir: self.working_dir.clone(),
            owner_label: self.owner_label.clone(),
            status: self.status,
            exit_code: self.exit_code,
            dimensions: self.dimensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> Session {
        Session::new(
            7,
            SpawnSpec {
                command: "true".to_string(),
                args: Vec::new(),
                working_dir: PathBuf::from("/tmp"),
            },
            "t".to_string(),
            None,
            Dimensions { columns: 80, rows: 24 },
            1000,
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_new_session_is_pending() {
        let session = test_session();
        assert_eq!(session.status(), SessionStatus::PendingSpawn);
        assert_eq!(session.exit_code(), None);
        assert!(session.pty.is_none());
    }

    #[test]
    fn test_finish_maps_exit_codes() {
        let mut ok = test_session();
        assert!(ok.finish(Some(0)));
        assert_eq!(ok.status(), SessionStatus::Completed);
        assert_eq!(ok.exit_code(), Some(0));

        let mut bad = test_session();
        assert!(bad.finish(Some(1)));
        assert_eq!(bad.status(), SessionStatus::Failed);
        assert_eq!(bad.exit_code(), Some(1));

        let mut unknown = test_session();
        assert!(unknown.finish(None));
        assert_eq!(unknown.status(), SessionStatus::Failed);
    }

    #[test]
    fn test_terminal_state_never_reverts() {
        let mut session = test_session();
        assert!(session.finish(Some(0)));
        // A second exit report is ignored and does not rewrite the code.
        assert!(!session.finish(Some(1)));
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.exit_code(), Some(0));
    }

    #[test]
    fn test_spec_consumed_once() {
        let mut session = test_session();
        assert!(session.take_spec().is_some());
        assert!(session.take_spec().is_none());
    }

    #[test]
    fn test_set_dimensions_updates_buffer_geometry() {
        let mut session = test_session();
        session.set_dimensions(Dimensions { columns: 120, rows: 40 });
        assert_eq!(session.buffer.rows(), 40);
        assert_eq!(session.buffer.columns(), 120);
    }

    #[test]
    fn test_idle_for() {
        let mut session = test_session();
        let now = Instant::now();
        session.touch(now);
        assert_eq!(session.idle_for(now + Duration::from_secs(90)), Duration::from_secs(90));
    }
}
