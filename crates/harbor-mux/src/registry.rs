use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use harbor_screen::{find_matches, SearchMatch};

use crate::config::{RegistryConfig, SETTING_TERMINAL_ROWS};
use crate::drivers;
use crate::events::SessionObserver;
use crate::pty::{PtyError, PtyHandle};
use crate::resize::ResizeCoordinator;
use crate::session::{
    Dimensions, Session, SessionId, SessionSnapshot, SessionStatus, SpawnSpec,
};

/// A request to start a new terminal session.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub display_name: String,
    pub owner_label: Option<String>,
}

struct RegistryInner {
    sessions: HashMap<SessionId, Session>,
    /// Insertion order. Drives `list` ordering and active-selection
    /// fallback after a kill.
    order: Vec<SessionId>,
    active: Option<SessionId>,
    resize: ResizeCoordinator,
}

/// Callbacks queued under the registry lock and delivered after it drops,
/// so observers may call back into the registry.
enum Outbound {
    Status(SessionId, SessionStatus, Option<u32>),
    Output(SessionId, String),
    Removed(SessionId),
}

/// Result of checking a session's child process for exit.
pub(crate) enum PollExit {
    /// Session killed/removed or already terminal; stop watching.
    Gone,
    Running,
    Exited(u32),
}

/// Owns the map of all terminal sessions.
///
/// All mutation funnels through one internal lock, held briefly and never
/// across blocking I/O. Cloning the registry clones a handle to the same
/// shared state; the per-session I/O threads and the maintenance pump each
/// hold one.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    observer: Arc<dyn SessionObserver>,
    config: Arc<RegistryConfig>,
    next_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new(mut config: RegistryConfig, observer: Arc<dyn SessionObserver>) -> Self {
        // Recover the persisted row count for sessions spawned before their
        // surface reports real geometry.
        if let Some(rows) = config
            .settings
            .get(SETTING_TERMINAL_ROWS)
            .and_then(|v| v.parse().ok())
        {
            config.default_dimensions.rows = rows;
        }
        let resize = ResizeCoordinator::new(config.resize_debounce);
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                sessions: HashMap::new(),
                order: Vec::new(),
                active: None,
                resize,
            })),
            observer,
            config: Arc::new(config),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create a session record and return its id immediately.
    ///
    /// The OS process does not start here; it starts when the session's
    /// display surface first reports concrete geometry (`surface_ready`).
    /// Never blocks and never fails.
    pub fn spawn(&self, request: SpawnRequest) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let spec = SpawnSpec {
            command: request.command,
            args: request.args,
            working_dir: request.working_dir,
        };
        log::debug!("session {id}: spawn requested ({})", spec.command);
        let session = Session::new(
            id,
            spec,
            request.display_name,
            request.owner_label,
            self.config.default_dimensions,
            self.config.scrollback_limit,
            self.config.side_channel_interval,
        );
        if let Ok(mut inner) = self.inner.lock() {
            inner.sessions.insert(id, session);
            inner.order.push(id);
            inner.active = Some(id);
        }
        id
    }

    /// Second phase of the deferred spawn: the display surface has real
    /// geometry, so the OS process can start without a guessed size.
    ///
    /// A spawn failure never reaches the caller; it becomes a diagnostic
    /// line in the buffer plus a `Failed` transition.
    pub fn surface_ready(&self, id: SessionId, columns: u16, rows: u16) {
        // Claim the pending spec under the lock; the spawn itself happens
        // outside it so other sessions keep flushing during openpty/fork.
        let spec = {
            let Ok(mut inner) = self.inner.lock() else { return };
            let Some(session) = inner.sessions.get_mut(&id) else { return };
            if session.status() != SessionStatus::PendingSpawn {
                return;
            }
            session.set_dimensions(Dimensions { columns, rows });
            let Some(spec) = session.take_spec() else { return };
            spec
        };

        let env = self.config.env.resolve();
        let spawned = PtyHandle::spawn(&spec, &env, columns, rows);

        let mut events = Vec::new();
        let reader = {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(_) => {
                    if let Ok(mut pty) = spawned {
                        pty.kill();
                    }
                    return;
                }
            };
            let Some(session) = inner.sessions.get_mut(&id) else {
                // Killed while the process was starting; don't orphan it.
                if let Ok(mut pty) = spawned {
                    pty.kill();
                }
                return;
            };
            match spawned {
                Ok(mut pty) => {
                    let reader = pty.take_reader();
                    session.mark_running(pty);
                    log::debug!("session {id}: process started ({columns}x{rows})");
                    reader
                }
                Err(e) => {
                    log::warn!("session {id}: spawn failed: {e}");
                    session
                        .buffer
                        .feed_line(&format!("harbor: failed to start {}: {e}", spec.command));
                    session.finish(None);
                    events.push(Outbound::Status(id, SessionStatus::Failed, None));
                    None
                }
            }
        };
        self.emit(events);
        if let Some(reader) = reader {
            drivers::start_io_thread(self.clone(), id, reader);
        }
    }

    /// Terminate one session and remove it from the registry.
    ///
    /// Idempotent: unknown ids are a no-op. The process handle (when
    /// present) is instructed to terminate before the record leaves the
    /// map, so no removal path can orphan a process; finished sessions
    /// have no handle and are simply removed. Fire-and-forget: the
    /// registry does not wait for the OS process to actually exit.
    pub fn kill(&self, id: SessionId) {
        let mut events = Vec::new();
        {
            // Recover a poisoned lock; teardown still has to terminate
            // children.
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let Some(session) = inner.sessions.get_mut(&id) else { return };
            if let Some(pty) = session.pty.as_mut() {
                pty.kill();
            }
            inner.sessions.remove(&id);
            inner.order.retain(|&other| other != id);
            if inner.active == Some(id) {
                inner.active = inner.order.last().copied();
            }
            events.push(Outbound::Removed(id));
            log::debug!("session {id}: killed and removed");
        }
        self.emit(events);
    }

    /// Terminate every session and clear the registry.
    ///
    /// Synchronous and callable from a shutdown path; it iterates a
    /// snapshot of the current ids and does not depend on any pending
    /// async callback cycle.
    pub fn kill_all(&self) {
        let mut events = Vec::new();
        {
            // Shutdown path: a poisoned lock must not skip child kills.
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let ids: Vec<SessionId> = inner.order.clone();
            for id in ids {
                if let Some(session) = inner.sessions.get_mut(&id) {
                    if let Some(pty) = session.pty.as_mut() {
                        pty.kill();
                    }
                    events.push(Outbound::Removed(id));
                }
            }
            inner.sessions.clear();
            inner.order.clear();
            inner.active = None;
            inner.resize.clear();
            log::debug!("kill_all: {} sessions removed", events.len());
        }
        self.emit(events);
    }

    /// Snapshots of all sessions, in creation order.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let Ok(inner) = self.inner.lock() else { return Vec::new() };
        inner
            .order
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            .map(Session::snapshot)
            .collect()
    }

    pub fn get(&self, id: SessionId) -> Option<SessionSnapshot> {
        let Ok(inner) = self.inner.lock() else { return None };
        inner.sessions.get(&id).map(Session::snapshot)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.sessions.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active(&self) -> Option<SessionId> {
        self.inner.lock().ok().and_then(|inner| inner.active)
    }

    /// Switch which session is displayed. Re-runs the fit pass so the
    /// surface never keeps stale geometry; scrollback is untouched.
    pub fn set_active(&self, id: SessionId) -> bool {
        let changed = {
            let Ok(mut inner) = self.inner.lock() else { return false };
            if inner.sessions.contains_key(&id) {
                inner.active = Some(id);
                true
            } else {
                false
            }
        };
        if changed {
            self.refit();
        }
        changed
    }

    /// Re-apply the active session's stored geometry to its PTY, for tab
    /// switches and container moves that reuse the display surface.
    pub fn refit(&self) {
        let Ok(mut inner) = self.inner.lock() else { return };
        let Some(active) = inner.active else { return };
        if let Some(session) = inner.sessions.get_mut(&active) {
            let d = session.dimensions();
            if let Some(pty) = session.pty.as_ref() {
                if let Err(e) = pty.resize(d.columns, d.rows) {
                    log::debug!("session {active}: refit resize ignored: {e}");
                }
            }
        }
    }

    /// Send user input to a session's process stdin.
    ///
    /// Unknown sessions and sessions without a process are a quiet no-op.
    pub fn write_input(&self, id: SessionId, data: &[u8]) -> Result<(), PtyError> {
        let Ok(mut inner) = self.inner.lock() else { return Ok(()) };
        let Some(session) = inner.sessions.get_mut(&id) else {
            log::debug!("session {id}: input dropped, session gone");
            return Ok(());
        };
        match session.pty.as_mut() {
            Some(pty) => pty.write(data),
            None => {
                log::debug!("session {id}: input dropped, no process attached");
                Ok(())
            }
        }
    }

    /// Full retained scrollback text of a session.
    pub fn buffer_text(&self, id: SessionId) -> Option<String> {
        let Ok(inner) = self.inner.lock() else { return None };
        inner.sessions.get(&id).map(|s| s.buffer.text())
    }

    /// Text of the currently visible screen region.
    pub fn visible_text(&self, id: SessionId) -> Option<String> {
        let Ok(inner) = self.inner.lock() else { return None };
        inner.sessions.get(&id).map(|s| s.buffer.visible_text())
    }

    /// Search the session's live scrollback. Positions are absolute line
    /// indices plus byte ranges, for external highlight rendering.
    pub fn search(&self, id: SessionId, query: &str) -> Vec<SearchMatch> {
        let Ok(inner) = self.inner.lock() else { return Vec::new() };
        inner
            .sessions
            .get(&id)
            .map(|s| find_matches(&s.buffer, query))
            .unwrap_or_default()
    }

    /// Record a viewport geometry observation; applied debounced.
    pub fn request_resize(&self, columns: u16, rows: u16, now: Instant) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.resize.observe(Dimensions { columns, rows }, now);
        }
    }

    /// Apply a settled resize to the active session: update the record,
    /// forward to the PTY when one exists (stored for later when not),
    /// persist the row count.
    pub fn resize_tick(&self, now: Instant) {
        let applied_rows = {
            let Ok(mut inner) = self.inner.lock() else { return };
            let Some(dimensions) = inner.resize.take_due(now) else { return };
            let Some(active) = inner.active else { return };
            let Some(session) = inner.sessions.get_mut(&active) else { return };
            session.set_dimensions(dimensions);
            if let Some(pty) = session.pty.as_ref() {
                // Geometry mismatch degrades display, never correctness.
                if let Err(e) = pty.resize(dimensions.columns, dimensions.rows) {
                    log::debug!("session {active}: resize ignored: {e}");
                }
            }
            dimensions.rows
        };
        // The store is an external collaborator; it may block on persistence
        // or call back into the registry, so it runs after the lock drops.
        self.config
            .settings
            .set(SETTING_TERMINAL_ROWS, &applied_rows.to_string());
    }

    /// Inbound process output, called from the session's I/O thread.
    /// Chunks for a session no longer in the map are discarded, which is
    /// how output racing a kill is dropped rather than applied.
    pub(crate) fn handle_output(&self, id: SessionId, chunk: &str) {
        let Ok(mut inner) = self.inner.lock() else { return };
        match inner.sessions.get_mut(&id) {
            Some(session) => {
                session.touch(Instant::now());
                session.flush.push(chunk);
            }
            None => log::trace!("session {id}: discarding output for disposed session"),
        }
    }

    /// Apply due coalesced flushes for every session and forward the
    /// rate-limited side-channel copies to the output observer.
    pub fn flush_tick(&self, now: Instant) {
        let mut events = Vec::new();
        {
            let Ok(mut inner) = self.inner.lock() else { return };
            for (id, session) in inner.sessions.iter_mut() {
                if let Some(flush) = session.flush.take(now) {
                    if !flush.text.is_empty() {
                        session.buffer.feed(&flush.text);
                    }
                    if let Some(side) = flush.side {
                        events.push(Outbound::Output(*id, side));
                    }
                }
            }
        }
        self.emit(events);
    }

    /// Process exit: flush still-pending output synchronously, then append
    /// the exit message and take the terminal transition. The status
    /// callback fires exactly once.
    pub(crate) fn handle_exit(&self, id: SessionId, code: u32) {
        let mut events = Vec::new();
        {
            let Ok(mut inner) = self.inner.lock() else { return };
            let Some(session) = inner.sessions.get_mut(&id) else { return };
            if session.status().is_terminal() {
                return;
            }
            if session.flush.has_pending() {
                let last = session.flush.drain();
                if !last.text.is_empty() {
                    session.buffer.feed(&last.text);
                }
                if let Some(side) = last.side {
                    events.push(Outbound::Output(id, side));
                }
            }
            session
                .buffer
                .feed_line(&format!("[process exited with code {code}]"));
            if session.finish(Some(code)) {
                events.push(Outbound::Status(id, session.status(), session.exit_code()));
            }
            log::debug!("session {id}: exited with code {code}");
        }
        self.emit(events);
    }

    /// Trim scrollback on long-idle `Running` sessions down to the visible
    /// screen, then restart their idle clock. Sessions in any other status
    /// are never touched.
    pub fn sweep_idle(&self, now: Instant) {
        let Ok(mut inner) = self.inner.lock() else { return };
        for session in inner.sessions.values_mut() {
            if session.status() != SessionStatus::Running {
                continue;
            }
            if session.idle_for(now) < self.config.idle_threshold {
                continue;
            }
            let before = session.buffer.len();
            session.buffer.truncate_to_visible();
            session.touch(now);
            log::debug!(
                "session {}: idle trim {} -> {} lines",
                session.id,
                before,
                session.buffer.len()
            );
        }
    }

    /// Non-blocking check of a session's child, for the I/O thread after
    /// the PTY reader reaches EOF.
    pub(crate) fn poll_exit(&self, id: SessionId) -> PollExit {
        let Ok(mut inner) = self.inner.lock() else { return PollExit::Gone };
        let Some(session) = inner.sessions.get_mut(&id) else { return PollExit::Gone };
        if session.status().is_terminal() {
            return PollExit::Gone;
        }
        match session.pty.as_mut() {
            Some(pty) => match pty.try_wait() {
                Some(code) => PollExit::Exited(code),
                None => PollExit::Running,
            },
            None => PollExit::Gone,
        }
    }

    fn emit(&self, events: Vec<Outbound>) {
        for event in events {
            match event {
                Outbound::Status(id, status, code) => {
                    self.observer.status_changed(id, status, code)
                }
                Outbound::Output(id, chunk) => self.observer.output(id, &chunk),
                Outbound::Removed(id) => self.observer.session_removed(id),
            }
        }
    }
}
