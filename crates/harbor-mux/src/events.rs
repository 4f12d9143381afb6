use crate::session::{SessionId, SessionStatus};

/// Outbound notifications from the registry to the surrounding application.
///
/// Implementations must be cheap and non-blocking; they are invoked from
/// the registry's own call paths after its lock is released, so calling
/// back into the registry from an observer method is allowed.
pub trait SessionObserver: Send + Sync {
    /// Invoked exactly once per terminal transition (`Completed`/`Failed`).
    fn status_changed(&self, _id: SessionId, _status: SessionStatus, _exit_code: Option<u32>) {}

    /// Rate-limited copy of session output, for status/port scanners and
    /// badge state. Not a render feed.
    fn output(&self, _id: SessionId, _chunk: &str) {}

    /// Fired once a session is fully torn down and out of the registry.
    fn session_removed(&self, _id: SessionId) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl SessionObserver for NullObserver {}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every callback for assertions, in arrival order.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub statuses: Mutex<Vec<(SessionId, SessionStatus, Option<u32>)>>,
        pub outputs: Mutex<Vec<(SessionId, String)>>,
        pub removed: Mutex<Vec<SessionId>>,
    }

    impl SessionObserver for RecordingObserver {
        fn status_changed(&self, id: SessionId, status: SessionStatus, exit_code: Option<u32>) {
            self.statuses.lock().unwrap().push((id, status, exit_code));
        }

        fn output(&self, id: SessionId, chunk: &str) {
            self.outputs.lock().unwrap().push((id, chunk.to_string()));
        }

        fn session_removed(&self, id: SessionId) {
            self.removed.lock().unwrap().push(id);
        }
    }
}
