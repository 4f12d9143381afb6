//! Async drivers around the synchronous registry core.
//!
//! Each running session gets a dedicated OS thread for blocking PTY reads;
//! the thread feeds chunks into the registry and reports exit when the
//! reader closes. One shared maintenance task on the tokio runtime drives
//! the coalesced flush tick, the debounced resize tick, and the periodic
//! idle sweep. The registry's own operations never block on any of this:
//! kill and kill_all work even if no driver is running.

use std::io::Read;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::registry::{PollExit, SessionRegistry};
use crate::session::SessionId;

/// How long after PTY EOF to keep polling for the child's exit status.
const REAP_DEADLINE: Duration = Duration::from_secs(5);

/// Start the blocking read loop for one session on a dedicated OS thread.
///
/// The reader was extracted from the PTY handle before the session went
/// behind the registry lock, so reads block only this thread. The loop ends
/// on EOF or read error (PTY closed), after which the child is reaped and
/// the exit reported.
pub(crate) fn start_io_thread(
    registry: SessionRegistry,
    id: SessionId,
    mut reader: Box<dyn Read + Send>,
) {
    std::thread::Builder::new()
        .name(format!("pty-io-{id}"))
        .spawn(move || {
            let mut buf = [0u8; 65536];
            let mut partial = Vec::new();
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(_) => break,
                };
                // A multibyte character may be split across reads; the
                // incomplete tail waits in `partial` for the next read.
                let text = decode_utf8(&mut partial, &buf[..n]);
                if !text.is_empty() {
                    registry.handle_output(id, &text);
                }
            }
            if !partial.is_empty() {
                // EOF mid-character: nothing more is coming to finish it.
                registry.handle_output(id, &String::from_utf8_lossy(&partial));
            }
            reap(&registry, id);
        })
        .expect("failed to spawn I/O thread");
}

/// Decode `input` as UTF-8, carrying an incomplete trailing character over
/// in `partial` instead of mangling it into replacement characters.
/// Genuinely invalid bytes still decode to U+FFFD.
fn decode_utf8(partial: &mut Vec<u8>, input: &[u8]) -> String {
    partial.extend_from_slice(input);
    let buf = std::mem::take(partial);
    let mut out = String::with_capacity(buf.len());
    let mut rest: &[u8] = &buf;
    loop {
        match std::str::from_utf8(rest) {
            Ok(s) => {
                out.push_str(s);
                rest = &[];
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                if let Ok(s) = std::str::from_utf8(&rest[..valid]) {
                    out.push_str(s);
                }
                match e.error_len() {
                    Some(len) => {
                        out.push('\u{FFFD}');
                        rest = &rest[valid + len..];
                    }
                    None => {
                        // Truncated character at the end of the read.
                        rest = &rest[valid..];
                        break;
                    }
                }
            }
        }
    }
    *partial = rest.to_vec();
    out
}

fn reap(registry: &SessionRegistry, id: SessionId) {
    let deadline = Instant::now() + REAP_DEADLINE;
    loop {
        match registry.poll_exit(id) {
            // Killed and removed, or exit already handled; nothing to do.
            PollExit::Gone => return,
            PollExit::Exited(code) => {
                registry.handle_exit(id, code);
                return;
            }
            PollExit::Running => {
                if Instant::now() > deadline {
                    // The child closed its PTY but keeps running (likely
                    // daemonized). Leave the session Running; the idle
                    // sweep bounds its buffer from here on.
                    log::warn!("session {id}: PTY closed but child still running");
                    return;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

/// Start the shared maintenance task.
///
/// Runs on the tokio runtime. The pump interval drives coalesced flushes
/// and debounced resizes at the visual refresh cadence; the sweep interval
/// drives idle scrollback trimming. Send on the stop channel (or drop the
/// sender) to end the task.
pub fn start_maintenance(registry: SessionRegistry, mut stop_rx: mpsc::Receiver<()>) {
    tokio::spawn(async move {
        let mut pump = tokio::time::interval(registry.config().flush_interval);
        pump.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut sweep = tokio::time::interval(registry.config().sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = pump.tick() => {
                    let now = Instant::now();
                    registry.flush_tick(now);
                    registry.resize_tick(now);
                }
                _ = sweep.tick() => {
                    registry.sweep_idle(Instant::now());
                }
                _ = stop_rx.recv() => return,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::config::RegistryConfig;
    use crate::events::NullObserver;
    use crate::registry::SpawnRequest;
    use crate::session::SessionStatus;

    fn request(command: &str, args: &[&str]) -> SpawnRequest {
        SpawnRequest {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir: PathBuf::from("/tmp"),
            display_name: "t".to_string(),
            owner_label: None,
        }
    }

    #[test]
    fn test_decode_reassembles_character_split_across_reads() {
        let bytes = "größe → ok\n".as_bytes();
        let mut partial = Vec::new();
        let mut out = String::new();
        // Feed one byte at a time, the worst possible read boundary.
        for &b in bytes {
            out.push_str(&decode_utf8(&mut partial, &[b]));
        }
        assert_eq!(out, "größe → ok\n");
        assert!(partial.is_empty());
        assert!(!out.contains('\u{FFFD}'));
    }

    #[test]
    fn test_decode_holds_incomplete_tail() {
        let bytes = "é".as_bytes(); // two bytes
        let mut partial = Vec::new();
        assert_eq!(decode_utf8(&mut partial, &bytes[..1]), "");
        assert_eq!(partial, &bytes[..1]);
        assert_eq!(decode_utf8(&mut partial, &bytes[1..]), "é");
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_replaces_invalid_bytes() {
        let mut partial = Vec::new();
        let out = decode_utf8(&mut partial, &[b'a', 0xFF, b'b']);
        assert_eq!(out, "a\u{FFFD}b");
        assert!(partial.is_empty());
    }

    #[tokio::test]
    async fn test_maintenance_pump_applies_flushes() {
        let registry = SessionRegistry::new(RegistryConfig::default(), Arc::new(NullObserver));
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        start_maintenance(registry.clone(), stop_rx);

        let id = registry.spawn(request("/bin/true", &[]));
        registry.handle_output(id, "pumped\n");

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if registry.buffer_text(id).unwrap_or_default() == "pumped\n" {
                break;
            }
            assert!(Instant::now() < deadline, "pump never applied the flush");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let _ = stop_tx.send(()).await;
    }

    #[tokio::test]
    async fn test_full_session_lifecycle_through_drivers() {
        let registry = SessionRegistry::new(RegistryConfig::default(), Arc::new(NullObserver));
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        start_maintenance(registry.clone(), stop_rx);

        let id = registry.spawn(request("/bin/sh", &["-c", "echo driver_ok"]));
        registry.surface_ready(id, 80, 24);

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let snap = registry.get(id).expect("session present");
            if snap.status.is_terminal() {
                assert_eq!(snap.status, SessionStatus::Completed);
                assert_eq!(snap.exit_code, Some(0));
                break;
            }
            assert!(Instant::now() < deadline, "session never exited");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(registry.buffer_text(id).unwrap().contains("driver_ok"));
        let _ = stop_tx.send(()).await;
    }

    #[tokio::test]
    async fn test_stop_channel_ends_pump() {
        let registry = SessionRegistry::new(RegistryConfig::default(), Arc::new(NullObserver));
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        start_maintenance(registry.clone(), stop_rx);

        stop_tx.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Pump is gone; pending output stays unflushed.
        let id = registry.spawn(request("/bin/true", &[]));
        registry.handle_output(id, "never applied");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.buffer_text(id).unwrap(), "");
    }
}
