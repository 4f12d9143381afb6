//! harbor-mux: terminal session multiplexing for Harbor.
//!
//! Manages multiple concurrent PTY-backed command sessions: lifecycle,
//! output streaming with backpressure, geometry synchronization, idle
//! memory bounding, and orphan-free teardown. Rendering and escape-sequence
//! interpretation live outside this crate; sessions hold their output in a
//! `harbor-screen` scrollback buffer.
//!
//! # Architecture
//!
//! - [`PtyHandle`] — one OS process bound to a PTY (spawn, read, write,
//!   resize, best-effort kill).
//! - [`SessionRegistry`] — owns the map of all sessions; two-phase spawn
//!   (record first, process once geometry is known), kill / kill_all with
//!   kill-before-removal, idle sweep, debounced resize, search.
//! - [`drivers`] — per-session blocking I/O threads plus the shared
//!   maintenance pump on tokio.
//! - [`SessionObserver`] — outbound callbacks (terminal status, rate-limited
//!   output copy, removal) consumed by the surrounding application.

pub mod config;
pub mod drivers;
pub mod events;
mod flush;
pub mod pty;
pub mod registry;
mod resize;
pub mod session;

pub use config::{
    EnvResolver, InheritEnv, MemorySettings, RegistryConfig, SettingsStore, SETTING_TERMINAL_ROWS,
};
pub use drivers::start_maintenance;
pub use events::{NullObserver, SessionObserver};
pub use pty::{PtyError, PtyHandle};
pub use registry::{SessionRegistry, SpawnRequest};
pub use session::{Dimensions, SessionId, SessionSnapshot, SessionStatus};
