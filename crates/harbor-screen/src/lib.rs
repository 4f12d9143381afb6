//! harbor-screen: display-buffer state for Harbor terminal sessions.
//!
//! This crate holds the text that a session has produced: a bounded
//! scrollback of decoded lines with geometry, visible-region extraction,
//! and substring search for highlight navigation. It deliberately does not
//! interpret escape sequences; rendering and emulation live elsewhere.
//!
//! # Architecture
//!
//! - [`ScrollbackBuffer`] — append-only bounded line storage with absolute
//!   line indexing that stays stable as old content is trimmed.
//! - [`find_matches`] / [`SearchCursor`] — search over the live buffer with
//!   next/previous wraparound navigation.

pub mod buffer;
pub mod search;

pub use buffer::ScrollbackBuffer;
pub use search::{find_matches, SearchCursor, SearchMatch};
