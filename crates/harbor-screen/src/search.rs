use serde::Serialize;

use crate::buffer::ScrollbackBuffer;

/// A single match position, expressed against the live buffer.
///
/// `line` is an absolute line index (stable across front-trimming) and
/// `start`/`len` are byte offsets within that line, suitable for external
/// highlight rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub line: usize,
    pub start: usize,
    pub len: usize,
}

/// Find all occurrences of `query` in the retained scrollback, oldest first.
///
/// The buffer may still be appending; positions returned here remain valid
/// for lines that have not been trimmed away. New content is picked up by
/// re-running the query, not by mutating previously returned matches.
pub fn find_matches(buffer: &ScrollbackBuffer, query: &str) -> Vec<SearchMatch> {
    if query.is_empty() {
        return Vec::new();
    }
    let mut matches = Vec::new();
    for (line, text) in buffer.iter_lines() {
        for (start, _) in text.match_indices(query) {
            matches.push(SearchMatch {
                line,
                start,
                len: query.len(),
            });
        }
    }
    matches
}

/// Navigates a fixed set of matches with next/previous wraparound.
pub struct SearchCursor {
    matches: Vec<SearchMatch>,
    pos: Option<usize>,
}

impl SearchCursor {
    pub fn new(matches: Vec<SearchMatch>) -> Self {
        Self { matches, pos: None }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The match the cursor currently rests on, if navigation has started.
    pub fn current(&self) -> Option<SearchMatch> {
        self.pos.map(|i| self.matches[i])
    }

    /// Advance to the next match, wrapping to the first after the last.
    pub fn next(&mut self) -> Option<SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        let next = match self.pos {
            Some(i) => (i + 1) % self.matches.len(),
            None => 0,
        };
        self.pos = Some(next);
        Some(self.matches[next])
    }

    /// Step to the previous match, wrapping to the last before the first.
    pub fn prev(&mut self) -> Option<SearchMatch> {
        if self.matches.is_empty() {
            return None;
        }
        let prev = match self.pos {
            Some(0) | None => self.matches.len() - 1,
            Some(i) => i - 1,
        };
        self.pos = Some(prev);
        Some(self.matches[prev])
    }
}
