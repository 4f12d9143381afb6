use std::collections::VecDeque;

/// Bounded scrollback of decoded text lines for one terminal session.
///
/// Accepts already-decoded text chunks (the multiplexer does not interpret
/// escape sequences) and maintains an append-only sequence of logical lines.
/// When the line count exceeds `max_lines`, the oldest lines are discarded
/// and `base` advances, so line positions handed out to callers stay stable
/// as absolute indices even while the front of the buffer is trimmed.
pub struct ScrollbackBuffer {
    lines: VecDeque<String>,
    /// Absolute index of `lines[0]`. Advances as old lines are trimmed.
    base: usize,
    /// Whether the last line is still unterminated (no trailing newline yet).
    open: bool,
    max_lines: usize,
    columns: u16,
    rows: u16,
}

impl ScrollbackBuffer {
    /// Create an empty buffer with the given line cap and geometry.
    pub fn new(max_lines: usize, columns: u16, rows: u16) -> Self {
        Self {
            lines: VecDeque::new(),
            base: 0,
            open: false,
            max_lines: max_lines.max(1),
            columns,
            rows,
        }
    }

    /// Append a chunk of text, splitting it into lines on `\n`.
    ///
    /// A chunk without a trailing newline leaves the last line open; the
    /// next chunk continues it. Carriage returns are dropped rather than
    /// interpreted.
    pub fn feed(&mut self, chunk: &str) {
        for piece in chunk.split_inclusive('\n') {
            let (text, terminated) = match piece.strip_suffix('\n') {
                Some(t) => (t, true),
                None => (piece, false),
            };
            let text: String = text.chars().filter(|&c| c != '\r').collect();
            if self.open {
                if let Some(last) = self.lines.back_mut() {
                    last.push_str(&text);
                }
            } else {
                self.lines.push_back(text);
            }
            self.open = !terminated;
        }
        self.trim_to(self.max_lines);
    }

    /// Append a full line, first closing any still-open line.
    ///
    /// Used for diagnostics (spawn failures, exit messages) so they never
    /// end up glued to partial process output.
    pub fn feed_line(&mut self, line: &str) {
        if self.open {
            self.open = false;
        }
        self.feed(line);
        if self.open {
            self.open = false;
        }
    }

    /// Total number of lines ever appended (including trimmed ones).
    pub fn end(&self) -> usize {
        self.base + self.lines.len()
    }

    /// Absolute index of the oldest retained line.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Number of lines currently retained.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Look up a retained line by absolute index.
    pub fn line(&self, abs: usize) -> Option<&str> {
        let idx = abs.checked_sub(self.base)?;
        self.lines.get(idx).map(|s| s.as_str())
    }

    /// Iterate retained lines with their absolute indices, oldest first.
    pub fn iter_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        let base = self.base;
        self.lines
            .iter()
            .enumerate()
            .map(move |(i, s)| (base + i, s.as_str()))
    }

    /// The full retained text. A terminated final line keeps its newline.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            out.push_str(line);
            if i + 1 < self.lines.len() || !self.open {
                out.push('\n');
            }
        }
        out
    }

    /// Text of the currently visible screen region (the last `rows` lines).
    pub fn visible_text(&self) -> String {
        let skip = self.lines.len().saturating_sub(self.rows as usize);
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate().skip(skip) {
            out.push_str(line);
            if i + 1 < self.lines.len() || !self.open {
                out.push('\n');
            }
        }
        out
    }

    /// Drop scrollback history, keeping only the visible screen region.
    pub fn truncate_to_visible(&mut self) {
        self.trim_to(self.rows as usize);
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Update geometry. Retained content is not reflowed.
    pub fn set_geometry(&mut self, columns: u16, rows: u16) {
        self.columns = columns;
        self.rows = rows;
    }

    fn trim_to(&mut self, keep: usize) {
        let keep = keep.max(1);
        while self.lines.len() > keep {
            self.lines.pop_front();
            self.base += 1;
        }
    }
}
