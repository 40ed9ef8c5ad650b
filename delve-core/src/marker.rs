//! Reasoning-segment markers and the two-state scanner that tracks them.
//!
//! Models emit exploratory text inside a `<think>` … `</think>` pair. The
//! scanner walks a growing buffer and records which side of a marker the
//! buffer currently ends on, along with where the last marker of each kind
//! ended. It tolerates markers split across appends by holding back a tail
//! that could still be the prefix of a marker.

/// Opening marker of a reasoning segment.
pub const OPEN_MARKER: &str = "<think>";
/// Closing marker of a reasoning segment.
pub const CLOSE_MARKER: &str = "</think>";

/// Which side of a reasoning marker the scanned text ends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker seen, or the last marker seen was a closing one.
    #[default]
    Outside,
    /// The last marker seen was an opening one.
    Inside,
}

/// Incremental scanner over an append-only buffer.
#[derive(Debug, Clone, Default)]
pub struct MarkerScanner {
    state: MarkerState,
    cursor: usize,
    last_open_end: Option<usize>,
    last_close_start: Option<usize>,
    last_close_end: Option<usize>,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a complete text in one pass.
    pub fn scan(text: &str) -> Self {
        let mut scanner = Self::new();
        scanner.advance(text);
        scanner
    }

    pub fn state(&self) -> MarkerState {
        self.state
    }

    /// Byte offset just past the most recent opening marker.
    pub fn last_open_end(&self) -> Option<usize> {
        self.last_open_end
    }

    /// Byte offset of the start of the most recent closing marker.
    pub fn last_close_start(&self) -> Option<usize> {
        self.last_close_start
    }

    /// Byte offset just past the most recent closing marker.
    pub fn last_close_end(&self) -> Option<usize> {
        self.last_close_end
    }

    pub fn saw_marker(&self) -> bool {
        self.last_open_end.is_some() || self.last_close_end.is_some()
    }

    /// Consume whatever has been appended to `text` since the last call.
    ///
    /// `text` must be the same buffer on every call, only ever appended to.
    pub fn advance(&mut self, text: &str) {
        while self.cursor < text.len() {
            let rest = &text[self.cursor..];
            let open = rest.find(OPEN_MARKER);
            let close = rest.find(CLOSE_MARKER);

            match (open, close) {
                (Some(o), Some(c)) if c < o => self.on_close(c),
                (Some(o), _) => self.on_open(o),
                (None, Some(c)) => self.on_close(c),
                (None, None) => {
                    // Hold back a tail that may be the start of a split marker.
                    let hold = CLOSE_MARKER.len() - 1;
                    let mut next = text.len().saturating_sub(hold).max(self.cursor);
                    while !text.is_char_boundary(next) {
                        next -= 1;
                    }
                    self.cursor = next;
                    break;
                }
            }
        }
    }

    fn on_open(&mut self, offset: usize) {
        let end = self.cursor + offset + OPEN_MARKER.len();
        self.last_open_end = Some(end);
        self.state = MarkerState::Inside;
        self.cursor = end;
    }

    fn on_close(&mut self, offset: usize) {
        let start = self.cursor + offset;
        let end = start + CLOSE_MARKER.len();
        self.last_close_start = Some(start);
        self.last_close_end = Some(end);
        self.state = MarkerState::Outside;
        self.cursor = end;
    }
}
