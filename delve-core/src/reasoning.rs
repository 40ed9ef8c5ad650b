//! Reasoning stripper — removes a `<think>` segment from an assembled response.
//!
//! Pure text transformation. The output is always trimmed and never contains
//! a marker, which makes stripping idempotent.

use crate::marker::{MarkerScanner, MarkerState};
use crate::stream::AssembledText;
use tracing::warn;

/// Which rule produced the stripped answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripPath {
    /// No markers at all.
    NoMarkers,
    /// The final segment was closed; the answer follows the last closing marker.
    Closed,
    /// Unterminated segment; the answer starts at the first `{` after the opener.
    UnterminatedPayload,
    /// Unterminated segment without a payload; guessed from the first blank line.
    UnterminatedBlankLine,
    /// Unterminated segment with neither a payload nor a blank line.
    UnterminatedRaw,
}

impl StripPath {
    /// Paths that rely on guessing where reasoning stops.
    pub fn is_lossy(self) -> bool {
        matches!(
            self,
            StripPath::UnterminatedBlankLine | StripPath::UnterminatedRaw
        )
    }
}

/// The answer left after stripping, plus the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped<'a> {
    pub answer: &'a str,
    pub path: StripPath,
}

/// Strip reasoning and return just the answer text.
pub fn strip(text: &str) -> &str {
    strip_with_path(text).answer
}

/// Strip reasoning, reporting which rule was applied.
pub fn strip_with_path(text: &str) -> Stripped<'_> {
    let scanner = MarkerScanner::scan(text);

    match scanner.state() {
        MarkerState::Outside => match scanner.last_close_end() {
            Some(end) => Stripped {
                answer: text[end..].trim(),
                path: StripPath::Closed,
            },
            None => Stripped {
                answer: text.trim(),
                path: StripPath::NoMarkers,
            },
        },
        MarkerState::Inside => {
            let start = scanner.last_open_end().unwrap_or(0);
            let stripped = recover_unterminated(&text[start..]);
            if stripped.path.is_lossy() {
                warn!(
                    path = ?stripped.path,
                    "Reasoning segment never closed; answer boundary is a guess"
                );
            }
            stripped
        }
    }
}

/// Strip an assembled stream buffer.
///
/// When the model itself left its segment open, the accumulator's closing
/// marker hides any payload inside it. An empty answer is then recomputed
/// from the buffer as the model left it.
pub fn strip_assembled(text: &AssembledText) -> Stripped<'_> {
    let stripped = strip_with_path(text.as_str());
    if !stripped.answer.is_empty() {
        return stripped;
    }
    match text.unterminated_source() {
        Some(source) => {
            let recovered = strip_with_path(source);
            if !recovered.answer.is_empty() {
                warn!(
                    path = ?recovered.path,
                    "Recovered answer from an unterminated reasoning segment"
                );
            }
            recovered
        }
        None => stripped,
    }
}

fn recover_unterminated(remainder: &str) -> Stripped<'_> {
    if let Some(brace) = remainder.find('{') {
        return Stripped {
            answer: remainder[brace..].trim(),
            path: StripPath::UnterminatedPayload,
        };
    }
    if let Some(blank) = remainder.find("\n\n") {
        return Stripped {
            answer: remainder[blank..].trim(),
            path: StripPath::UnterminatedBlankLine,
        };
    }
    Stripped {
        answer: remainder.trim(),
        path: StripPath::UnterminatedRaw,
    }
}
