use serde::{Deserialize, Serialize};

/// Longest text fragment an anchor will store, in characters.
pub const MAX_FRAGMENT_CHARS: usize = 200;

/// Longest context string captured on either side of a selection, in characters.
pub const MAX_CONTEXT_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnchorError {
    #[error("anchor text fragment must not be empty")]
    EmptyFragment,
    #[error("invalid anchor line range {start}..={end} (lines are 1-based and start <= end)")]
    InvalidLineRange { start: usize, end: usize },
}

/// Where a comment points: a 1-based inclusive line range, the exact text
/// that was selected, and a little surrounding context for disambiguation.
///
/// Anchors are validated on construction and on deserialization, so an
/// `Anchor` value always has a non-empty fragment and `start_line <= end_line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawAnchor")]
pub struct Anchor {
    start_line: usize,
    end_line: usize,
    text_fragment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_after: Option<String>,
}

impl Anchor {
    /// Build an anchor, truncating the fragment to [`MAX_FRAGMENT_CHARS`].
    pub fn new(start_line: usize, end_line: usize, fragment: &str) -> Result<Self, AnchorError> {
        if start_line == 0 || start_line > end_line {
            return Err(AnchorError::InvalidLineRange {
                start: start_line,
                end: end_line,
            });
        }
        if fragment.is_empty() {
            return Err(AnchorError::EmptyFragment);
        }

        Ok(Self {
            start_line,
            end_line,
            text_fragment: head_chars(fragment, MAX_FRAGMENT_CHARS).to_string(),
            context_before: None,
            context_after: None,
        })
    }

    /// Attach disambiguation context. Empty strings are treated as absent.
    ///
    /// `before` keeps its last [`MAX_CONTEXT_CHARS`] characters (the text
    /// nearest the selection), `after` keeps its first.
    pub fn with_context(mut self, before: Option<&str>, after: Option<&str>) -> Self {
        self.context_before = before
            .filter(|s| !s.is_empty())
            .map(|s| tail_chars(s, MAX_CONTEXT_CHARS).to_string());
        self.context_after = after
            .filter(|s| !s.is_empty())
            .map(|s| head_chars(s, MAX_CONTEXT_CHARS).to_string());
        self
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn end_line(&self) -> usize {
        self.end_line
    }

    pub fn text_fragment(&self) -> &str {
        &self.text_fragment
    }

    pub fn context_before(&self) -> Option<&str> {
        self.context_before.as_deref()
    }

    pub fn context_after(&self) -> Option<&str> {
        self.context_after.as_deref()
    }

    /// Number of lines spanned by the anchor (always at least 1).
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// True iff `line` falls inside the anchor's inclusive line range.
    pub fn within_range(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    /// Same anchor moved so that it starts at `start_line`, keeping its span.
    pub(crate) fn moved_to(&self, start_line: usize) -> Self {
        let start_line = start_line.max(1);
        Self {
            start_line,
            end_line: start_line + self.line_count() - 1,
            ..self.clone()
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnchor {
    start_line: usize,
    end_line: usize,
    text_fragment: String,
    #[serde(default)]
    context_before: Option<String>,
    #[serde(default)]
    context_after: Option<String>,
}

impl TryFrom<RawAnchor> for Anchor {
    type Error = AnchorError;

    fn try_from(raw: RawAnchor) -> Result<Self, Self::Error> {
        Ok(Anchor::new(raw.start_line, raw.end_line, &raw.text_fragment)?
            .with_context(raw.context_before.as_deref(), raw.context_after.as_deref()))
    }
}

/// The first `max` characters of `s`.
pub(crate) fn head_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// The last `max` characters of `s`.
pub(crate) fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    match s.char_indices().nth(count - max) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
