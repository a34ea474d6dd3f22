use super::Anchor;

/// How far above and below the old position to look before scanning the
/// whole document.
pub const NEARBY_SEARCH_LINES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    /// The fragment is still inside the anchor's line range.
    Unchanged,
    /// The fragment now starts at a different line.
    Moved(Anchor),
    /// The fragment is gone from the document.
    Orphaned,
}

/// Re-anchor against a new version of the document text.
pub fn relocate_anchor(anchor: &Anchor, new_text: &str) -> Relocation {
    let lines: Vec<&str> = new_text.lines().collect();
    match relocate(anchor, &lines) {
        Some(line) if line == anchor.start_line() => Relocation::Unchanged,
        Some(line) => Relocation::Moved(anchor.moved_to(line)),
        None => Relocation::Orphaned,
    }
}

/// Best-effort new start line for `anchor` in `new_lines`.
///
/// Tries, in order: the old line range; single positions at increasing
/// distance from the old start (above before below, up to
/// [`NEARBY_SEARCH_LINES`]); then every line from the top. Outside the old
/// range a position matches when the fragment begins on that line; the
/// anchor's span of following lines is joined with `\n` so multi-line
/// fragments can be found too.
pub fn relocate<S: AsRef<str>>(anchor: &Anchor, new_lines: &[S]) -> Option<usize> {
    let fragment = anchor.text_fragment();
    let span = anchor.line_count();

    let start = anchor.start_line();
    if window(new_lines, start, span).is_some_and(|(joined, _)| joined.contains(fragment)) {
        return Some(start);
    }

    let begins_at = |line: usize| -> bool {
        window(new_lines, line, span).is_some_and(|(joined, first_len)| {
            joined
                .match_indices(fragment)
                .any(|(index, _)| index <= first_len)
        })
    };

    for offset in 1..=NEARBY_SEARCH_LINES {
        if let Some(above) = start.checked_sub(offset)
            && begins_at(above)
        {
            return Some(above);
        }
        if begins_at(start + offset) {
            return Some(start + offset);
        }
    }

    let found = (1..=new_lines.len()).find(|&line| begins_at(line));
    if found.is_none() {
        log::debug!("anchor fragment {fragment:?} no longer present; anchor orphaned");
    }
    found
}

/// Lines `start..start+len` (1-based, clamped to the document) joined with
/// `\n`, plus the byte length of the first of them.
fn window<S: AsRef<str>>(lines: &[S], start: usize, len: usize) -> Option<(String, usize)> {
    if start == 0 || start > lines.len() {
        return None;
    }
    let end = (start + len.max(1) - 1).min(lines.len());
    let slice = &lines[start - 1..end];
    let first_len = slice[0].as_ref().len();
    let joined = slice
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join("\n");
    Some((joined, first_len))
}
