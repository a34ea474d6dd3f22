use std::ops::Range;

use super::Anchor;
use super::anchor::{head_chars, tail_chars};
use crate::render::{NodeId, RenderTree};

/// How much rendered text either side of a candidate is compared against
/// an anchor's context, in characters.
pub const CONTEXT_WINDOW_CHARS: usize = 100;

/// An occurrence of an anchor's fragment inside one text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub node: NodeId,
    /// Byte range of the fragment within the node's text.
    pub range: Range<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// Position of the node in the document-order text node list.
    index: usize,
    node: NodeId,
    start: usize,
}

/// Find `anchor`'s text under `root`.
pub fn locate_anchor(tree: &RenderTree, root: NodeId, anchor: &Anchor) -> Option<TextMatch> {
    locate(
        tree,
        root,
        anchor.text_fragment(),
        anchor.context_before(),
        anchor.context_after(),
    )
}

/// Find `fragment` in a text node under `root` that no marker has claimed.
///
/// With a single occurrence that occurrence wins. With several, the first
/// one (in document order) whose surrounding rendered text contains both
/// context strings wins; if none does, the first occurrence is used.
/// Returns `None` only when the fragment does not occur at all.
pub fn locate(
    tree: &RenderTree,
    root: NodeId,
    fragment: &str,
    context_before: Option<&str>,
    context_after: Option<&str>,
) -> Option<TextMatch> {
    if fragment.is_empty() {
        return None;
    }

    let nodes = tree.text_nodes(root);
    let candidates: Vec<Candidate> = nodes
        .iter()
        .enumerate()
        .filter(|&(_, &node)| !tree.is_inside_marker(node))
        .flat_map(|(index, &node)| {
            let text = tree.text(node).unwrap_or_default();
            text.match_indices(fragment)
                .map(move |(start, _)| Candidate { index, node, start })
                .collect::<Vec<_>>()
        })
        .collect();

    let to_match = |c: &Candidate| TextMatch {
        node: c.node,
        range: c.start..c.start + fragment.len(),
    };

    match candidates.as_slice() {
        [] => {
            log::debug!("fragment {fragment:?} not found in current render");
            None
        }
        [only] => Some(to_match(only)),
        [first, ..] => {
            let before = context_before.map(normalize_whitespace).filter(|c| !c.is_empty());
            let after = context_after.map(normalize_whitespace).filter(|c| !c.is_empty());

            let chosen = candidates.iter().find(|c| {
                let before_ok = before.as_ref().is_none_or(|ctx| {
                    normalize_whitespace(&preceding_text(tree, &nodes, c)).contains(ctx.as_str())
                });
                let after_ok = after.as_ref().is_none_or(|ctx| {
                    normalize_whitespace(&following_text(tree, &nodes, c, fragment.len()))
                        .contains(ctx.as_str())
                });
                before_ok && after_ok
            });

            if chosen.is_none() {
                log::debug!(
                    "context did not single out one of {} occurrences of {fragment:?}; using the first",
                    candidates.len()
                );
            }
            Some(to_match(chosen.unwrap_or(first)))
        }
    }
}

/// Up to [`CONTEXT_WINDOW_CHARS`] of rendered text ending at the candidate.
fn preceding_text(tree: &RenderTree, nodes: &[NodeId], candidate: &Candidate) -> String {
    let own = tree.text(candidate.node).unwrap_or_default();
    let mut parts = vec![&own[..candidate.start]];
    let mut collected = parts[0].chars().count();
    let mut index = candidate.index;

    while collected < CONTEXT_WINDOW_CHARS && index > 0 {
        index -= 1;
        let text = tree.text(nodes[index]).unwrap_or_default();
        collected += text.chars().count();
        parts.push(text);
    }

    parts.reverse();
    let joined = parts.concat();
    tail_chars(&joined, CONTEXT_WINDOW_CHARS).to_string()
}

/// Up to [`CONTEXT_WINDOW_CHARS`] of rendered text starting after the match.
fn following_text(
    tree: &RenderTree,
    nodes: &[NodeId],
    candidate: &Candidate,
    fragment_len: usize,
) -> String {
    let own = tree.text(candidate.node).unwrap_or_default();
    let mut joined = own[candidate.start + fragment_len..].to_string();
    let mut index = candidate.index;

    while joined.chars().count() < CONTEXT_WINDOW_CHARS && index + 1 < nodes.len() {
        index += 1;
        joined.push_str(tree.text(nodes[index]).unwrap_or_default());
    }

    head_chars(&joined, CONTEXT_WINDOW_CHARS).to_string()
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
