use std::collections::HashMap;

use super::{Comment, CommentId};

/// A top-level comment with its replies, assembled at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentThread {
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

/// Project a flat comment list into threads.
///
/// Threads and replies are ordered by `created_at`. A reply to a reply is
/// attached to the top-level comment at the root of its chain; a reply whose
/// parent is missing is shown as a top-level comment of its own.
pub fn build_threads(comments: &[Comment]) -> Vec<CommentThread> {
    let by_id: HashMap<CommentId, &Comment> = comments.iter().map(|c| (c.id, c)).collect();

    let mut top_level: Vec<&Comment> = Vec::new();
    let mut replies: HashMap<CommentId, Vec<&Comment>> = HashMap::new();

    for comment in comments {
        match thread_root(comment, &by_id) {
            Some(root) if root != comment.id => replies.entry(root).or_default().push(comment),
            _ => top_level.push(comment),
        }
    }

    top_level.sort_by_key(|c| (c.created_at, c.id));

    top_level
        .into_iter()
        .map(|comment| {
            let mut children = replies.remove(&comment.id).unwrap_or_default();
            children.sort_by_key(|c| (c.created_at, c.id));
            CommentThread {
                comment: comment.clone(),
                replies: children.into_iter().cloned().collect(),
            }
        })
        .collect()
}

/// Follow `parent_id` links to the top-level ancestor. Returns `None` when
/// a link dangles or the chain loops.
fn thread_root(comment: &Comment, by_id: &HashMap<CommentId, &Comment>) -> Option<CommentId> {
    let mut current = comment;
    for _ in 0..=by_id.len() {
        match current.parent_id {
            None => return Some(current.id),
            Some(parent) => current = *by_id.get(&parent)?,
        }
    }
    None
}

/// `id` followed by the ids of its direct replies: what a delete removes.
pub fn cascade_ids(comments: &[Comment], id: CommentId) -> Vec<CommentId> {
    std::iter::once(id)
        .chain(
            comments
                .iter()
                .filter(|c| c.parent_id == Some(id))
                .map(|c| c.id),
        )
        .collect()
}
