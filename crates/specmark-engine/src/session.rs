use relative_path::{RelativePath, RelativePathBuf};

use crate::anchoring::{Anchor, Relocation, relocate_anchor};
use crate::comments::{
    Comment, CommentId, CommentThread, CommentUpdate, NewComment, build_threads,
};
use crate::store::{CommentStore, ConflictDescriptor, DocumentStore, StoreError};

/// A guarded write prepared by a session, to be carried out by the host
/// and handed back through [`DocumentSession::complete_save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub path: RelativePathBuf,
    pub content: String,
    pub expected_mtime: Option<i64>,
    pub force: bool,
    generation: u64,
}

impl WriteRequest {
    /// Run the write against `store`.
    pub fn execute<S: DocumentStore + ?Sized>(&self, store: &S) -> Result<i64, StoreError> {
        store.write_document(&self.path, &self.content, self.expected_mtime, self.force)
    }
}

/// What happened to the anchors after a save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationSummary {
    pub moved: Vec<CommentId>,
    /// Newly flagged as lost.
    pub orphaned: Vec<CommentId>,
    /// Previously lost, found again.
    pub restored: Vec<CommentId>,
}

impl RelocationSummary {
    pub fn is_empty(&self) -> bool {
        self.moved.is_empty() && self.orphaned.is_empty() && self.restored.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved {
        last_modified: i64,
        relocation: RelocationSummary,
    },
    /// The document changed underneath us. The user picks between
    /// [`DocumentSession::reload`] and saving again with `force`.
    Conflict(ConflictDescriptor),
    /// The result belongs to a request made before the session was
    /// reloaded; it was ignored.
    Stale,
}

/// One open document with its comments.
#[derive(Debug, Clone)]
pub struct DocumentSession {
    path: RelativePathBuf,
    content: String,
    last_modified: i64,
    comments: Vec<Comment>,
    generation: u64,
}

impl DocumentSession {
    pub fn open<S>(store: &S, path: &RelativePath) -> Result<Self, StoreError>
    where
        S: DocumentStore + CommentStore + ?Sized,
    {
        let path = path.normalize();
        let snapshot = store.read_document(&path)?;
        let comments = store.list_comments(&path)?;
        log::debug!("opened {path} with {} comment(s)", comments.len());

        Ok(Self {
            path,
            content: snapshot.content,
            last_modified: snapshot.last_modified,
            comments,
            generation: 0,
        })
    }

    pub fn path(&self) -> &RelativePath {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn last_modified(&self) -> i64 {
        self.last_modified
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Comments that are not hidden, in stored order.
    pub fn visible_comments(&self) -> Vec<&Comment> {
        self.comments
            .iter()
            .filter(|c| c.status.is_visible())
            .collect()
    }

    pub fn threads(&self) -> Vec<CommentThread> {
        build_threads(&self.comments)
    }

    pub fn save_request(&self, content: impl Into<String>, force: bool) -> WriteRequest {
        WriteRequest {
            path: self.path.clone(),
            content: content.into(),
            expected_mtime: Some(self.last_modified),
            force,
            generation: self.generation,
        }
    }

    /// Apply the result of a write made for `request`.
    ///
    /// On success the new text becomes current and every anchor is
    /// relocated against it. Errors other than a conflict are returned.
    pub fn complete_save<S>(
        &mut self,
        store: &S,
        request: &WriteRequest,
        result: Result<i64, StoreError>,
    ) -> Result<SaveOutcome, StoreError>
    where
        S: DocumentStore + CommentStore + ?Sized,
    {
        if request.generation != self.generation || request.path != self.path {
            log::debug!("ignoring stale save result for {}", request.path);
            return Ok(SaveOutcome::Stale);
        }

        let last_modified = match result {
            Ok(last_modified) => last_modified,
            Err(StoreError::Conflict(conflict)) => return Ok(SaveOutcome::Conflict(conflict)),
            Err(err) => return Err(err),
        };

        self.content.clone_from(&request.content);
        self.last_modified = last_modified;
        let relocation = self.relocate_comments(store)?;

        Ok(SaveOutcome::Saved {
            last_modified,
            relocation,
        })
    }

    /// Prepare, run and complete a save in one go.
    pub fn save<S>(
        &mut self,
        store: &S,
        content: impl Into<String>,
        force: bool,
    ) -> Result<SaveOutcome, StoreError>
    where
        S: DocumentStore + CommentStore + ?Sized,
    {
        let request = self.save_request(content, force);
        let result = request.execute(store);
        self.complete_save(store, &request, result)
    }

    /// Throw away local state and read the latest document and comments.
    /// Results of saves requested before this are ignored from now on.
    pub fn reload<S>(&mut self, store: &S) -> Result<(), StoreError>
    where
        S: DocumentStore + CommentStore + ?Sized,
    {
        let snapshot = store.read_document(&self.path)?;
        self.comments = store.list_comments(&self.path)?;
        self.content = snapshot.content;
        self.last_modified = snapshot.last_modified;
        self.generation += 1;
        Ok(())
    }

    /// Re-anchor every comment against the current text and persist the
    /// ones that changed.
    ///
    /// Orphaned anchors keep their last known range and are flagged
    /// `anchor_lost`; the flag clears once the text is found again.
    pub fn relocate_comments<S>(&mut self, store: &S) -> Result<RelocationSummary, StoreError>
    where
        S: CommentStore + ?Sized,
    {
        let mut comments = store.list_comments(&self.path)?;
        let mut summary = RelocationSummary::default();

        for comment in &mut comments {
            match relocate_anchor(&comment.anchor, &self.content) {
                Relocation::Unchanged => {}
                Relocation::Moved(anchor) => {
                    log::debug!(
                        "comment {} moved from line {} to {}",
                        comment.id,
                        comment.anchor.start_line(),
                        anchor.start_line()
                    );
                    comment.anchor = anchor;
                    summary.moved.push(comment.id);
                }
                Relocation::Orphaned => {
                    if !comment.anchor_lost {
                        log::warn!(
                            "comment {} lost its anchor {:?} in {}",
                            comment.id,
                            comment.anchor.text_fragment(),
                            self.path
                        );
                        comment.anchor_lost = true;
                        summary.orphaned.push(comment.id);
                    }
                    continue;
                }
            }
            if comment.anchor_lost {
                comment.anchor_lost = false;
                summary.restored.push(comment.id);
            }
        }

        if !summary.is_empty() {
            store.save_comments(&self.path, &comments)?;
        }
        self.comments = comments;
        Ok(summary)
    }

    pub fn add_comment<S>(
        &mut self,
        store: &S,
        anchor: Anchor,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Result<Comment, StoreError>
    where
        S: CommentStore + ?Sized,
    {
        let comment = store.add_comment(NewComment {
            document_path: self.path.clone(),
            anchor,
            content: content.into(),
            author: author.into(),
            parent_id: None,
        })?;
        self.refresh_comments(store)?;
        Ok(comment)
    }

    /// Reply in the thread of `parent`, sharing its anchor.
    pub fn reply<S>(
        &mut self,
        store: &S,
        parent: CommentId,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Result<Comment, StoreError>
    where
        S: CommentStore + ?Sized,
    {
        let anchor = self
            .comments
            .iter()
            .find(|c| c.id == parent)
            .map(|c| c.anchor.clone())
            .ok_or(StoreError::CommentNotFound(parent))?;
        let comment = store.add_comment(NewComment {
            document_path: self.path.clone(),
            anchor,
            content: content.into(),
            author: author.into(),
            parent_id: Some(parent),
        })?;
        self.refresh_comments(store)?;
        Ok(comment)
    }

    pub fn update_comment<S>(
        &mut self,
        store: &S,
        id: CommentId,
        update: &CommentUpdate,
    ) -> Result<Comment, StoreError>
    where
        S: CommentStore + ?Sized,
    {
        let comment = store.update_comment(&self.path, id, update)?;
        self.refresh_comments(store)?;
        Ok(comment)
    }

    pub fn delete_comment<S>(
        &mut self,
        store: &S,
        id: CommentId,
    ) -> Result<Vec<CommentId>, StoreError>
    where
        S: CommentStore + ?Sized,
    {
        let removed = store.delete_comment(&self.path, id)?;
        self.refresh_comments(store)?;
        Ok(removed)
    }

    fn refresh_comments<S: CommentStore + ?Sized>(&mut self, store: &S) -> Result<(), StoreError> {
        self.comments = store.list_comments(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::CommentStatus;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    const DOC: &str = "# Plan\n\nShip the parser.\n\nThen the locator.\n";

    fn open() -> (MemoryStore, DocumentSession) {
        let store = MemoryStore::new(1_000);
        store.insert_document(RelativePath::new("plan.md"), DOC);
        let session = DocumentSession::open(&store, RelativePath::new("plan.md")).unwrap();
        (store, session)
    }

    fn anchor(line: usize, fragment: &str) -> Anchor {
        Anchor::new(line, line, fragment).unwrap()
    }

    #[test]
    fn test_save_relocates_moved_anchor() {
        let (store, mut session) = open();
        let comment = session
            .add_comment(&store, anchor(5, "locator"), "which one?", "fay")
            .unwrap();

        store.advance(10);
        let edited = DOC.replace("# Plan\n", "# Plan\n\nIntro line.\n");
        let outcome = session.save(&store, edited, false).unwrap();

        match outcome {
            SaveOutcome::Saved { relocation, .. } => assert_eq!(relocation.moved, vec![comment.id]),
            other => panic!("expected save, got {other:?}"),
        }
        assert_eq!(session.comments()[0].anchor.start_line(), 7);
        let stored = store.list_comments(RelativePath::new("plan.md")).unwrap();
        assert_eq!(stored[0].anchor.start_line(), 7);
    }

    #[test]
    fn test_orphaned_anchor_is_flagged_then_restored() {
        let (store, mut session) = open();
        let comment = session
            .add_comment(&store, anchor(3, "parser"), "which parser?", "fay")
            .unwrap();

        store.advance(10);
        let outcome = session
            .save(&store, "# Plan\n\nShip it.\n", false)
            .unwrap();
        let SaveOutcome::Saved { relocation, .. } = outcome else {
            panic!("expected save");
        };
        assert_eq!(relocation.orphaned, vec![comment.id]);
        assert!(session.comments()[0].anchor_lost);
        assert_eq!(session.comments()[0].anchor.start_line(), 3);

        store.advance(10);
        let outcome = session.save(&store, DOC, false).unwrap();
        let SaveOutcome::Saved { relocation, .. } = outcome else {
            panic!("expected save");
        };
        assert_eq!(relocation.restored, vec![comment.id]);
        assert!(!session.comments()[0].anchor_lost);
    }

    #[test]
    fn test_conflict_then_reload_or_overwrite() {
        let (store, mut session) = open();
        store.advance(10);
        store.edit_externally(RelativePath::new("plan.md"), "theirs\n");

        let outcome = session.save(&store, "mine\n", false).unwrap();
        assert!(matches!(outcome, SaveOutcome::Conflict(_)));
        assert_eq!(session.content(), DOC);

        let outcome = session.save(&store, "mine\n", true).unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved { .. }));
        assert_eq!(
            store.read_document(RelativePath::new("plan.md")).unwrap().content,
            "mine\n"
        );

        store.advance(10);
        store.edit_externally(RelativePath::new("plan.md"), "theirs again\n");
        session.reload(&store).unwrap();
        assert_eq!(session.content(), "theirs again\n");
        let outcome = session.save(&store, "merged\n", false).unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved { .. }));
    }

    #[test]
    fn test_result_after_reload_is_stale() {
        let (store, mut session) = open();
        let request = session.save_request("late\n", false);
        session.reload(&store).unwrap();

        let result = request.execute(&store);
        let outcome = session.complete_save(&store, &request, result).unwrap();

        assert_eq!(outcome, SaveOutcome::Stale);
        assert_eq!(session.content(), DOC);
    }

    #[test]
    fn test_threads_and_visibility() {
        let (store, mut session) = open();
        let root = session
            .add_comment(&store, anchor(3, "parser"), "which parser?", "fay")
            .unwrap();
        store.advance(1);
        let reply = session.reply(&store, root.id, "the new one", "gus").unwrap();
        assert_eq!(reply.anchor, root.anchor);

        let threads = session.threads();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].replies[0].id, reply.id);

        session
            .update_comment(&store, root.id, &CommentUpdate::status(CommentStatus::Archived))
            .unwrap();
        assert_eq!(session.visible_comments().len(), 1);

        let removed = session.delete_comment(&store, root.id).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(session.comments().is_empty());
    }
}
