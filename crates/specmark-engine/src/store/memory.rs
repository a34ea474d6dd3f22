use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use relative_path::{RelativePath, RelativePathBuf};

use super::{CommentStore, DocumentSnapshot, DocumentStore, StoreError};
use crate::comments::Comment;
use crate::io::validate_document_path;
use crate::models::MarkdownFile;

#[derive(Debug, Clone)]
struct StoredDocument {
    content: String,
    modified: i64,
}

/// In-memory documents and comments with a manually advanced clock.
///
/// Every write moves the document's modification time forward by at least
/// one millisecond, so guarded writes always see a change.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RefCell<BTreeMap<RelativePathBuf, StoredDocument>>,
    comments: RefCell<BTreeMap<RelativePathBuf, Vec<Comment>>>,
    now: Cell<i64>,
}

impl MemoryStore {
    pub fn new(now: i64) -> Self {
        Self {
            now: Cell::new(now),
            ..Self::default()
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.set(self.now.get() + millis);
    }

    /// Seed a document; returns its modification time.
    pub fn insert_document(&self, path: &RelativePath, content: &str) -> i64 {
        self.put(path.normalize(), content)
    }

    /// Change a document as another writer would; returns the new
    /// modification time.
    pub fn edit_externally(&self, path: &RelativePath, content: &str) -> i64 {
        self.put(path.normalize(), content)
    }

    fn put(&self, path: RelativePathBuf, content: &str) -> i64 {
        let mut documents = self.documents.borrow_mut();
        let modified = match documents.get(&path) {
            Some(existing) => self.now.get().max(existing.modified + 1),
            None => self.now.get(),
        };
        documents.insert(
            path,
            StoredDocument {
                content: content.to_string(),
                modified,
            },
        );
        modified
    }

    fn stored(&self, path: &RelativePath) -> Result<StoredDocument, StoreError> {
        let path = validate_document_path(path)?;
        self.documents
            .borrow()
            .get(&path)
            .cloned()
            .ok_or_else(|| StoreError::FileNotFound(path.to_string()))
    }
}

impl DocumentStore for MemoryStore {
    fn read_document(&self, path: &RelativePath) -> Result<DocumentSnapshot, StoreError> {
        let stored = self.stored(path)?;
        Ok(DocumentSnapshot::new(stored.content, stored.modified))
    }

    fn modified_at(&self, path: &RelativePath) -> Result<i64, StoreError> {
        Ok(self.stored(path)?.modified)
    }

    fn write_unchecked(&self, path: &RelativePath, content: &str) -> Result<i64, StoreError> {
        let path = validate_document_path(path)?;
        Ok(self.put(path, content))
    }

    fn list_documents(&self) -> Result<Vec<MarkdownFile>, StoreError> {
        Ok(self
            .documents
            .borrow()
            .iter()
            .map(|(path, stored)| MarkdownFile::new(path.clone(), stored.modified))
            .collect())
    }
}

impl CommentStore for MemoryStore {
    fn list_comments(&self, document: &RelativePath) -> Result<Vec<Comment>, StoreError> {
        let document = validate_document_path(document)?;
        Ok(self
            .comments
            .borrow()
            .get(&document)
            .cloned()
            .unwrap_or_default())
    }

    fn save_comments(
        &self,
        document: &RelativePath,
        comments: &[Comment],
    ) -> Result<(), StoreError> {
        let document = validate_document_path(document)?;
        self.comments
            .borrow_mut()
            .insert(document, comments.to_vec());
        Ok(())
    }

    fn now_millis(&self) -> i64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::Anchor;
    use crate::comments::{CommentStatus, CommentUpdate, NewComment};
    use pretty_assertions::assert_eq;

    fn new_comment(path: &str, parent: Option<crate::comments::CommentId>) -> NewComment {
        NewComment {
            document_path: RelativePathBuf::from(path),
            anchor: Anchor::new(1, 1, "text").unwrap(),
            content: "looks odd".to_string(),
            author: "dana".to_string(),
            parent_id: parent,
        }
    }

    #[test]
    fn test_writes_always_move_mtime_forward() {
        let store = MemoryStore::new(100);
        let first = store.write_unchecked(RelativePath::new("a.md"), "1").unwrap();
        let second = store.write_unchecked(RelativePath::new("a.md"), "2").unwrap();
        assert_eq!((first, second), (100, 101));
    }

    #[test]
    fn test_comment_lifecycle() {
        let store = MemoryStore::new(10);
        let doc = RelativePath::new("a.md");

        let root = store.add_comment(new_comment("a.md", None)).unwrap();
        store.advance(1);
        let reply = store.add_comment(new_comment("a.md", Some(root.id))).unwrap();
        store.advance(1);
        let nested = store.add_comment(new_comment("a.md", Some(reply.id))).unwrap();
        assert_eq!(nested.parent_id, Some(root.id));

        store.advance(5);
        let updated = store
            .update_comment(doc, root.id, &CommentUpdate::status(CommentStatus::Resolved))
            .unwrap();
        assert_eq!(updated.status, CommentStatus::Resolved);
        assert_eq!(updated.updated_at, 17);

        let removed = store.delete_comment(doc, root.id).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(store.list_comments(doc).unwrap().is_empty());
    }

    #[test]
    fn test_missing_comment_errors() {
        let store = MemoryStore::new(0);
        let doc = RelativePath::new("a.md");
        let missing = crate::comments::CommentId::new();

        assert_eq!(
            store.delete_comment(doc, missing).unwrap_err().code(),
            "COMMENT_NOT_FOUND"
        );
        assert_eq!(
            store
                .update_comment(doc, missing, &CommentUpdate::content("x"))
                .unwrap_err()
                .code(),
            "COMMENT_NOT_FOUND"
        );
        assert_eq!(
            store
                .add_comment(new_comment("a.md", Some(missing)))
                .unwrap_err()
                .code(),
            "COMMENT_NOT_FOUND"
        );
    }

    #[test]
    fn test_invalid_paths_rejected() {
        let store = MemoryStore::new(0);
        let err = store.read_document(RelativePath::new("../x.md")).unwrap_err();
        assert_eq!(err.code(), "INVALID_PATH");
    }
}
