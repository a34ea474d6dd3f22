//! Boundaries to where documents and comments live.
//!
//! [`DocumentStore`] and [`CommentStore`] are the contracts the rest of the
//! engine relies on; [`FsStore`] keeps everything under a documents
//! directory and [`MemoryStore`] keeps it in memory with a manual clock.

pub mod fs;
pub mod guard;
pub mod memory;

pub use fs::FsStore;
pub use guard::check_and_write;
pub use memory::MemoryStore;

use relative_path::RelativePath;
use serde::Serialize;

use crate::comments::{Comment, CommentId, CommentUpdate, NewComment, cascade_ids};
use crate::io::IoError;
use crate::models::MarkdownFile;

/// The two modification times that disagreed when a guarded write was
/// refused. Both are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDescriptor {
    pub expected_mtime: i64,
    pub actual_mtime: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("document not found: {0}")]
    FileNotFound(String),
    #[error(
        "document changed since it was read (expected mtime {}, found {})",
        .0.expected_mtime,
        .0.actual_mtime
    )]
    Conflict(ConflictDescriptor),
    #[error("comment not found: {0}")]
    CommentNotFound(CommentId),
    #[error("failed to add comment: {0}")]
    AddComment(String),
    #[error("failed to update comment: {0}")]
    UpdateComment(String),
    #[error("failed to delete comment: {0}")]
    DeleteComment(String),
    #[error("failed to load comments: {0}")]
    LoadComments(String),
    #[error("failed to save comments: {0}")]
    SaveComments(String),
    #[error("unexpected store error: {0}")]
    Unknown(String),
}

impl StoreError {
    /// Stable code for the error, as reported across process boundaries.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidPath(_) => "INVALID_PATH",
            StoreError::FileNotFound(_) => "FILE_NOT_FOUND",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::CommentNotFound(_) => "COMMENT_NOT_FOUND",
            StoreError::AddComment(_) => "ADD_COMMENT_ERROR",
            StoreError::UpdateComment(_) => "UPDATE_COMMENT_ERROR",
            StoreError::DeleteComment(_) => "DELETE_COMMENT_ERROR",
            StoreError::LoadComments(_) => "LOAD_COMMENTS_ERROR",
            StoreError::SaveComments(_) => "SAVE_COMMENTS_ERROR",
            StoreError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// What to tell the user, including what they can do about it.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::InvalidPath(path) => {
                format!("'{path}' is not a document path that can be opened.")
            }
            StoreError::FileNotFound(path) => {
                format!("'{path}' no longer exists. It may have been moved or deleted.")
            }
            StoreError::Conflict(_) => "This document was changed elsewhere after you opened it. \
                 Reload the latest version, or overwrite it with your changes."
                .to_string(),
            StoreError::CommentNotFound(_) => {
                "That comment no longer exists. It may have been deleted.".to_string()
            }
            StoreError::AddComment(_)
            | StoreError::UpdateComment(_)
            | StoreError::DeleteComment(_)
            | StoreError::SaveComments(_) => {
                format!("Your comment change could not be saved ({self}). Please try again.")
            }
            StoreError::LoadComments(_) => {
                format!("Comments for this document could not be loaded ({self}).")
            }
            StoreError::Unknown(_) => format!("Something went wrong: {self}."),
        }
    }

    pub fn conflict(&self) -> Option<&ConflictDescriptor> {
        match self {
            StoreError::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

impl From<IoError> for StoreError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::NotFound(path) => StoreError::FileNotFound(path.display().to_string()),
            IoError::InvalidPath(..) | IoError::InvalidDocsDir(_) => {
                StoreError::InvalidPath(err.to_string())
            }
            IoError::Io(source) => StoreError::Unknown(source.to_string()),
        }
    }
}

/// A document as read from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    pub content: String,
    /// Epoch milliseconds; the token for the next guarded write.
    pub last_modified: i64,
    pub size: u64,
    pub line_count: usize,
}

impl DocumentSnapshot {
    pub fn new(content: String, last_modified: i64) -> Self {
        Self {
            size: content.len() as u64,
            line_count: content.lines().count(),
            content,
            last_modified,
        }
    }
}

pub trait DocumentStore {
    fn read_document(&self, path: &RelativePath) -> Result<DocumentSnapshot, StoreError>;

    /// Current modification time in epoch milliseconds.
    fn modified_at(&self, path: &RelativePath) -> Result<i64, StoreError>;

    /// Write without any conflict check and return the new modification time.
    fn write_unchecked(&self, path: &RelativePath, content: &str) -> Result<i64, StoreError>;

    fn list_documents(&self) -> Result<Vec<MarkdownFile>, StoreError>;

    /// Guarded write; see [`check_and_write`].
    fn write_document(
        &self,
        path: &RelativePath,
        content: &str,
        expected_mtime: Option<i64>,
        force: bool,
    ) -> Result<i64, StoreError> {
        check_and_write(self, path, content, expected_mtime, force)
    }
}

/// Flat per-document comment collections.
///
/// Implementors provide loading, saving and a clock; adding, updating and
/// deleting are read-modify-write cycles over the whole collection. Nothing
/// serializes two such cycles against each other, so concurrent writers to
/// the same document's comments resolve as last writer wins.
pub trait CommentStore {
    fn list_comments(&self, document: &RelativePath) -> Result<Vec<Comment>, StoreError>;

    fn save_comments(&self, document: &RelativePath, comments: &[Comment])
    -> Result<(), StoreError>;

    /// Current time in epoch milliseconds.
    fn now_millis(&self) -> i64;

    /// Store a new comment. A reply to a reply is attached to the thread's
    /// top-level comment.
    fn add_comment(&self, new: NewComment) -> Result<Comment, StoreError> {
        let document = new.document_path.clone();
        let mut comments = self.list_comments(&document)?;

        let mut new = new;
        if let Some(parent_id) = new.parent_id {
            let parent = comments
                .iter()
                .find(|c| c.id == parent_id)
                .ok_or(StoreError::CommentNotFound(parent_id))?;
            new.parent_id = Some(parent.parent_id.unwrap_or(parent.id));
        }

        let comment = new.into_comment(CommentId::new(), self.now_millis());
        comments.push(comment.clone());
        self.save_comments(&document, &comments)
            .map_err(|e| StoreError::AddComment(e.to_string()))?;
        log::debug!("added comment {} to {document}", comment.id);
        Ok(comment)
    }

    fn update_comment(
        &self,
        document: &RelativePath,
        id: CommentId,
        update: &CommentUpdate,
    ) -> Result<Comment, StoreError> {
        let mut comments = self.list_comments(document)?;
        let now = self.now_millis();
        let comment = comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::CommentNotFound(id))?;
        comment.apply_update(update, now);
        let updated = comment.clone();

        self.save_comments(document, &comments)
            .map_err(|e| StoreError::UpdateComment(e.to_string()))?;
        Ok(updated)
    }

    /// Delete a comment and its direct replies; returns every removed id.
    fn delete_comment(
        &self,
        document: &RelativePath,
        id: CommentId,
    ) -> Result<Vec<CommentId>, StoreError> {
        let mut comments = self.list_comments(document)?;
        if !comments.iter().any(|c| c.id == id) {
            return Err(StoreError::CommentNotFound(id));
        }
        let removed = cascade_ids(&comments, id);
        comments.retain(|c| !removed.contains(&c.id));

        self.save_comments(document, &comments)
            .map_err(|e| StoreError::DeleteComment(e.to_string()))?;
        log::debug!("deleted {} comment(s) from {document}", removed.len());
        Ok(removed)
    }
}
