use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use relative_path::{RelativePath, RelativePathBuf};

use super::{CommentStore, DocumentSnapshot, DocumentStore, StoreError};
use crate::comments::Comment;
use crate::io::{self, epoch_millis, validate_document_path};
use crate::models::MarkdownFile;

/// Folder under the documents root holding comment collections.
pub const COMMENTS_DIR: &str = ".specmark/comments";

/// Documents and comments kept under one directory.
///
/// Comments for `specs/api.md` live in
/// `<root>/.specmark/comments/specs/api.md.json` as a flat JSON array.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        io::validate_docs_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn comments_file(&self, document: &RelativePath) -> PathBuf {
        RelativePath::new(COMMENTS_DIR)
            .join(format!("{document}.json"))
            .to_path(&self.root)
    }
}

impl DocumentStore for FsStore {
    fn read_document(&self, path: &RelativePath) -> Result<DocumentSnapshot, StoreError> {
        let path = validate_document_path(path)?;
        let content = io::read_file(&path, &self.root)?;
        let modified = io::modified_millis(&path, &self.root)?;
        Ok(DocumentSnapshot::new(content, modified))
    }

    fn modified_at(&self, path: &RelativePath) -> Result<i64, StoreError> {
        let path = validate_document_path(path)?;
        Ok(io::modified_millis(&path, &self.root)?)
    }

    fn write_unchecked(&self, path: &RelativePath, content: &str) -> Result<i64, StoreError> {
        let path = validate_document_path(path)?;
        io::write_file(&path, &self.root, content)?;
        Ok(io::modified_millis(&path, &self.root)?)
    }

    fn list_documents(&self) -> Result<Vec<MarkdownFile>, StoreError> {
        let mut documents = Vec::new();
        for absolute in io::scan_markdown_files(&self.root)? {
            let Some(relative) = absolute
                .strip_prefix(&self.root)
                .ok()
                .and_then(|p| RelativePathBuf::from_path(p).ok())
            else {
                continue;
            };
            let modified = io::modified_millis(&relative, &self.root)?;
            documents.push(MarkdownFile::new(relative, modified));
        }
        Ok(documents)
    }
}

impl CommentStore for FsStore {
    fn list_comments(&self, document: &RelativePath) -> Result<Vec<Comment>, StoreError> {
        let document = validate_document_path(document)?;
        let file = self.comments_file(&document);
        if !file.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&file)
            .map_err(|e| StoreError::LoadComments(format!("{}: {e}", file.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| StoreError::LoadComments(format!("{}: {e}", file.display())))
    }

    fn save_comments(
        &self,
        document: &RelativePath,
        comments: &[Comment],
    ) -> Result<(), StoreError> {
        let document = validate_document_path(document)?;
        let file = self.comments_file(&document);
        let json = serde_json::to_string_pretty(comments)
            .map_err(|e| StoreError::SaveComments(e.to_string()))?;

        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::SaveComments(format!("{}: {e}", parent.display())))?;
        }
        fs::write(&file, json)
            .map_err(|e| StoreError::SaveComments(format!("{}: {e}", file.display())))
    }

    fn now_millis(&self) -> i64 {
        epoch_millis(SystemTime::now())
    }
}
