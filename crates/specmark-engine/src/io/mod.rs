use relative_path::{Component, RelativePath, RelativePathBuf};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid documents directory: {0}")]
    InvalidDocsDir(String),
    #[error("Invalid document path '{0}': {1}")]
    InvalidPath(String, &'static str),
}

/// Normalize a document path and make sure it stays inside the documents
/// root and names a Markdown file.
pub fn validate_document_path(path: &RelativePath) -> Result<RelativePathBuf, IoError> {
    let normalized = path.normalize();
    if normalized.as_str().is_empty() {
        return Err(IoError::InvalidPath(path.to_string(), "path is empty"));
    }
    if normalized
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(IoError::InvalidPath(
            path.to_string(),
            "path escapes the documents directory",
        ));
    }
    if normalized.extension() != Some("md") {
        return Err(IoError::InvalidPath(
            path.to_string(),
            "only .md documents are supported",
        ));
    }
    Ok(normalized)
}

/// Read a markdown file and return its content
pub fn read_file(relative_path: &RelativePath, docs_root: &Path) -> Result<String, IoError> {
    let absolute_path = relative_path.to_path(docs_root);
    if !absolute_path.exists() {
        return Err(IoError::NotFound(absolute_path));
    }
    fs::read_to_string(&absolute_path).map_err(IoError::Io)
}

/// Write content to a markdown file, creating parent folders as needed
pub fn write_file(
    relative_path: &RelativePath,
    docs_root: &Path,
    content: &str,
) -> Result<(), IoError> {
    let absolute_path = relative_path.to_path(docs_root);

    if let Some(parent) = absolute_path.parent() {
        fs::create_dir_all(parent).map_err(IoError::Io)?;
    }

    fs::write(&absolute_path, content).map_err(IoError::Io)
}

/// Last modification time of a file, in epoch milliseconds
pub fn modified_millis(relative_path: &RelativePath, docs_root: &Path) -> Result<i64, IoError> {
    let absolute_path = relative_path.to_path(docs_root);
    match fs::metadata(&absolute_path) {
        Ok(metadata) => Ok(epoch_millis(metadata.modified()?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(IoError::NotFound(absolute_path))
        }
        Err(err) => Err(IoError::Io(err)),
    }
}

pub fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Scan for markdown files under the documents directory, skipping hidden
/// folders (comment storage lives in one)
pub fn scan_markdown_files(docs_root: &Path) -> Result<Vec<PathBuf>, IoError> {
    validate_docs_dir(docs_root)?;

    let mut files = Vec::new();
    scan_directory_recursive(docs_root, &mut files)?;
    files.sort();
    Ok(files)
}

fn scan_directory_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), IoError> {
    let entries = fs::read_dir(dir).map_err(IoError::Io)?;

    for entry in entries {
        let entry = entry.map_err(IoError::Io)?;
        let path = entry.path();

        if path.is_dir() {
            let hidden = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if !hidden {
                scan_directory_recursive(&path, files)?;
            }
        } else if let Some(ext) = path.extension()
            && ext == "md"
        {
            files.push(path);
        }
    }

    Ok(())
}

pub fn validate_docs_dir(path: &Path) -> Result<(), IoError> {
    if !path.exists() || !path.is_dir() {
        return Err(IoError::InvalidDocsDir(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    Ok(())
}
