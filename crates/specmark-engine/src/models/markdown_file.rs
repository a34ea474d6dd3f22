use relative_path::{RelativePath, RelativePathBuf};
use serde::Serialize;

/// A document in the store, with a display-friendly name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownFile {
    relative_path: RelativePathBuf,
    display_name: String,
    /// Epoch milliseconds
    last_modified: i64,
}

impl MarkdownFile {
    pub fn new(relative_path: RelativePathBuf, last_modified: i64) -> Self {
        let display_name = relative_path
            .file_name()
            .map(|name| name.strip_suffix(".md").unwrap_or(name))
            .unwrap_or("Untitled")
            .to_string();

        Self {
            relative_path,
            display_name,
            last_modified,
        }
    }

    pub fn relative_path(&self) -> &RelativePath {
        &self.relative_path
    }

    /// File name without the .md extension
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn last_modified(&self) -> i64 {
        self.last_modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_strips_extension() {
        let file = MarkdownFile::new(RelativePathBuf::from("specs/api.md"), 0);
        assert_eq!(file.display_name(), "api");
        assert_eq!(file.relative_path(), RelativePath::new("specs/api.md"));
    }
}
