use std::fmt;
use std::str::FromStr;

use relative_path::RelativePathBuf;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anchoring::Anchor;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Process-wide unique comment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(Uuid);

impl CommentId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CommentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Open,
    Resolved,
    /// Hidden: archived comments never get a marker.
    Archived,
}

impl CommentStatus {
    pub fn is_visible(self) -> bool {
        !matches!(self, CommentStatus::Archived)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommentStatus::Open => "open",
            CommentStatus::Resolved => "resolved",
            CommentStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for CommentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown comment status '{0}' (expected open, resolved or archived)")]
pub struct ParseStatusError(String);

impl FromStr for CommentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(CommentStatus::Open),
            "resolved" => Ok(CommentStatus::Resolved),
            "archived" => Ok(CommentStatus::Archived),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// A comment as persisted: always flat, replies point at their parent via
/// `parent_id` and are only assembled into threads at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub document_path: RelativePathBuf,
    pub anchor: Anchor,
    pub content: String,
    pub author: String,
    pub created_at: Timestamp,
    /// Never earlier than `created_at`.
    pub updated_at: Timestamp,
    pub status: CommentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    /// Set when the anchor text could no longer be found after an edit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub anchor_lost: bool,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Top-level, visible comments are the ones that get a marker.
    pub fn wants_marker(&self) -> bool {
        !self.is_reply() && self.status.is_visible()
    }

    /// Apply a content/status change, keeping `updated_at` monotonic.
    pub fn apply_update(&mut self, update: &CommentUpdate, now: Timestamp) {
        if let Some(content) = &update.content {
            self.content.clone_from(content);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self.updated_at = now.max(self.updated_at).max(self.created_at);
    }
}

/// Input for creating a comment; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub document_path: RelativePathBuf,
    pub anchor: Anchor,
    pub content: String,
    pub author: String,
    pub parent_id: Option<CommentId>,
}

impl NewComment {
    pub fn into_comment(self, id: CommentId, now: i64) -> Comment {
        Comment {
            id,
            document_path: self.document_path,
            anchor: self.anchor,
            content: self.content,
            author: self.author,
            created_at: now,
            updated_at: now,
            status: CommentStatus::Open,
            parent_id: self.parent_id,
            anchor_lost: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentUpdate {
    pub content: Option<String>,
    pub status: Option<CommentStatus>,
}

impl CommentUpdate {
    pub fn status(status: CommentStatus) -> Self {
        Self {
            content: None,
            status: Some(status),
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            status: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.status.is_none()
    }
}
