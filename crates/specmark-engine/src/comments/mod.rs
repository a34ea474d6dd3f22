//! Comment records and their read-time thread projection.

pub mod model;
pub mod thread;

pub use model::{
    Comment, CommentId, CommentStatus, CommentUpdate, NewComment, ParseStatusError, Timestamp,
};
pub use thread::{CommentThread, build_threads, cascade_ids};
