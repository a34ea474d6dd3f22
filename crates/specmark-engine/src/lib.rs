pub mod anchoring;
pub mod comments;
pub mod io;
pub mod models;
pub mod render;
pub mod selection;
pub mod session;
pub mod store;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use anchoring::{
    Anchor, AnchorError, HighlightConfig, HighlightInjector, InjectReport, MarkerEvent,
    PointerEvent, Relocation, StyleUpdate, TextMatch, locate, locate_anchor, relocate,
    relocate_anchor,
};
pub use comments::{
    Comment, CommentId, CommentStatus, CommentThread, CommentUpdate, NewComment, build_threads,
};
pub use models::MarkdownFile;
pub use render::{RenderTree, render_markdown, to_html};
pub use selection::{CapturedSelection, SelectionCapture, SelectionConfig, create_anchor_from_selection};
pub use session::{DocumentSession, RelocationSummary, SaveOutcome, WriteRequest};
pub use store::{
    CommentStore, ConflictDescriptor, DocumentSnapshot, DocumentStore, FsStore, MemoryStore,
    StoreError, check_and_write,
};
