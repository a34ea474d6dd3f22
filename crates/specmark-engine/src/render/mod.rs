//! The render tree: the displayable form of a document that comments are
//! highlighted in, plus a Markdown producer and an HTML serializer for it.

pub mod html;
pub mod markdown;
pub mod tree;

pub use html::to_html;
pub use markdown::render_markdown;
pub use tree::{Element, LineSpan, MarkerData, Mutation, MutationKind, NodeData, NodeId, RenderTree};
