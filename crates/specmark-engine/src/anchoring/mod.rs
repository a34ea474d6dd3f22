//! Comment anchors and the three things done with them: finding the
//! anchored text in a render tree, highlighting it, and following it
//! through edits of the source document.

pub mod anchor;
pub mod injector;
pub mod locator;
pub mod relocator;

pub use anchor::{Anchor, AnchorError, MAX_CONTEXT_CHARS, MAX_FRAGMENT_CHARS};
pub use injector::{
    HighlightConfig, HighlightInjector, InjectReport, MarkerEvent, PointerEvent, StyleUpdate,
};
pub use locator::{TextMatch, locate, locate_anchor};
pub use relocator::{NEARBY_SEARCH_LINES, Relocation, relocate, relocate_anchor};
