//! Turning a pointer-driven text selection into a draft comment anchor.

pub mod capture;

pub use capture::{
    CapturedSelection, LayoutProvider, Point, Rect, SelectionAction, SelectionCapture,
    SelectionConfig, SelectionRange, TextPosition, create_anchor_from_selection,
};
