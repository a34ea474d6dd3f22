use std::time::{Duration, Instant};

use crate::anchoring::Anchor;
use crate::render::{NodeId, RenderTree, render_markdown};

/// One end of a selection: a byte offset inside a text node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPosition {
    pub node: NodeId,
    pub offset: usize,
}

impl TextPosition {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A native selection as reported by the host, start and end in either order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    pub start: TextPosition,
    pub end: TextPosition,
}

impl SelectionRange {
    pub fn new(start: TextPosition, end: TextPosition) -> Self {
        Self { start, end }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Geometry of laid-out text, supplied by whatever draws the render tree.
pub trait LayoutProvider {
    /// One rectangle per visual line fragment covered by `range`.
    fn client_rects(&self, tree: &RenderTree, range: &SelectionRange) -> Vec<Rect>;
}

/// A selection captured on pointer release, ready to become a draft anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedSelection {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Covers the whole visual extent; multi-line selections give several.
    pub rects: Vec<Rect>,
    /// Where the pointer was released, for placing the comment affordance.
    pub pointer: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionConfig {
    /// Delay between capturing a selection and clearing the native one.
    pub clear_native_delay: Duration,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            clear_native_delay: Duration::from_millis(10),
        }
    }
}

/// Work the host has to do on the platform side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionAction {
    /// Drop the platform's own selection highlight; the captured rectangles
    /// are drawn instead.
    ClearNativeSelection,
}

/// Tracks the user's text selection inside one container of the render tree.
#[derive(Debug)]
pub struct SelectionCapture {
    container: NodeId,
    config: SelectionConfig,
    current: Option<CapturedSelection>,
    clear_native_at: Option<Instant>,
}

impl SelectionCapture {
    pub fn new(container: NodeId, config: SelectionConfig) -> Self {
        Self {
            container,
            config,
            current: None,
            clear_native_at: None,
        }
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn current(&self) -> Option<&CapturedSelection> {
        self.current.as_ref()
    }

    /// Capture the native selection on pointer release.
    ///
    /// Collapsed selections, selections with an endpoint outside the
    /// container, and whitespace-only selections are ignored and leave any
    /// previously captured selection in place.
    pub fn on_pointer_up(
        &mut self,
        tree: &RenderTree,
        range: Option<&SelectionRange>,
        pointer: Point,
        layout: &impl LayoutProvider,
        now: Instant,
    ) -> Option<&CapturedSelection> {
        let range = range.filter(|r| !r.is_collapsed())?;
        if !self.contains(tree, range.start) || !self.contains(tree, range.end) {
            log::debug!("selection escapes its container; ignoring");
            return None;
        }

        let range = ordered(tree, self.container, *range)?;
        let text = selected_text(tree, &range);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let start_line = line_at(tree, range.start);
        let end_line = line_at(tree, range.end).max(start_line);

        self.clear_native_at = Some(now + self.config.clear_native_delay);
        self.current = Some(CapturedSelection {
            text: text.to_string(),
            start_line,
            end_line,
            rects: layout.client_rects(tree, &range),
            pointer,
        });
        self.current.as_ref()
    }

    /// The container scrolled; the captured rectangles are stale.
    pub fn on_scroll(&mut self) {
        self.clear();
    }

    /// A press outside the selection and outside the comment affordance
    /// dismisses the selection.
    pub fn on_pointer_down(&mut self, point: Point, affordance: Option<Rect>) {
        let Some(current) = &self.current else {
            return;
        };
        let inside = current.rects.iter().any(|r| r.contains(point))
            || affordance.is_some_and(|r| r.contains(point));
        if !inside {
            self.clear();
        }
    }

    /// The comment draft was submitted or cancelled.
    pub fn on_draft_closed(&mut self) {
        self.clear();
    }

    /// Returns the native-selection clear once its delay has passed.
    pub fn tick(&mut self, now: Instant) -> Option<SelectionAction> {
        match self.clear_native_at {
            Some(due) if now >= due => {
                self.clear_native_at = None;
                Some(SelectionAction::ClearNativeSelection)
            }
            _ => None,
        }
    }

    /// Draft anchor for the current selection against `document_text`.
    pub fn create_anchor(&self, document_text: &str) -> Option<Anchor> {
        create_anchor_from_selection(document_text, self.current.as_ref())
    }

    fn clear(&mut self) {
        self.current = None;
    }

    fn contains(&self, tree: &RenderTree, position: TextPosition) -> bool {
        tree.text(position.node).is_some()
            && tree.is_attached(position.node)
            && tree.is_inclusive_descendant(position.node, self.container)
    }
}

/// Build a draft anchor from a captured selection.
///
/// Context comes from the nearest line above and below the selected line
/// range that shows any text once rendered; Markdown separates blocks with
/// blank lines, so the immediately adjacent line is usually empty. Context is
/// stored as rendered text (`# Title` becomes `Title`) because that is what
/// the locator compares it against.
pub fn create_anchor_from_selection(
    document_text: &str,
    selection: Option<&CapturedSelection>,
) -> Option<Anchor> {
    let selection = selection?;
    let lines: Vec<&str> = document_text.lines().collect();

    let before = lines
        .iter()
        .take(selection.start_line.saturating_sub(1))
        .rev()
        .find_map(|line| rendered_line(line));
    let after = lines
        .iter()
        .skip(selection.end_line)
        .find_map(|line| rendered_line(line));

    match Anchor::new(selection.start_line, selection.end_line, &selection.text) {
        Ok(anchor) => Some(anchor.with_context(before.as_deref(), after.as_deref())),
        Err(err) => {
            log::debug!("selection does not make a valid anchor: {err}");
            None
        }
    }
}

/// What a single source line shows once rendered, whitespace collapsed.
fn rendered_line(line: &str) -> Option<String> {
    if line.trim().is_empty() {
        return None;
    }
    let tree = render_markdown(line);
    let text = tree.text_content(tree.root());
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Put the endpoints in document order.
fn ordered(tree: &RenderTree, container: NodeId, range: SelectionRange) -> Option<SelectionRange> {
    let nodes = tree.text_nodes(container);
    let start_index = nodes.iter().position(|&n| n == range.start.node)?;
    let end_index = nodes.iter().position(|&n| n == range.end.node)?;
    let swapped = (end_index, range.end.offset) < (start_index, range.start.offset);
    Some(if swapped {
        SelectionRange::new(range.end, range.start)
    } else {
        range
    })
}

/// Text between two ordered positions. Text from different blocks is
/// separated by a newline.
fn selected_text(tree: &RenderTree, range: &SelectionRange) -> String {
    let mut out = String::new();
    let mut inside = false;
    let mut last_block = None;

    for node in tree.text_nodes(tree.root()) {
        if node == range.start.node {
            inside = true;
        }
        if !inside {
            continue;
        }
        let Some(text) = tree.text(node) else {
            continue;
        };
        let from = if node == range.start.node {
            clamp_to_boundary(text, range.start.offset)
        } else {
            0
        };
        let to = if node == range.end.node {
            clamp_to_boundary(text, range.end.offset)
        } else {
            text.len()
        };

        let block = line_block(tree, node);
        if last_block.is_some() && block != last_block {
            out.push('\n');
        }
        last_block = block;
        if from < to {
            out.push_str(&text[from..to]);
        }

        if node == range.end.node {
            break;
        }
    }
    out
}

/// Source line of a position: the nearest line-marked ancestor's first
/// line, plus the newlines before the position inside that block. Defaults
/// to line 1 when no ancestor carries a line marker.
fn line_at(tree: &RenderTree, position: TextPosition) -> usize {
    let Some(block) = line_block(tree, position.node) else {
        return 1;
    };
    let Some(span) = tree.element(block).and_then(|e| e.lines) else {
        return 1;
    };

    let mut newlines = 0;
    for node in tree.text_nodes(block) {
        let Some(text) = tree.text(node) else {
            continue;
        };
        if node == position.node {
            let upto = clamp_to_boundary(text, position.offset);
            newlines += text[..upto].matches('\n').count();
            break;
        }
        newlines += text.matches('\n').count();
    }
    (span.start + newlines).min(span.end)
}

fn line_block(tree: &RenderTree, node: NodeId) -> Option<NodeId> {
    tree.ancestors(node)
        .find(|&id| tree.element(id).is_some_and(|e| e.lines.is_some()))
}

fn clamp_to_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Element;
    use rstest::rstest;
    use pretty_assertions::assert_eq;

    /// One 20px-high rectangle per text node touched.
    struct LineRects;

    impl LayoutProvider for LineRects {
        fn client_rects(&self, tree: &RenderTree, range: &SelectionRange) -> Vec<Rect> {
            let nodes = tree.text_nodes(tree.root());
            let from = nodes.iter().position(|&n| n == range.start.node).unwrap_or(0);
            let to = nodes.iter().position(|&n| n == range.end.node).unwrap_or(from);
            (from..=to)
                .map(|i| Rect::new(0.0, i as f64 * 20.0, 200.0, 20.0))
                .collect()
        }
    }

    fn text_node_containing(tree: &RenderTree, needle: &str) -> NodeId {
        tree.text_nodes(tree.root())
            .into_iter()
            .find(|&n| tree.text(n).is_some_and(|t| t.contains(needle)))
            .unwrap()
    }

    fn select(tree: &RenderTree, from: &str, to: &str) -> SelectionRange {
        let start = text_node_containing(tree, from);
        let end = text_node_containing(tree, to);
        let start_offset = tree.text(start).unwrap().find(from).unwrap();
        let end_offset = tree.text(end).unwrap().find(to).unwrap() + to.len();
        SelectionRange::new(
            TextPosition::new(start, start_offset),
            TextPosition::new(end, end_offset),
        )
    }

    #[test]
    fn test_capture_single_line() {
        let tree = render_markdown("# Title\n\nfirst line\nsecond line\n");
        let mut capture = SelectionCapture::new(tree.root(), SelectionConfig::default());
        let range = select(&tree, "first", "second");
        let now = Instant::now();

        let captured = capture
            .on_pointer_up(&tree, Some(&range), Point::new(5.0, 5.0), &LineRects, now)
            .cloned()
            .unwrap();

        assert_eq!(captured.text, "first line\nsecond");
        assert_eq!((captured.start_line, captured.end_line), (3, 4));
        assert_eq!(captured.rects.len(), 1);
    }

    #[test]
    fn test_capture_across_blocks() {
        let tree = render_markdown("alpha\n\n- beta\n- gamma\n");
        let mut capture = SelectionCapture::new(tree.root(), SelectionConfig::default());
        let range = select(&tree, "pha", "gam");

        let captured = capture
            .on_pointer_up(&tree, Some(&range), Point::default(), &LineRects, Instant::now())
            .cloned()
            .unwrap();

        assert_eq!(captured.text, "pha\nbeta\ngam");
        assert_eq!((captured.start_line, captured.end_line), (1, 4));
        assert_eq!(captured.rects.len(), 3);
    }

    #[test]
    fn test_backwards_selection_is_ordered() {
        let tree = render_markdown("one two three\n");
        let node = tree.text_nodes(tree.root())[0];
        let range = SelectionRange::new(TextPosition::new(node, 7), TextPosition::new(node, 4));
        let mut capture = SelectionCapture::new(tree.root(), SelectionConfig::default());

        let captured = capture
            .on_pointer_up(&tree, Some(&range), Point::default(), &LineRects, Instant::now())
            .unwrap();
        assert_eq!(captured.text, "two");
    }

    #[test]
    fn test_partially_outside_container_keeps_previous_selection() {
        let mut tree = RenderTree::new();
        let root = tree.root();
        let container = tree.append_element(root, Element::new("section"));
        let p1 = tree.append_element(container, Element::new("p").with_lines(1, 1));
        tree.append_text(p1, "inside text");
        let p2 = tree.append_element(root, Element::new("p").with_lines(3, 3));
        tree.append_text(p2, "outside text");

        let mut capture = SelectionCapture::new(container, SelectionConfig::default());
        let now = Instant::now();
        let good = select(&tree, "inside", "inside");
        capture.on_pointer_up(&tree, Some(&good), Point::default(), &LineRects, now);
        let before = capture.current().cloned();
        assert!(before.is_some());

        let escaping = select(&tree, "text", "outside");
        let result = capture.on_pointer_up(&tree, Some(&escaping), Point::default(), &LineRects, now);

        assert!(result.is_none());
        assert_eq!(capture.current().cloned(), before);
    }

    #[test]
    fn test_without_line_markers_defaults_to_line_one() {
        let mut tree = RenderTree::new();
        let root = tree.root();
        let div = tree.append_element(root, Element::new("div"));
        tree.append_text(div, "no markers here");
        let range = select(&tree, "markers", "markers");
        let mut capture = SelectionCapture::new(root, SelectionConfig::default());

        let captured = capture
            .on_pointer_up(&tree, Some(&range), Point::default(), &LineRects, Instant::now())
            .unwrap();
        assert_eq!((captured.start_line, captured.end_line), (1, 1));
    }

    #[test]
    fn test_collapsed_selection_is_ignored() {
        let tree = render_markdown("text\n");
        let node = tree.text_nodes(tree.root())[0];
        let range = SelectionRange::new(TextPosition::new(node, 2), TextPosition::new(node, 2));
        let mut capture = SelectionCapture::new(tree.root(), SelectionConfig::default());
        assert!(
            capture
                .on_pointer_up(&tree, Some(&range), Point::default(), &LineRects, Instant::now())
                .is_none()
        );
    }

    #[test]
    fn test_native_selection_cleared_after_delay() {
        let tree = render_markdown("some text\n");
        let range = select(&tree, "some", "text");
        let config = SelectionConfig::default();
        let mut capture = SelectionCapture::new(tree.root(), config);
        let now = Instant::now();
        capture.on_pointer_up(&tree, Some(&range), Point::default(), &LineRects, now);

        assert_eq!(capture.tick(now), None);
        assert_eq!(
            capture.tick(now + config.clear_native_delay),
            Some(SelectionAction::ClearNativeSelection)
        );
        assert_eq!(capture.tick(now + config.clear_native_delay), None);
        assert!(capture.current().is_some());
    }

    #[test]
    fn test_dismissal() {
        let tree = render_markdown("some text\n");
        let range = select(&tree, "some", "text");
        let mut capture = SelectionCapture::new(tree.root(), SelectionConfig::default());
        let now = Instant::now();

        capture.on_pointer_up(&tree, Some(&range), Point::default(), &LineRects, now);
        capture.on_pointer_down(Point::new(10.0, 10.0), None);
        assert!(capture.current().is_some(), "press inside the selection");

        let affordance = Rect::new(500.0, 500.0, 40.0, 20.0);
        capture.on_pointer_down(Point::new(510.0, 505.0), Some(affordance));
        assert!(capture.current().is_some(), "press on the affordance");

        capture.on_pointer_down(Point::new(900.0, 900.0), Some(affordance));
        assert!(capture.current().is_none());

        capture.on_pointer_up(&tree, Some(&range), Point::default(), &LineRects, now);
        capture.on_scroll();
        assert!(capture.current().is_none());

        capture.on_pointer_up(&tree, Some(&range), Point::default(), &LineRects, now);
        capture.on_draft_closed();
        assert!(capture.current().is_none());
    }

    #[test]
    fn test_create_anchor_uses_nearest_non_blank_lines() {
        let document = "# Heading\n\nThe selected sentence.\n\nNext paragraph.\n";
        let selection = CapturedSelection {
            text: "selected".to_string(),
            start_line: 3,
            end_line: 3,
            rects: Vec::new(),
            pointer: Point::default(),
        };

        let anchor = create_anchor_from_selection(document, Some(&selection)).unwrap();
        assert_eq!(anchor.text_fragment(), "selected");
        assert_eq!(anchor.context_before(), Some("Heading"));
        assert_eq!(anchor.context_after(), Some("Next paragraph."));
    }

    #[rstest]
    #[case("## Setup\n\nTODO\n\n- second item\n", "Setup", "second item")]
    #[case("> quoted *words*\nTODO\n1. `code` step\n", "quoted words", "code step")]
    #[case("**Bold** and [a link](https://x.test)\n\nTODO\n\n---\n\nEnd\n", "Bold and a link", "End")]
    fn test_create_anchor_stores_rendered_context(
        #[case] document: &str,
        #[case] before: &str,
        #[case] after: &str,
    ) {
        let line = document.lines().position(|l| l == "TODO").unwrap() + 1;
        let selection = CapturedSelection {
            text: "TODO".to_string(),
            start_line: line,
            end_line: line,
            rects: Vec::new(),
            pointer: Point::default(),
        };

        let anchor = create_anchor_from_selection(document, Some(&selection)).unwrap();
        assert_eq!(anchor.context_before(), Some(before));
        assert_eq!(anchor.context_after(), Some(after));
    }

    #[test]
    fn test_create_anchor_at_document_edges() {
        let selection = CapturedSelection {
            text: "only".to_string(),
            start_line: 1,
            end_line: 1,
            rects: Vec::new(),
            pointer: Point::default(),
        };
        let anchor = create_anchor_from_selection("only line", Some(&selection)).unwrap();
        assert_eq!(anchor.context_before(), None);
        assert_eq!(anchor.context_after(), None);
    }

    #[test]
    fn test_create_anchor_without_selection() {
        assert_eq!(create_anchor_from_selection("text", None), None);
    }
}
