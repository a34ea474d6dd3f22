use std::ops::Range;

use crate::comments::{CommentId, CommentStatus};

/// Handle to a node in a [`RenderTree`].
///
/// Handles are only meaningful for the tree that issued them. A handle to a
/// node that has since been removed resolves to `None` everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// 1-based inclusive range of source lines an element was rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    /// Source line marker; only block-level elements carry one.
    pub lines: Option<LineSpan>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            lines: None,
        }
    }

    pub fn with_lines(mut self, start: usize, end: usize) -> Self {
        self.lines = Some(LineSpan { start, end });
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }
}

/// Transient highlight wrapped around located comment text.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerData {
    pub comment_id: CommentId,
    pub status: CommentStatus,
    pub hovered: bool,
}

impl MarkerData {
    pub fn new(comment_id: CommentId, status: CommentStatus) -> Self {
        Self {
            comment_id,
            status,
            hovered: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Element(Element),
    Text(String),
    Marker(MarkerData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Children were added to or removed from `target`.
    ChildList,
    /// The text of `target` changed.
    CharacterData,
}

/// A structural change recorded while an observer is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub target: NodeId,
    pub kind: MutationKind,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed tree of rendered content.
///
/// This is the shared surface between the renderer, which may rebuild any
/// part of it at any time, and the highlight injector. Structural changes
/// (child lists and text) are logged while an observer is connected so the
/// injector can notice rebuilds it did not cause. Marker styling changes are
/// not structural and are never logged.
#[derive(Debug, Clone)]
pub struct RenderTree {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    root: NodeId,
    observing: bool,
    mutations: Vec<Mutation>,
}

impl Default for RenderTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTree {
    /// Create a tree holding only an empty `article` root.
    pub fn new() -> Self {
        let root = Node {
            data: NodeData::Element(Element::new("article")),
            parent: None,
            children: Vec::new(),
        };
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
            observing: false,
            mutations: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn alloc(&mut self, data: NodeData, parent: Option<NodeId>) -> NodeId {
        let node = Node {
            data,
            parent,
            children: Vec::new(),
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        let children = match self.slots.get_mut(id.0).and_then(Option::take) {
            Some(node) => node.children,
            None => return,
        };
        self.free.push(id.0);
        for child in children {
            self.release(child);
        }
    }

    fn record(&mut self, target: NodeId, kind: MutationKind) {
        if self.observing {
            self.mutations.push(Mutation { target, kind });
        }
    }

    // Observation

    /// Start logging structural mutations.
    pub fn observe(&mut self) {
        self.observing = true;
    }

    /// Stop logging structural mutations. Already logged ones are kept.
    pub fn disconnect(&mut self) {
        self.observing = false;
    }

    pub fn is_observed(&self) -> bool {
        self.observing
    }

    /// Drain the mutation log.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.mutations)
    }

    // Read access

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.node(id).map(|n| &n.data)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id)? {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn marker(&self, id: NodeId) -> Option<&MarkerData> {
        match self.data(id)? {
            NodeData::Marker(marker) => Some(marker),
            _ => None,
        }
    }

    /// Mutable marker access. Styling changes are not logged as mutations.
    pub fn marker_mut(&mut self, id: NodeId) -> Option<&mut MarkerData> {
        match self.node_mut(id).map(|n| &mut n.data)? {
            NodeData::Marker(marker) => Some(marker),
            _ => None,
        }
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&current| self.parent(current))
    }

    /// True if `node` is `ancestor` or lies beneath it.
    pub fn is_inclusive_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        self.node(node).is_some() && (node == ancestor || self.ancestors(node).any(|a| a == ancestor))
    }

    /// True while the node is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_inclusive_descendant(id, self.root)
    }

    /// True if any strict ancestor of `id` is a marker.
    pub fn is_inside_marker(&self, id: NodeId) -> bool {
        self.ancestors(id).any(|a| self.marker(a).is_some())
    }

    /// Pre-order depth-first walk of `from` and everything beneath it.
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if self.node(id).is_none() {
                continue;
            }
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Every text node under `from`, in document order.
    pub fn text_nodes(&self, from: NodeId) -> Vec<NodeId> {
        self.descendants(from)
            .into_iter()
            .filter(|&id| self.text(id).is_some())
            .collect()
    }

    /// Every marker under `from`, in document order.
    pub fn markers(&self, from: NodeId) -> Vec<NodeId> {
        self.descendants(from)
            .into_iter()
            .filter(|&id| self.marker(id).is_some())
            .collect()
    }

    pub fn find_marker(&self, from: NodeId, comment_id: CommentId) -> Option<NodeId> {
        self.descendants(from)
            .into_iter()
            .find(|&id| self.marker(id).is_some_and(|m| m.comment_id == comment_id))
    }

    /// Concatenated text of every text node under `from`.
    pub fn text_content(&self, from: NodeId) -> String {
        self.text_nodes(from)
            .into_iter()
            .filter_map(|id| self.text(id))
            .collect()
    }

    // Construction

    pub fn append_element(&mut self, parent: NodeId, element: Element) -> NodeId {
        self.append(parent, NodeData::Element(element))
    }

    /// Append text under `parent`, merging into a trailing text sibling.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Option<NodeId> {
        if text.is_empty() {
            return None;
        }
        if let Some(&last) = self.children(parent).last()
            && let Some(Node {
                data: NodeData::Text(existing),
                ..
            }) = self.node_mut(last)
        {
            existing.push_str(text);
            self.record(last, MutationKind::CharacterData);
            return Some(last);
        }
        Some(self.append(parent, NodeData::Text(text.to_string())))
    }

    fn append(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = self.alloc(data, Some(parent));
        if let Some(node) = self.node_mut(parent) {
            node.children.push(id);
        }
        self.record(parent, MutationKind::ChildList);
        id
    }

    /// Replace everything under `container` with a copy of `fresh`'s content.
    ///
    /// This is how a renderer regenerates the visible document. Any markers
    /// under `container` are discarded along with the old content.
    pub fn replace_children_with(&mut self, container: NodeId, fresh: &RenderTree) {
        let old = match self.node_mut(container) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in old {
            self.release(child);
        }
        for &child in fresh.children(fresh.root) {
            self.graft(container, fresh, child);
        }
        self.record(container, MutationKind::ChildList);
    }

    fn graft(&mut self, parent: NodeId, source: &RenderTree, from: NodeId) {
        let Some(data) = source.data(from).cloned() else {
            return;
        };
        let id = self.alloc(data, Some(parent));
        if let Some(node) = self.node_mut(parent) {
            node.children.push(id);
        }
        for &child in source.children(from) {
            self.graft(id, source, child);
        }
    }

    /// Split the text node `text_node` into leading text, a marker wrapping
    /// `range`, and trailing text. Empty leading/trailing parts are omitted.
    ///
    /// Returns the marker, or `None` if `text_node` is not a text node or
    /// `range` is empty, out of bounds, or not on character boundaries.
    pub fn wrap_text_range(
        &mut self,
        text_node: NodeId,
        range: Range<usize>,
        marker: MarkerData,
    ) -> Option<NodeId> {
        let text = self.text(text_node)?;
        if range.is_empty()
            || range.end > text.len()
            || !text.is_char_boundary(range.start)
            || !text.is_char_boundary(range.end)
        {
            return None;
        }
        let parent = self.parent(text_node)?;
        let leading = text[..range.start].to_string();
        let wrapped = text[range.clone()].to_string();
        let trailing = text[range.end..].to_string();

        let index = self.children(parent).iter().position(|&c| c == text_node)?;

        let mut replacement = Vec::with_capacity(3);
        if !leading.is_empty() {
            replacement.push(self.alloc(NodeData::Text(leading), Some(parent)));
        }
        let marker_id = self.alloc(NodeData::Marker(marker), Some(parent));
        let inner = self.alloc(NodeData::Text(wrapped), Some(marker_id));
        if let Some(node) = self.node_mut(marker_id) {
            node.children.push(inner);
        }
        replacement.push(marker_id);
        if !trailing.is_empty() {
            replacement.push(self.alloc(NodeData::Text(trailing), Some(parent)));
        }

        if let Some(node) = self.node_mut(parent) {
            node.children.splice(index..=index, replacement);
        }
        self.release(text_node);
        self.record(parent, MutationKind::ChildList);
        Some(marker_id)
    }

    /// Remove a marker, moving its children into its place and merging
    /// the surrounding text back together. Returns false if `marker` is not
    /// an attached marker.
    pub fn unwrap_marker(&mut self, marker: NodeId) -> bool {
        if self.marker(marker).is_none() {
            return false;
        }
        let Some(parent) = self.parent(marker) else {
            return false;
        };
        let Some(index) = self.children(parent).iter().position(|&c| c == marker) else {
            return false;
        };

        let inner = match self.node_mut(marker) {
            Some(node) => std::mem::take(&mut node.children),
            None => return false,
        };
        for &child in &inner {
            if let Some(node) = self.node_mut(child) {
                node.parent = Some(parent);
            }
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.splice(index..=index, inner);
        }
        self.release(marker);
        self.normalize(parent);
        self.record(parent, MutationKind::ChildList);
        true
    }

    /// Merge adjacent text children of `parent` and drop empty ones.
    pub fn normalize(&mut self, parent: NodeId) {
        let children = self.children(parent).to_vec();
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
        let mut dropped = Vec::new();

        for child in children {
            let Some(text) = self.text(child).map(str::to_string) else {
                kept.push(child);
                continue;
            };
            if text.is_empty() {
                dropped.push(child);
                continue;
            }
            let merge_into = kept.last().copied().filter(|&prev| self.text(prev).is_some());
            match merge_into {
                Some(prev) => {
                    if let Some(Node {
                        data: NodeData::Text(existing),
                        ..
                    }) = self.node_mut(prev)
                    {
                        existing.push_str(&text);
                    }
                    dropped.push(child);
                }
                None => kept.push(child),
            }
        }

        if let Some(node) = self.node_mut(parent) {
            node.children = kept;
        }
        for id in dropped {
            self.release(id);
        }
    }
}
