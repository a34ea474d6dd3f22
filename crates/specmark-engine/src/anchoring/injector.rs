use std::time::{Duration, Instant};

use super::locator::locate_anchor;
use crate::comments::{Comment, CommentId, CommentStatus};
use crate::render::{MarkerData, NodeId, RenderTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightConfig {
    /// Quiet period after a foreign structural change before re-injecting.
    /// Later changes inside the window push the refresh back.
    pub debounce: Duration,
    /// How long observation stays off after the injector's own mutations.
    pub settle: Duration,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            settle: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Click,
    Enter,
    Leave,
}

/// Notifications for the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEvent {
    /// Open the thread for this comment.
    Activated(CommentId),
    HoverChanged { comment_id: CommentId, hovered: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleUpdate {
    Updated,
    /// No marker for the comment exists in the tree; refresh instead.
    MarkerMissing,
}

/// What one injection pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectReport {
    pub placed: Vec<CommentId>,
    /// Comments that already had a marker.
    pub already_marked: Vec<CommentId>,
    /// Comments whose text is not in the current render.
    pub unlocated: Vec<CommentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObserverState {
    Detached,
    Observing,
    Settling { resume_at: Instant },
}

/// Places one marker per visible top-level comment and keeps the markers
/// in place while the renderer rebuilds the tree underneath them.
///
/// The injector is driven by its host's event loop: mutating calls take the
/// current time, and [`tick`](Self::tick) is called periodically to notice
/// foreign rebuilds and run debounced refreshes.
#[derive(Debug)]
pub struct HighlightInjector {
    root: NodeId,
    config: HighlightConfig,
    state: ObserverState,
    pending_refresh: Option<Instant>,
    placed: Vec<(CommentId, NodeId)>,
}

impl HighlightInjector {
    pub fn new(root: NodeId, config: HighlightConfig) -> Self {
        Self {
            root,
            config,
            state: ObserverState::Detached,
            pending_refresh: None,
            placed: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Start watching `tree` for structural changes.
    pub fn attach(&mut self, tree: &mut RenderTree) {
        tree.take_mutations();
        tree.observe();
        self.state = ObserverState::Observing;
    }

    /// Stop watching and drop any scheduled refresh.
    pub fn detach(&mut self, tree: &mut RenderTree) {
        tree.disconnect();
        self.state = ObserverState::Detached;
        self.pending_refresh = None;
    }

    pub fn is_observing(&self) -> bool {
        self.state == ObserverState::Observing
    }

    pub fn pending_refresh(&self) -> Option<Instant> {
        self.pending_refresh
    }

    /// Mark every comment that should be visible and is not marked yet.
    ///
    /// Comments are processed oldest first so that, when several anchors
    /// name the same text, earlier comments claim the earlier occurrences.
    pub fn inject(&mut self, tree: &mut RenderTree, comments: &[Comment], now: Instant) -> InjectReport {
        self.suspend(tree);
        let report = self.inject_markers(tree, comments);
        self.resume_after(now);
        report
    }

    /// Remove every marker, merging wrapped text back into its surroundings.
    pub fn clear(&mut self, tree: &mut RenderTree, now: Instant) {
        self.suspend(tree);
        self.clear_markers(tree);
        self.resume_after(now);
    }

    /// `clear` followed by `inject` as one self-caused change.
    pub fn refresh(&mut self, tree: &mut RenderTree, comments: &[Comment], now: Instant) -> InjectReport {
        self.suspend(tree);
        self.pending_refresh = None;
        self.clear_markers(tree);
        let report = self.inject_markers(tree, comments);
        self.resume_after(now);
        report
    }

    /// Restyle an existing marker without relocating anything.
    pub fn update_style(
        &self,
        tree: &mut RenderTree,
        comment_id: CommentId,
        status: CommentStatus,
    ) -> StyleUpdate {
        match tree
            .find_marker(self.root, comment_id)
            .and_then(|id| tree.marker_mut(id))
        {
            Some(marker) => {
                marker.status = status;
                StyleUpdate::Updated
            }
            None => StyleUpdate::MarkerMissing,
        }
    }

    /// Apply a status change to the highlight, refreshing when the change
    /// adds or removes a marker or when the marker has gone missing.
    pub fn apply_status(
        &mut self,
        tree: &mut RenderTree,
        comments: &[Comment],
        comment_id: CommentId,
        status: CommentStatus,
        now: Instant,
    ) {
        if status.is_visible() && self.update_style(tree, comment_id, status) == StyleUpdate::Updated {
            return;
        }
        log::debug!("marker for {comment_id} needs a full refresh");
        self.refresh(tree, comments, now);
    }

    /// Route a pointer event that hit `target` to the marker around it.
    pub fn on_pointer(
        &self,
        tree: &mut RenderTree,
        target: NodeId,
        event: PointerEvent,
    ) -> Option<MarkerEvent> {
        let marker_id = std::iter::once(target)
            .chain(tree.ancestors(target))
            .find(|&id| tree.marker(id).is_some())?;
        let marker = tree.marker_mut(marker_id)?;

        match event {
            PointerEvent::Click => Some(MarkerEvent::Activated(marker.comment_id)),
            PointerEvent::Enter | PointerEvent::Leave => {
                marker.hovered = event == PointerEvent::Enter;
                Some(MarkerEvent::HoverChanged {
                    comment_id: marker.comment_id,
                    hovered: marker.hovered,
                })
            }
        }
    }

    /// Advance the observer: resume observation once settled, notice
    /// foreign structural changes, and run a refresh whose debounce window
    /// has elapsed. Returns the report of a refresh if one ran.
    pub fn tick(
        &mut self,
        tree: &mut RenderTree,
        comments: &[Comment],
        now: Instant,
    ) -> Option<InjectReport> {
        match self.state {
            ObserverState::Detached => return None,
            ObserverState::Settling { resume_at } if now >= resume_at => {
                // Anything logged here was caused by us.
                tree.take_mutations();
                tree.observe();
                self.state = ObserverState::Observing;
                if self.lost_markers(tree) {
                    log::debug!("markers were rebuilt away while settling");
                    self.schedule_refresh(now);
                }
            }
            ObserverState::Settling { .. } => return None,
            ObserverState::Observing => {
                if !tree.take_mutations().is_empty() {
                    self.schedule_refresh(now);
                }
            }
        }

        match self.pending_refresh {
            Some(due) if now >= due => Some(self.refresh(tree, comments, now)),
            _ => None,
        }
    }

    fn schedule_refresh(&mut self, now: Instant) {
        self.pending_refresh = Some(now + self.config.debounce);
    }

    fn suspend(&self, tree: &mut RenderTree) {
        tree.disconnect();
    }

    fn resume_after(&mut self, now: Instant) {
        if self.state != ObserverState::Detached {
            self.state = ObserverState::Settling {
                resume_at: now + self.config.settle,
            };
        }
    }

    fn lost_markers(&self, tree: &RenderTree) -> bool {
        self.placed.iter().any(|&(comment_id, node)| {
            !tree.is_attached(node) || tree.marker(node).is_none_or(|m| m.comment_id != comment_id)
        })
    }

    fn clear_markers(&mut self, tree: &mut RenderTree) {
        for marker in tree.markers(self.root) {
            tree.unwrap_marker(marker);
        }
        self.placed.clear();
    }

    fn inject_markers(&mut self, tree: &mut RenderTree, comments: &[Comment]) -> InjectReport {
        let mut ordered: Vec<&Comment> = comments.iter().filter(|c| c.wants_marker()).collect();
        ordered.sort_by_key(|c| (c.created_at, c.id));

        let mut report = InjectReport::default();
        for comment in ordered {
            if tree.find_marker(self.root, comment.id).is_some() {
                report.already_marked.push(comment.id);
                continue;
            }

            let placed = locate_anchor(tree, self.root, &comment.anchor).and_then(|found| {
                tree.wrap_text_range(
                    found.node,
                    found.range,
                    MarkerData::new(comment.id, comment.status),
                )
            });

            match placed {
                Some(marker) => {
                    self.placed.push((comment.id, marker));
                    report.placed.push(comment.id);
                }
                None => report.unlocated.push(comment.id),
            }
        }

        log::debug!(
            "injected {} markers ({} already present, {} not located)",
            report.placed.len(),
            report.already_marked.len(),
            report.unlocated.len()
        );
        report
    }
}
