use pretty_assertions::assert_eq;
use rstest::rstest;
use relative_path::RelativePathBuf;
use specmark_engine::render::{LineSpan, RenderTree};
use specmark_engine::selection::{CapturedSelection, Point};
use specmark_engine::{
    Anchor, Comment, CommentId, HighlightConfig, HighlightInjector, NewComment,
    create_anchor_from_selection, render_markdown, to_html,
};
use std::time::{Duration, Instant};

fn comment(anchor: Anchor, created_at: i64) -> Comment {
    NewComment {
        document_path: RelativePathBuf::from("doc.md"),
        anchor,
        content: "note".to_string(),
        author: "jo".to_string(),
        parent_id: None,
    }
    .into_comment(CommentId::new(), created_at)
}

fn marked_ids(tree: &RenderTree) -> Vec<CommentId> {
    tree.markers(tree.root())
        .into_iter()
        .filter_map(|m| tree.marker(m).map(|d| d.comment_id))
        .collect()
}

fn block_lines(tree: &RenderTree, comment_id: CommentId) -> Option<LineSpan> {
    let marker = tree.find_marker(tree.root(), comment_id)?;
    tree.ancestors(marker)
        .find_map(|id| tree.element(id).and_then(|e| e.lines))
}

const TODOS: &str = "# Tasks\n\nbefore5\n\nTODO\n\nafter5\n\nmore filler\nbefore12\n\nTODO\n\nafter12\n";

#[test]
fn context_picks_the_later_of_two_identical_fragments() {
    let selection = CapturedSelection {
        text: "TODO".to_string(),
        start_line: 12,
        end_line: 12,
        rects: Vec::new(),
        pointer: Point::default(),
    };
    let anchor = create_anchor_from_selection(TODOS, Some(&selection)).unwrap();
    assert_eq!(anchor.context_before(), Some("before12"));
    assert_eq!(anchor.context_after(), Some("after12"));

    let mut tree = render_markdown(TODOS);
    let mut injector = HighlightInjector::new(tree.root(), HighlightConfig::default());
    let target = comment(anchor, 1);
    injector.inject(&mut tree, std::slice::from_ref(&target), Instant::now());

    assert_eq!(
        block_lines(&tree, target.id),
        Some(LineSpan { start: 12, end: 12 })
    );
}

#[rstest]
#[case::after_heading("# Alpha\n\nTODO\n\n# Beta\n\nTODO\n")]
#[case::after_list_item("- first\n\nTODO\n\n- second\n\nTODO\n")]
#[case::after_inline_markup("**one** here\n\nTODO\n\n**two** here\n\nTODO\n")]
fn context_from_marked_up_lines_still_disambiguates(#[case] source: &str) {
    let selection = CapturedSelection {
        text: "TODO".to_string(),
        start_line: 7,
        end_line: 7,
        rects: Vec::new(),
        pointer: Point::default(),
    };
    let anchor = create_anchor_from_selection(source, Some(&selection)).unwrap();

    let mut tree = render_markdown(source);
    let mut injector = HighlightInjector::new(tree.root(), HighlightConfig::default());
    let target = comment(anchor, 1);
    injector.inject(&mut tree, std::slice::from_ref(&target), Instant::now());

    assert_eq!(
        block_lines(&tree, target.id),
        Some(LineSpan { start: 7, end: 7 })
    );
}

#[test]
fn without_matching_context_the_first_occurrence_wins() {
    let anchor = Anchor::new(12, 12, "TODO")
        .unwrap()
        .with_context(Some("nowhere"), None);
    let mut tree = render_markdown(TODOS);
    let mut injector = HighlightInjector::new(tree.root(), HighlightConfig::default());
    let target = comment(anchor, 1);
    injector.inject(&mut tree, std::slice::from_ref(&target), Instant::now());

    assert_eq!(
        block_lines(&tree, target.id),
        Some(LineSpan { start: 5, end: 5 })
    );
}

#[test]
fn identical_fragments_are_claimed_in_creation_order() {
    let mut tree = render_markdown("alpha one alpha two alpha\n");
    let mut injector = HighlightInjector::new(tree.root(), HighlightConfig::default());
    let fragment = || Anchor::new(1, 1, "alpha").unwrap();
    let newest = comment(fragment(), 30);
    let oldest = comment(fragment(), 10);
    let middle = comment(fragment(), 20);
    let extra = comment(fragment(), 40);

    let report = injector.inject(
        &mut tree,
        &[newest.clone(), oldest.clone(), extra.clone(), middle.clone()],
        Instant::now(),
    );

    assert_eq!(marked_ids(&tree), vec![oldest.id, middle.id, newest.id]);
    assert_eq!(report.unlocated, vec![extra.id]);
    assert_eq!(tree.text_content(tree.root()), "alpha one alpha two alpha");
}

#[test]
fn clear_then_inject_reproduces_the_same_tree() {
    let source = "Intro *with emphasis* text.\n\n- first item\n- second item\n";
    let comments = vec![
        comment(Anchor::new(1, 1, "with").unwrap(), 1),
        comment(Anchor::new(3, 3, "first").unwrap(), 2),
        comment(Anchor::new(4, 4, "item").unwrap(), 3),
    ];
    let mut tree = render_markdown(source);
    let mut injector = HighlightInjector::new(tree.root(), HighlightConfig::default());
    let now = Instant::now();

    injector.inject(&mut tree, &comments, now);
    let injected = to_html(&tree);

    injector.clear(&mut tree, now);
    assert_eq!(to_html(&tree), to_html(&render_markdown(source)));

    injector.inject(&mut tree, &comments, now);
    assert_eq!(to_html(&tree), injected);

    injector.refresh(&mut tree, &comments, now);
    assert_eq!(to_html(&tree), injected);
}

#[test]
fn foreign_rebuild_is_debounced_and_bursts_coalesce() {
    let source = "Some reviewed text.\n";
    let comments = vec![comment(Anchor::new(1, 1, "reviewed").unwrap(), 1)];
    let config = HighlightConfig::default();
    let mut tree = render_markdown(source);
    let mut injector = HighlightInjector::new(tree.root(), config);
    injector.attach(&mut tree);

    let t0 = Instant::now();
    injector.inject(&mut tree, &comments, t0);
    let settled = t0 + config.settle;
    assert_eq!(injector.tick(&mut tree, &comments, settled), None);
    assert!(injector.is_observing());

    // Renderer rebuilds twice in quick succession.
    let t1 = settled + Duration::from_millis(20);
    let root = tree.root();
    tree.replace_children_with(root, &render_markdown(source));
    assert_eq!(injector.tick(&mut tree, &comments, t1), None);
    assert!(marked_ids(&tree).is_empty());

    let t2 = t1 + Duration::from_millis(50);
    tree.replace_children_with(root, &render_markdown(source));
    assert_eq!(injector.tick(&mut tree, &comments, t2), None);
    assert_eq!(injector.pending_refresh(), Some(t2 + config.debounce));

    // The first schedule was superseded.
    assert_eq!(injector.tick(&mut tree, &comments, t1 + config.debounce), None);

    let report = injector
        .tick(&mut tree, &comments, t2 + config.debounce)
        .unwrap();
    assert_eq!(report.placed, vec![comments[0].id]);
    assert_eq!(marked_ids(&tree), vec![comments[0].id]);

    // Our own refresh is not seen as a change once observation resumes.
    let resumed = t2 + config.debounce + config.settle;
    assert_eq!(injector.tick(&mut tree, &comments, resumed), None);
    assert_eq!(injector.pending_refresh(), None);
}

#[test]
fn rebuild_while_settling_is_caught_after_resume() {
    let source = "Some reviewed text.\n";
    let comments = vec![comment(Anchor::new(1, 1, "reviewed").unwrap(), 1)];
    let config = HighlightConfig::default();
    let mut tree = render_markdown(source);
    let mut injector = HighlightInjector::new(tree.root(), config);
    injector.attach(&mut tree);

    let t0 = Instant::now();
    injector.inject(&mut tree, &comments, t0);
    let root = tree.root();
    tree.replace_children_with(root, &render_markdown(source));

    let resumed = t0 + config.settle;
    assert_eq!(injector.tick(&mut tree, &comments, resumed), None);
    assert_eq!(injector.pending_refresh(), Some(resumed + config.debounce));

    let report = injector.tick(&mut tree, &comments, resumed + config.debounce);
    assert!(report.is_some());
    assert_eq!(marked_ids(&tree), vec![comments[0].id]);
}
