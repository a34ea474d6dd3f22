use pulldown_cmark::{Event, Options, Parser, Tag};
use xi_rope::Rope;

use super::{Element, NodeId, RenderTree};

/// Render Markdown into a fresh [`RenderTree`].
///
/// Every block element carries the 1-based source line span it came from,
/// which is what selection capture walks up to. Soft and hard breaks become
/// `\n` so line positions inside a block can be recovered from its text.
pub fn render_markdown(source: &str) -> RenderTree {
    let lines = Rope::from(source);
    let line_of = |offset: usize| lines.line_of_offset(offset.min(lines.len())) + 1;

    let mut tree = RenderTree::new();
    let root = tree.root();
    let mut stack: Vec<NodeId> = vec![root];

    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;

    for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
        let parent = stack.last().copied().unwrap_or(root);
        match event {
            Event::Start(tag) => {
                let mut element = element_for(&tag);
                if is_block(&tag) {
                    let last = range.end.saturating_sub(1).max(range.start);
                    element = element.with_lines(line_of(range.start), line_of(last));
                }
                stack.push(tree.append_element(parent, element));
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => {
                tree.append_text(parent, &text);
            }
            Event::Code(code) => {
                let element = tree.append_element(parent, Element::new("code"));
                tree.append_text(element, &code);
            }
            Event::SoftBreak | Event::HardBreak => {
                tree.append_text(parent, "\n");
            }
            Event::Rule => {
                let line = line_of(range.start);
                tree.append_element(parent, Element::new("hr").with_lines(line, line));
            }
            Event::TaskListMarker(checked) => {
                tree.append_text(parent, if checked { "[x] " } else { "[ ] " });
            }
            Event::FootnoteReference(name) => {
                tree.append_text(parent, &format!("[{name}]"));
            }
            _ => {}
        }
    }

    tree
}

fn element_for(tag: &Tag<'_>) -> Element {
    match tag {
        Tag::Paragraph => Element::new("p"),
        Tag::Heading { level, .. } => Element::new(format!("h{}", *level as usize)),
        Tag::BlockQuote(_) => Element::new("blockquote"),
        Tag::CodeBlock(_) => Element::new("pre"),
        Tag::List(Some(start)) => Element::new("ol").with_attr("start", start.to_string()),
        Tag::List(None) => Element::new("ul"),
        Tag::Item => Element::new("li"),
        Tag::Table(_) => Element::new("table"),
        Tag::TableHead => Element::new("thead"),
        Tag::TableRow => Element::new("tr"),
        Tag::TableCell => Element::new("td"),
        Tag::Emphasis => Element::new("em"),
        Tag::Strong => Element::new("strong"),
        Tag::Strikethrough => Element::new("del"),
        Tag::Link { dest_url, .. } => Element::new("a").with_attr("href", dest_url.to_string()),
        Tag::Image { dest_url, .. } => Element::new("span")
            .with_attr("class", "image")
            .with_attr("data-src", dest_url.to_string()),
        Tag::FootnoteDefinition(name) => Element::new("div")
            .with_attr("class", "footnote")
            .with_attr("id", name.to_string()),
        Tag::HtmlBlock => Element::new("div"),
        _ => Element::new("span"),
    }
}

fn is_block(tag: &Tag<'_>) -> bool {
    matches!(
        tag,
        Tag::Paragraph
            | Tag::Heading { .. }
            | Tag::BlockQuote(_)
            | Tag::CodeBlock(_)
            | Tag::HtmlBlock
            | Tag::List(_)
            | Tag::Item
            | Tag::Table(_)
            | Tag::TableHead
            | Tag::TableRow
            | Tag::FootnoteDefinition(_)
    )
}
