use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute, encode_text};

use super::{NodeData, NodeId, RenderTree};

const VOID_TAGS: &[&str] = &["hr", "br"];

/// Serialize the whole tree to HTML.
///
/// Line markers become `data-line-start`/`data-line-end` attributes and
/// markers become `<mark>` elements carrying the comment id and status.
pub fn to_html(tree: &RenderTree) -> String {
    let mut out = String::new();
    write_node(tree, tree.root(), &mut out);
    out
}

fn write_node(tree: &RenderTree, id: NodeId, out: &mut String) {
    match tree.data(id) {
        None => {}
        Some(NodeData::Text(text)) => out.push_str(&encode_text(text)),
        Some(NodeData::Element(element)) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attrs {
                let _ = write!(out, " {name}=\"{}\"", encode_double_quoted_attribute(value));
            }
            if let Some(lines) = element.lines {
                let _ = write!(
                    out,
                    " data-line-start=\"{}\" data-line-end=\"{}\"",
                    lines.start, lines.end
                );
            }
            if VOID_TAGS.contains(&element.tag.as_str()) {
                out.push_str(" />");
                return;
            }
            out.push('>');
            write_children(tree, id, out);
            let _ = write!(out, "</{}>", element.tag);
        }
        Some(NodeData::Marker(marker)) => {
            let _ = write!(
                out,
                "<mark class=\"comment-marker status-{}{}\" data-comment-id=\"{}\">",
                marker.status,
                if marker.hovered { " hovered" } else { "" },
                marker.comment_id
            );
            write_children(tree, id, out);
            out.push_str("</mark>");
        }
    }
}

fn write_children(tree: &RenderTree, id: NodeId, out: &mut String) {
    for &child in tree.children(id) {
        write_node(tree, child, out);
    }
}
