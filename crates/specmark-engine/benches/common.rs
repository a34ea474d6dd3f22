// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
use relative_path::RelativePathBuf;
use specmark_engine::selection::{CapturedSelection, Point};
use specmark_engine::{Comment, CommentId, NewComment, create_anchor_from_selection};

/// A spec-like document with `sections` sections. Every section repeats the
/// phrase "must be validated" so ambiguous anchors have many candidates.
#[allow(dead_code)]
pub fn generate_spec_document(sections: usize) -> String {
    let mut content = String::new();
    for section in 0..sections {
        content.push_str(&format!("## Requirement {section}\n\n"));
        content.push_str(&format!(
            "Input {section} must be validated before use.\nThe *result* of step {section} is cached.\n\n"
        ));
        content.push_str("- must be validated\n- logged on failure\n\n");
    }
    content
}

/// Lines per section of [`generate_spec_document`].
const SECTION_LINES: usize = 8;

/// One comment per section of `document`, anchored on the ambiguous phrase
/// the way a selection would be, so only context tells them apart.
#[allow(dead_code)]
pub fn generate_comments(document: &str, sections: usize) -> Vec<Comment> {
    (0..sections)
        .map(|section| {
            let line = section * SECTION_LINES + 3;
            let selection = CapturedSelection {
                text: "must be validated".to_string(),
                start_line: line,
                end_line: line,
                rects: Vec::new(),
                pointer: Point::default(),
            };
            let anchor = create_anchor_from_selection(document, Some(&selection)).unwrap();
            NewComment {
                document_path: RelativePathBuf::from("bench.md"),
                anchor,
                content: format!("comment {section}"),
                author: "bench".to_string(),
                parent_id: None,
            }
            .into_comment(CommentId::new(), section as i64)
        })
        .collect()
}
