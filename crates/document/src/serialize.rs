//! Tree to text
//!
//! Depth-first walk. Headings get `#` markers at their level and a blank
//! line before them, items are indented two spaces per level, paragraphs are
//! written verbatim, and list containers emit nothing of their own.

use crate::node::{Document, DocumentNode, NodeKind};

/// Serialize a document tree to text
///
/// Output ends with a newline unless the document is empty.
pub fn serialize(doc: &Document) -> String {
    let mut lines: Vec<String> = Vec::new();
    render(&doc.children, &mut lines);
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn render(nodes: &[DocumentNode], lines: &mut Vec<String>) {
    for node in nodes {
        match &node.kind {
            NodeKind::Heading { level, text } => {
                if lines.last().map_or(false, |l| !l.is_empty()) {
                    lines.push(String::new());
                }
                let mut line = "#".repeat((*level).max(1));
                if !text.is_empty() {
                    line.push(' ');
                    line.push_str(text);
                }
                lines.push(line);
            }
            NodeKind::List { .. } => {}
            NodeKind::Item {
                level,
                marker,
                text,
                checked,
            } => {
                let mut line = "  ".repeat(*level);
                line.push_str(marker);
                match checked {
                    Some(true) => line.push_str(" [x]"),
                    Some(false) => line.push_str(" [ ]"),
                    None => {}
                }
                if !text.is_empty() || checked.is_none() {
                    line.push(' ');
                    line.push_str(text);
                }
                lines.push(line);
            }
            NodeKind::Paragraph { text } => lines.push(text.clone()),
        }
        render(&node.children, lines);
    }
}
