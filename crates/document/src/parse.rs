//! Lenient document parser
//!
//! Single left-to-right scan over lines. Parsing never fails: any non-blank
//! line that is neither a heading nor a list item becomes a paragraph.
//!
//! Stack discipline:
//! - A heading closes open frames until the top is a heading of strictly
//!   lower depth (or the root), then opens itself.
//! - A list item closes deeper items and lists, then continues the list at
//!   its indent level or opens a new one beneath the current context.
//! - A paragraph closes open lists and attaches to the nearest heading.

use crate::node::{assign_positions, Document, DocumentNode, NodeKind};

/// Columns a tab counts for when computing indent levels
const TAB_WIDTH: usize = 4;

/// Parse document text into a tree
pub fn parse(text: &str) -> Document {
    // Frame 0 is the root pseudo-heading at depth 0.
    let mut stack: Vec<DocumentNode> = vec![DocumentNode::heading(0, "")];

    for raw in text.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        if let Some((level, title)) = parse_heading(line) {
            while stack.len() > 1 {
                match stack.last().map(|n| &n.kind) {
                    Some(NodeKind::Heading { level: open, .. }) if *open < level => break,
                    _ => close_top(&mut stack),
                }
            }
            stack.push(DocumentNode::heading(level, title));
        } else if let Some(item) = parse_item(line) {
            let level = match &item.kind {
                NodeKind::Item { level, .. } => *level,
                _ => 0,
            };
            while stack.len() > 1 {
                match stack.last().map(|n| &n.kind) {
                    Some(NodeKind::Item { level: open, .. }) if *open >= level => {
                        close_top(&mut stack)
                    }
                    Some(NodeKind::List { level: open }) if *open > level => close_top(&mut stack),
                    _ => break,
                }
            }
            let continues = matches!(
                stack.last().map(|n| &n.kind),
                Some(NodeKind::List { level: open }) if *open == level
            );
            if !continues {
                stack.push(DocumentNode::list(level));
            }
            stack.push(item);
        } else {
            while stack.len() > 1 {
                match stack.last().map(|n| &n.kind) {
                    Some(NodeKind::Item { .. }) | Some(NodeKind::List { .. }) => {
                        close_top(&mut stack)
                    }
                    _ => break,
                }
            }
            if let Some(top) = stack.last_mut() {
                top.children.push(DocumentNode::paragraph(line));
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }

    let mut children = stack.pop().map(|root| root.children).unwrap_or_default();
    assign_positions(&mut children);
    Document { children }
}

fn close_top(stack: &mut Vec<DocumentNode>) {
    if let Some(node) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }
}

/// `#`..`######` followed by whitespace (or nothing), after optional indent
fn parse_heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((hashes, rest.trim().to_string()))
}

/// Bullet or ordered marker followed by whitespace and text
fn parse_item(line: &str) -> Option<DocumentNode> {
    let indent: usize = line
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum();
    let body = line.trim_start();

    let marker_len = if body.starts_with(&['-', '*', '+'][..]) {
        1
    } else {
        let digits = body.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || digits > 9 {
            return None;
        }
        match body.as_bytes().get(digits) {
            Some(b'.') | Some(b')') => digits + 1,
            _ => return None,
        }
    };

    let rest = &body[marker_len..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();

    let (checked, text) = parse_checkbox(rest);
    Some(DocumentNode::new(NodeKind::Item {
        level: indent / 2,
        marker: body[..marker_len].to_string(),
        text: text.to_string(),
        checked,
    }))
}

fn parse_checkbox(rest: &str) -> (Option<bool>, &str) {
    let state = if rest.starts_with("[ ]") {
        Some(false)
    } else if rest.starts_with("[x]") || rest.starts_with("[X]") {
        Some(true)
    } else {
        None
    };

    match state {
        Some(checked) => {
            let after = &rest[3..];
            if after.is_empty() || after.starts_with(char::is_whitespace) {
                (Some(checked), after.trim())
            } else {
                (None, rest)
            }
        }
        None => (None, rest),
    }
}
