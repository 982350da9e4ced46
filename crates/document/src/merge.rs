//! Structural merge and dedupe
//!
//! `merge(base, update, options)` keeps everything in `base` and injects
//! what `update` adds or changes:
//!
//! 1. Each update node is matched against the base siblings by identity:
//!    headings by `(level, text)`, items by normalized text, lists by
//!    nesting level, paragraphs by trimmed text.
//! 2. Update nodes without an identity match fall back to the base node at
//!    the same `position`, provided it is the same kind and not already
//!    matched.
//! 3. Matched nodes are replaced wholesale (`replace`) or merged: text is
//!    overwritten when it differs, `checked` is OR'ed (true wins), and
//!    children merge recursively.
//! 4. Unmatched nodes are spliced in at their position if it is in bounds,
//!    otherwise appended.
//!
//! Positions are reassigned afterwards. With `dedupe`, a post-pass folds
//! duplicate headings, items and same-level sibling lists together.

use crate::frontmatter::{join_front_matter, split_front_matter};
use crate::node::{assign_positions, Document, DocumentNode, NodeKind};
use crate::parse::parse;
use crate::serialize::serialize;

/// Merge behavior switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Replace matched subtrees wholesale instead of merging into them
    pub replace: bool,
    /// Fold duplicate headings and items after merging
    pub dedupe: bool,
}

impl MergeOptions {
    /// Merge with dedupe enabled
    pub fn deduped() -> Self {
        MergeOptions {
            replace: false,
            dedupe: true,
        }
    }

    /// Replace matched subtrees
    pub fn replacing() -> Self {
        MergeOptions {
            replace: true,
            dedupe: false,
        }
    }
}

/// Merge `update` into a copy of `base`
pub fn merge(base: &Document, update: &Document, options: MergeOptions) -> Document {
    let mut children = merge_nodes(&base.children, &update.children, options);
    if options.dedupe {
        children = dedupe_nodes(children);
    }
    Document { children }
}

/// Merge two document texts, front matter included
///
/// Front matter keys from `update` override those in `base`.
pub fn merge_text(base: &str, update: &str, options: MergeOptions) -> String {
    let (base_front, base_body) = split_front_matter(base);
    let (update_front, update_body) = split_front_matter(update);
    let front = match (base_front, update_front) {
        (Some(mut front), Some(overlay)) => {
            front.merge(&overlay);
            Some(front)
        }
        (front, overlay) => front.or(overlay),
    };
    let merged = merge(&parse(base_body), &parse(update_body), options);
    join_front_matter(front.as_ref(), &serialize(&merged))
}

/// Fold duplicate headings, items and same-level lists, recursively
pub fn dedupe(doc: &Document) -> Document {
    Document {
        children: dedupe_nodes(doc.children.clone()),
    }
}

fn merge_nodes(
    base: &[DocumentNode],
    update: &[DocumentNode],
    options: MergeOptions,
) -> Vec<DocumentNode> {
    let mut result = base.to_vec();
    let mut claimed = vec![false; result.len()];
    let mut targets: Vec<Option<usize>> = vec![None; update.len()];

    // Identity matches first, preferring base nodes nobody claimed yet.
    for (ui, node) in update.iter().enumerate() {
        let found = result
            .iter()
            .enumerate()
            .position(|(i, b)| !claimed[i] && identity_matches(b, node))
            .or_else(|| result.iter().position(|b| identity_matches(b, node)));
        if let Some(i) = found {
            claimed[i] = true;
            targets[ui] = Some(i);
        }
    }

    // Position fallback for whatever is left.
    for (ui, node) in update.iter().enumerate() {
        if targets[ui].is_some() {
            continue;
        }
        let p = node.position;
        if p < result.len() && !claimed[p] && result[p].same_kind(node) {
            claimed[p] = true;
            targets[ui] = Some(p);
        }
    }

    let mut inserts = Vec::new();
    for (ui, node) in update.iter().enumerate() {
        match targets[ui] {
            Some(i) if options.replace => result[i] = node.clone(),
            Some(i) => merge_into(&mut result[i], node, options),
            None => inserts.push(node.clone()),
        }
    }

    for node in inserts {
        if node.position < result.len() {
            let at = node.position;
            result.insert(at, node);
        } else {
            result.push(node);
        }
    }

    assign_positions(&mut result);
    result
}

fn merge_into(target: &mut DocumentNode, update: &DocumentNode, options: MergeOptions) {
    match (&mut target.kind, &update.kind) {
        (NodeKind::Heading { text, .. }, NodeKind::Heading { text: new, .. })
        | (NodeKind::Paragraph { text }, NodeKind::Paragraph { text: new }) => {
            if text != new {
                *text = new.clone();
            }
        }
        (
            NodeKind::Item { text, checked, .. },
            NodeKind::Item {
                text: new,
                checked: new_checked,
                ..
            },
        ) => {
            if text != new {
                *text = new.clone();
            }
            *checked = or_checked(*checked, *new_checked);
        }
        _ => {}
    }
    target.children = merge_nodes(&target.children, &update.children, options);
}

/// True wins and never reverts; otherwise keep whichever side is set
fn or_checked(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    if a == Some(true) || b == Some(true) {
        Some(true)
    } else {
        a.or(b)
    }
}

fn identity_matches(base: &DocumentNode, update: &DocumentNode) -> bool {
    match (&base.kind, &update.kind) {
        (NodeKind::Heading { level: a, text: t }, NodeKind::Heading { level: b, text: u }) => {
            a == b && t.trim() == u.trim()
        }
        (NodeKind::Item { text: t, .. }, NodeKind::Item { text: u, .. }) => {
            normalize(t) == normalize(u)
        }
        (NodeKind::List { level: a }, NodeKind::List { level: b }) => a == b,
        (NodeKind::Paragraph { text: t }, NodeKind::Paragraph { text: u }) => t.trim() == u.trim(),
        _ => false,
    }
}

/// Lowercase, whitespace-collapsed item text
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_duplicate(kept: &DocumentNode, node: &DocumentNode) -> bool {
    match (&kept.kind, &node.kind) {
        (NodeKind::Heading { level: a, text: t }, NodeKind::Heading { level: b, text: u }) => {
            a == b && t.trim() == u.trim()
        }
        (NodeKind::Item { text: t, .. }, NodeKind::Item { text: u, .. }) => {
            normalize(t) == normalize(u)
        }
        (NodeKind::List { level: a }, NodeKind::List { level: b }) => a == b,
        _ => false,
    }
}

fn absorb(kept: &mut DocumentNode, dup: DocumentNode) {
    match (&mut kept.kind, dup.kind) {
        (NodeKind::Heading { .. }, NodeKind::Heading { .. }) => {
            kept.children = merge_nodes(&kept.children, &dup.children, MergeOptions::replacing());
        }
        (NodeKind::Item { checked, .. }, NodeKind::Item { checked: other, .. }) => {
            *checked = or_checked(*checked, other);
            kept.children = merge_nodes(&kept.children, &dup.children, MergeOptions::default());
        }
        (NodeKind::List { .. }, NodeKind::List { .. }) => {
            kept.children.extend(dup.children);
        }
        _ => {}
    }
}

fn dedupe_nodes(nodes: Vec<DocumentNode>) -> Vec<DocumentNode> {
    let mut out: Vec<DocumentNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match out.iter().position(|kept| is_duplicate(kept, &node)) {
            Some(i) => absorb(&mut out[i], node),
            None => out.push(node),
        }
    }
    for node in out.iter_mut() {
        let children = std::mem::take(&mut node.children);
        node.children = dedupe_nodes(children);
    }
    assign_positions(&mut out);
    out
}
