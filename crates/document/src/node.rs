//! Document tree types
//!
//! A document is an ordered forest of [`DocumentNode`]s. Each node owns its
//! children exclusively. The payload is a closed set of kinds:
//!
//! - `Heading`: `#`-marked title at depth 1..=6, owns the content below it
//! - `List`: transparent container for items at one indentation level
//! - `Item`: list entry, optionally a checklist item
//! - `Paragraph`: any other non-blank line, kept verbatim
//!
//! `position` is the node's index among its siblings. It is reassigned after
//! every parse, merge and dedupe pass so siblings are always numbered 0..n.

/// Node payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Heading at `level` (number of `#`)
    Heading {
        /// Heading depth, 1..=6
        level: usize,
        /// Heading text without markers
        text: String,
    },
    /// Container for items at one nesting level
    List {
        /// Nesting level (indent columns / 2)
        level: usize,
    },
    /// List item
    Item {
        /// Nesting level (indent columns / 2)
        level: usize,
        /// Bullet marker as written: `-`, `*`, `+`, `1.`, `2)`
        marker: String,
        /// Item text without marker or checkbox
        text: String,
        /// Checkbox state: `None` when the item has no checkbox
        checked: Option<bool>,
    },
    /// Verbatim line
    Paragraph {
        /// Line content with trailing whitespace removed
        text: String,
    },
}

/// One node of a document tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentNode {
    /// Node payload
    pub kind: NodeKind,
    /// Index among siblings
    pub position: usize,
    /// Child nodes, in order
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    /// Create a node with no children at position 0
    pub fn new(kind: NodeKind) -> Self {
        DocumentNode {
            kind,
            position: 0,
            children: Vec::new(),
        }
    }

    /// Heading node
    pub fn heading(level: usize, text: impl Into<String>) -> Self {
        Self::new(NodeKind::Heading {
            level,
            text: text.into(),
        })
    }

    /// List container node
    pub fn list(level: usize) -> Self {
        Self::new(NodeKind::List { level })
    }

    /// Plain `-` list item
    pub fn item(level: usize, text: impl Into<String>, checked: Option<bool>) -> Self {
        Self::new(NodeKind::Item {
            level,
            marker: "-".to_string(),
            text: text.into(),
            checked,
        })
    }

    /// Paragraph node
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Paragraph { text: text.into() })
    }

    /// Attach children, builder style
    pub fn with_children(mut self, children: Vec<DocumentNode>) -> Self {
        self.children = children;
        assign_positions(&mut self.children);
        self
    }

    /// Node text, if the kind carries any
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Heading { text, .. }
            | NodeKind::Item { text, .. }
            | NodeKind::Paragraph { text } => Some(text),
            NodeKind::List { .. } => None,
        }
    }

    /// Checkbox state of an item
    pub fn checked(&self) -> Option<bool> {
        match &self.kind {
            NodeKind::Item { checked, .. } => *checked,
            _ => None,
        }
    }

    /// Whether both nodes have the same kind (headings must also share a level)
    pub fn same_kind(&self, other: &DocumentNode) -> bool {
        match (&self.kind, &other.kind) {
            (NodeKind::Heading { level: a, .. }, NodeKind::Heading { level: b, .. }) => a == b,
            (NodeKind::List { .. }, NodeKind::List { .. })
            | (NodeKind::Item { .. }, NodeKind::Item { .. })
            | (NodeKind::Paragraph { .. }, NodeKind::Paragraph { .. }) => true,
            _ => false,
        }
    }

    /// Total number of nodes in this subtree, including itself
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(DocumentNode::subtree_len).sum::<usize>()
    }
}

/// Parsed document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// Top-level nodes
    pub children: Vec<DocumentNode>,
}

impl Document {
    /// Create a document from top-level nodes
    pub fn new(mut children: Vec<DocumentNode>) -> Self {
        assign_positions(&mut children);
        Document { children }
    }

    /// Whether the document has no nodes
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Text of the first heading, depth-first
    pub fn first_heading(&self) -> Option<&str> {
        find_first(&self.children, &|n| matches!(n.kind, NodeKind::Heading { .. }))
            .and_then(DocumentNode::text)
    }

    /// Text of the first non-empty paragraph, depth-first
    pub fn first_paragraph(&self) -> Option<&str> {
        find_first(&self.children, &|n| match &n.kind {
            NodeKind::Paragraph { text } => !text.trim().is_empty(),
            _ => false,
        })
        .and_then(DocumentNode::text)
        .map(str::trim)
    }

    /// Visit every node depth-first
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a DocumentNode)) {
        fn visit<'a>(nodes: &'a [DocumentNode], f: &mut dyn FnMut(&'a DocumentNode)) {
            for node in nodes {
                f(node);
                visit(&node.children, f);
            }
        }
        visit(&self.children, f);
    }
}

fn find_first<'a>(
    nodes: &'a [DocumentNode],
    pred: &dyn Fn(&DocumentNode) -> bool,
) -> Option<&'a DocumentNode> {
    for node in nodes {
        if pred(node) {
            return Some(node);
        }
        if let Some(found) = find_first(&node.children, pred) {
            return Some(found);
        }
    }
    None
}

/// Renumber siblings 0..n, recursively
pub fn assign_positions(nodes: &mut [DocumentNode]) {
    for (i, node) in nodes.iter_mut().enumerate() {
        node.position = i;
        assign_positions(&mut node.children);
    }
}
