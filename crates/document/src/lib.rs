//! Document merge engine
//!
//! Parses hierarchical text (headings, nested lists with checklist items,
//! paragraphs) into a tree, merges trees, folds duplicates and writes them
//! back out. Parsing never fails: unrecognized lines become paragraphs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod frontmatter;
pub mod merge;
pub mod node;
pub mod parse;
pub mod serialize;

pub use frontmatter::{join_front_matter, split_front_matter, FrontMatter, PARTS_KEY};
pub use merge::{dedupe, merge, merge_text, MergeOptions};
pub use node::{Document, DocumentNode, NodeKind};
pub use parse::parse;
pub use serialize::serialize;
