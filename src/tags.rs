//! Hierarchical tags.
//!
//! Tags express hierarchy with a delimiter (default `|`):
//! `"animals|birds|owls"` sits under `"animals|birds"`, which sits under
//! `"animals"`. This module has two independent halves:
//!
//! - [`TagTree`]: a canonical nested view of a tag set, for display only.
//! - [`TagFilter`]: a selected filter value and its match test, used by
//!   [`crate::filter`].
//!
//! ## Display Tree
//!
//! ```text
//! animals|birds|owls        animals
//! animals|cats         →      birds
//! plants                        owls
//!                             cats
//!                           plants
//! ```
//!
//! Keys are sorted at every level. A node without children is a leaf.

use std::collections::{BTreeMap, BTreeSet};

/// Canonical nested form of a tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagTree {
    children: BTreeMap<String, TagTree>,
}

impl TagTree {
    /// Build the tree for `tags`, splitting each on `delimiter`.
    ///
    /// Empty segments (`"a||b"`, a trailing delimiter) are ignored.
    pub fn build<'a, I>(tags: I, delimiter: &str) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut root = TagTree::default();
        for tag in tags {
            let mut node = &mut root;
            for segment in tag.split(delimiter).filter(|s| !s.is_empty()) {
                node = node.children.entry(segment.to_string()).or_default();
            }
        }
        root
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child nodes in sorted order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &TagTree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Leaf segments directly under this node, sorted.
    pub fn leaves(&self) -> Vec<&str> {
        self.children()
            .filter(|(_, child)| child.is_leaf())
            .map(|(name, _)| name)
            .collect()
    }

    /// Look up the node for a full tag path.
    pub fn get(&self, tag: &str, delimiter: &str) -> Option<&TagTree> {
        tag.split(delimiter)
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    /// Render as indented lines, `indent` repeated once per depth.
    pub fn render(&self, indent: &str) -> Vec<String> {
        let mut lines = Vec::new();
        self.render_into(indent, 0, &mut lines);
        lines
    }

    fn render_into(&self, indent: &str, depth: usize, lines: &mut Vec<String>) {
        for (name, child) in &self.children {
            lines.push(format!("{}{}", indent.repeat(depth), name));
            child.render_into(indent, depth + 1, lines);
        }
    }
}

/// Distinct tags across a set of items, sorted.
pub fn collect_tags<'a, I>(tag_lists: I) -> BTreeSet<&'a str>
where
    I: IntoIterator<Item = &'a [String]>,
{
    tag_lists
        .into_iter()
        .flat_map(|tags| tags.iter().map(String::as_str))
        .collect()
}

/// One selected filter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    /// Matches a tag exactly.
    Leaf(String),
    /// Matches any tag starting with this prefix. The prefix ends with the
    /// delimiter, so `"A|"` matches `"A|B"` and `"A|B|C"` but not `"A"`.
    Parent(String),
}

impl TagFilter {
    /// Classify a selected label against the tags present in the gallery.
    ///
    /// A label that already ends with the delimiter is a parent. So is a label
    /// that branches: some known tag continues below it. Anything else is a
    /// leaf.
    pub fn classify<'a, I>(label: &str, known: I, delimiter: &str) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        if label.ends_with(delimiter) {
            return TagFilter::Parent(label.to_string());
        }
        let prefix = format!("{label}{delimiter}");
        if known.into_iter().any(|tag| tag.starts_with(&prefix)) {
            TagFilter::Parent(prefix)
        } else {
            TagFilter::Leaf(label.to_string())
        }
    }

    /// True if `tag` satisfies this filter.
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            TagFilter::Leaf(leaf) => tag == leaf,
            TagFilter::Parent(prefix) => tag.starts_with(prefix.as_str()),
        }
    }

    /// True if any of `tags` satisfies this filter.
    pub fn matches_any(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.matches(t))
    }

    pub fn is_parent(&self) -> bool {
        matches!(self, TagFilter::Parent(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            TagFilter::Leaf(s) | TagFilter::Parent(s) => s,
        }
    }
}
