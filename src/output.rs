//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every item leads with its positional index (1-based, the same number the
//! `pid` URL parameter uses) and its title. Where it physically lives and
//! what it carries are indented context lines underneath.
//!
//! # Output Format
//!
//! ## View
//!
//! ```text
//! Shown 2 of 4 (recursive, tags: animals)
//! 001 Owl at dusk
//!     Source: owl.jpg
//!     Tags: animals|birds|owls
//!     Originals: TIFF, RAW
//! 002 (crow.jpg)
//!     Source: sub/crow.jpg
//!     Tags: animals|birds
//!
//! Folders
//! 001 Sub
//!     Manifest: sub/.metadata.json
//! ```
//!
//! The folder section is omitted in recursive mode.
//!
//! ## Tags
//!
//! ```text
//! animals
//!     [x] birds
//!         owls
//!     cats
//! plants
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure.
//! [`TextRenderer`] and [`TextViewer`] plug the printers into a
//! [`Session`](crate::session::Session).

use crate::session::{Renderer, ViewState, Viewer};
use crate::tags::TagTree;
use crate::types::ImageItem;
use std::collections::BTreeSet;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Format an item line: titled images show title, untitled show name in parens.
///
/// ```text
/// 001 The Sunset        // titled
/// 001 (sunset.jpg)      // untitled
/// ```
fn item_line(position: usize, item: &ImageItem) -> String {
    match item.title.as_deref() {
        Some(t) if !t.is_empty() => format!("{} {}", format_index(position), t),
        _ => format!("{} ({})", format_index(position), item.name),
    }
}

fn originals(item: &ImageItem) -> Option<String> {
    let kinds: Vec<&str> = [("TIFF", &item.tiff), ("RAW", &item.raw)]
        .into_iter()
        .filter(|(_, link)| link.as_deref().is_some_and(|l| !l.is_empty()))
        .map(|(kind, _)| kind)
        .collect();
    (!kinds.is_empty()).then(|| kinds.join(", "))
}

// ============================================================================
// View
// ============================================================================

/// One-line summary of the view.
pub fn format_summary(view: &ViewState) -> String {
    let mut detail = Vec::new();
    if view.recursive {
        detail.push("recursive".to_string());
    }
    if !view.selected_tags.is_empty() {
        let tags: Vec<&str> = view.selected_tags.iter().map(String::as_str).collect();
        detail.push(format!("tags: {}", tags.join(", ")));
    }
    let head = format!("Shown {} of {}", view.shown.len(), view.items.len());
    if detail.is_empty() {
        head
    } else {
        format!("{} ({})", head, detail.join(", "))
    }
}

/// Format the shown items and, outside recursive mode, the subfolders.
pub fn format_view(view: &ViewState) -> Vec<String> {
    let mut lines = vec![format_summary(view)];

    for (i, item) in view.shown.iter().enumerate() {
        lines.push(item_line(i + 1, item));
        lines.push(format!("{}Source: {}", indent(1), item.src));
        if !item.tags.is_empty() {
            lines.push(format!("{}Tags: {}", indent(1), item.tags.join(", ")));
        }
        if let Some(kinds) = originals(item) {
            lines.push(format!("{}Originals: {}", indent(1), kinds));
        }
    }

    if view.folders_visible() && !view.subfolders.is_empty() {
        lines.push(String::new());
        lines.push("Folders".to_string());
        for (i, folder) in view.subfolders.iter().enumerate() {
            let name = folder.name.as_deref().unwrap_or(&folder.url);
            lines.push(format!("{} {}", format_index(i + 1), name));
            match folder.metadata.as_deref() {
                Some(metadata) => lines.push(format!("{}Manifest: {}", indent(1), metadata)),
                None => lines.push(format!("{}(no manifest)", indent(1))),
            }
        }
    }

    lines
}

pub fn print_view(view: &ViewState) {
    for line in format_view(view) {
        println!("{}", line);
    }
}

/// Viewer line for the item at `index` of `shown`.
pub fn format_open(shown: &[ImageItem], index: usize) -> Vec<String> {
    match shown.get(index) {
        Some(item) => vec![
            format!("Viewer → {}", item_line(index + 1, item)),
            format!("{}Full size: {}", indent(1), item.src),
        ],
        None => Vec::new(),
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Format a tag tree, marking selected tags with `[x]`.
///
/// Selection is matched on the full delimited path, so `birds` under
/// `animals` is marked when `animals|birds` is selected.
pub fn format_tag_tree(tree: &TagTree, selected: &BTreeSet<String>, delimiter: &str) -> Vec<String> {
    let mut lines = Vec::new();
    walk_tags(tree, "", 0, selected, delimiter, &mut lines);
    lines
}

fn walk_tags(
    node: &TagTree,
    prefix: &str,
    depth: usize,
    selected: &BTreeSet<String>,
    delimiter: &str,
    lines: &mut Vec<String>,
) {
    for (name, child) in node.children() {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}{delimiter}{name}")
        };
        let mark = if selected.contains(&path) { "[x] " } else { "" };
        lines.push(format!("{}{}{}", indent(depth), mark, name));
        walk_tags(child, &path, depth + 1, selected, delimiter, lines);
    }
}

pub fn print_tag_tree(tree: &TagTree, selected: &BTreeSet<String>, delimiter: &str) {
    let lines = format_tag_tree(tree, selected, delimiter);
    if lines.is_empty() {
        println!("(no tags)");
    }
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Session collaborators
// ============================================================================

/// Prints the view every time the session renders.
#[derive(Debug, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn render(&mut self, view: &ViewState) {
        print_view(view);
    }
}

/// Prints which item the viewer opened at.
#[derive(Debug, Default)]
pub struct TextViewer;

impl Viewer for TextViewer {
    fn open(&mut self, shown: &[ImageItem], index: usize) {
        for line in format_open(shown, index) {
            println!("{}", line);
        }
    }
}
