//! Visible-set computation.
//!
//! An item is shown when it passes two independent gates:
//!
//! 1. **Tags**: for every selected [`TagFilter`], at least one of the item's
//!    tags matches it. Filters AND together; within one filter the item's tags
//!    OR together. No filters means everything passes.
//! 2. **Scope** (non-recursive mode only): the folder the item physically
//!    lives in, taken from its `src`, equals the current page's folder.
//!
//! Output keeps input order. Filtering is a pure function of its inputs, so
//! re-filtering the output with the same inputs returns it unchanged.

use crate::tags::{TagFilter, collect_tags};
use crate::types::ImageItem;
use std::collections::BTreeSet;
use url::{Position, Url};

/// The current page's folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    base: Url,
    folder: String,
}

impl Scope {
    /// Scope of a page URL. Query, fragment, and a trailing `index.html` are
    /// ignored.
    pub fn from_page(page: &Url) -> Self {
        let upto_path = &page[..Position::AfterPath];
        let folder = upto_path.strip_suffix("index.html").unwrap_or(upto_path);
        Self {
            base: page.clone(),
            folder: decode(folder),
        }
    }

    /// Scope from an absolute URL or a bare path like `/f/`.
    ///
    /// Bare paths are anchored at `file:///`, and item `src` values are
    /// resolved the same way, so path-only galleries compare consistently.
    pub fn parse(location: &str) -> Result<Self, url::ParseError> {
        let page = match Url::parse(location) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse("file:///")?.join(location)?
            }
            Err(err) => return Err(err),
        };
        Ok(Self::from_page(&page))
    }

    /// Decoded folder URL, ending with `/`.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// The URL relative item and image references resolve against.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// True if the item's file lives directly in this folder.
    pub fn contains(&self, item: &ImageItem) -> bool {
        match self.base.join(&item.src) {
            Ok(src) => containing_folder(&src) == self.folder,
            Err(err) => {
                tracing::debug!(src = %item.src, error = %err, "unresolvable image src");
                false
            }
        }
    }
}

/// Decoded folder of a resolved image URL: everything up to the last `/`.
pub fn containing_folder(src: &Url) -> String {
    let upto_path = &src[..Position::AfterPath];
    let folder = match upto_path.rfind('/') {
        Some(pos) => &upto_path[..=pos],
        None => upto_path,
    };
    decode(folder)
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Turn selected labels into filters, classifying each against the tags
/// present in `items`.
pub fn filters_for(selected: &BTreeSet<String>, items: &[ImageItem], delimiter: &str) -> Vec<TagFilter> {
    let known = collect_tags(items.iter().map(|i| i.tags.as_slice()));
    selected
        .iter()
        .map(|label| TagFilter::classify(label, known.iter().copied(), delimiter))
        .collect()
}

/// Keep only the labels that select something in `items`: a tag some item
/// carries, or a branch some item's tag continues below.
pub fn known_labels(
    selected: BTreeSet<String>,
    items: &[ImageItem],
    delimiter: &str,
) -> BTreeSet<String> {
    let known = collect_tags(items.iter().map(|i| i.tags.as_slice()));
    selected
        .into_iter()
        .filter(|label| {
            let filter = TagFilter::classify(label, known.iter().copied(), delimiter);
            let live = known.iter().any(|tag| filter.matches(tag));
            if !live {
                tracing::debug!(label = %label, "dropping unknown tag label");
            }
            live
        })
        .collect()
}

/// True if `item` passes every filter.
pub fn passes_filters(item: &ImageItem, filters: &[TagFilter]) -> bool {
    filters.iter().all(|f| f.matches_any(&item.tags))
}

/// Compute the visible subset of `items`.
pub fn compute_shown(
    items: &[ImageItem],
    filters: &[TagFilter],
    recursive: bool,
    scope: &Scope,
) -> Vec<ImageItem> {
    items
        .iter()
        .filter(|item| passes_filters(item, filters))
        .filter(|item| recursive || scope.contains(item))
        .cloned()
        .collect()
}
