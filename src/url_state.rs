//! View state in the address bar.
//!
//! One canonical scheme, so every view is linkable:
//!
//! ```text
//! https://g.test/Travel/?recursive=true&pid=3#animals%7Cbirds,plants
//!                        ^^^^^^^^^^^^^^ ^^^^^ ^^^^^^^^^^^^^^^^^^^^^^
//!                        recursive mode  |     selected tags, comma-joined,
//!                                        |     each percent-encoded
//!                                        open viewer at item 3 (1-based)
//! ```
//!
//! - Tags live in the fragment. Each tag is percent-encoded before joining,
//!   so a `,` inside a tag survives the round trip. Raw (unencoded)
//!   fragments from older links decode too.
//! - `recursive` is a presence flag: any value turns it on.
//! - `pid` is 1-based; `0` or a non-number decodes to "no viewer".
//! - Unrelated query parameters are left alone. A default state adds nothing:
//!   no `?`, no `#`.

use std::collections::BTreeSet;
use url::Url;

pub const RECURSIVE_PARAM: &str = "recursive";
pub const PID_PARAM: &str = "pid";

/// The part of the view state that round-trips through the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlState {
    pub tags: BTreeSet<String>,
    pub recursive: bool,
    /// 0-based index into the shown list.
    pub open_index: Option<usize>,
}

impl UrlState {
    /// Decode the view state carried by `url`.
    pub fn from_url(url: &Url) -> Self {
        let tags = url.fragment().map(decode_tags).unwrap_or_default();
        let recursive = url.query_pairs().any(|(k, _)| k == RECURSIVE_PARAM);
        let open_index = url
            .query_pairs()
            .find(|(k, _)| k == PID_PARAM)
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .and_then(|pid| pid.checked_sub(1));
        Self {
            tags,
            recursive,
            open_index,
        }
    }

    /// Write this state onto `url`, replacing whatever state it carried.
    pub fn apply(&self, url: &Url) -> Url {
        let mut out = url.clone();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != RECURSIVE_PARAM && k != PID_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        out.set_query(None);
        if !kept.is_empty() || self.recursive || self.open_index.is_some() {
            let mut pairs = out.query_pairs_mut();
            pairs.extend_pairs(kept);
            if self.recursive {
                pairs.append_pair(RECURSIVE_PARAM, "true");
            }
            if let Some(index) = self.open_index {
                pairs.append_pair(PID_PARAM, &(index + 1).to_string());
            }
        }

        if self.tags.is_empty() {
            out.set_fragment(None);
        } else {
            out.set_fragment(Some(&encode_tags(&self.tags)));
        }
        out
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// The page URL with query and fragment removed.
pub fn canonical_page(url: &Url) -> Url {
    let mut out = url.clone();
    out.set_query(None);
    out.set_fragment(None);
    out
}

/// Comma-join tags, percent-encoding each.
pub fn encode_tags(tags: &BTreeSet<String>) -> String {
    tags.iter()
        .map(|t| urlencoding::encode(t).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`encode_tags`]. Empty entries are dropped.
pub fn decode_tags(fragment: &str) -> BTreeSet<String> {
    fragment
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect()
}
