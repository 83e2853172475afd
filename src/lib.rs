//! # Gallery State
//!
//! The view-state engine behind a static, manifest-driven photo gallery.
//! Every folder of the published site carries a JSON manifest describing its
//! images and subfolders; this crate loads those manifests, filters them by
//! hierarchical tags, keeps the view in sync with the page URL, and warms the
//! cache for the image under the pointer.
//!
//! # Architecture: Pure Core, Stateful Shell
//!
//! ```text
//!   URL ──► url_state ──┐
//!                       ▼
//!  manifests ──► manifest ──► aggregate ──► items ──► filter ──► shown ──► renderer
//!                                            │          ▲
//!                                            └► tags ───┘
//!                       ▲
//!   commands ──► debounce ──► session ──► history.replace_state(URL)
//!                               └────────► prefetch (hover / leave)
//! ```
//!
//! Everything left of [`session`] is a pure function or a narrow async
//! fetch. The session is the only place state changes, and it changes it in
//! exactly one way: recompute `shown` from `items`, then write the URL.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Manifest wire types: `ImageItem`, `FolderDescriptor`, `Manifest` |
//! | [`manifest`] | `ManifestSource` trait and the HTTP/file store |
//! | [`policy`] | Which fetch failures surface and which are swallowed |
//! | [`aggregate`] | Breadth-first, deduplicating merge of a folder tree |
//! | [`tags`] | Tag hierarchy display tree and filter matching |
//! | [`filter`] | Visible-set computation: tag gate and folder scope |
//! | [`url_state`] | View state ⇄ URL query and fragment |
//! | [`debounce`] | Trailing-edge debouncer for rapid toggles |
//! | [`prefetch`] | Abortable hover prefetch, one request per index |
//! | [`session`] | Command handlers, reload supersession, event loop |
//! | [`config`] | `config.toml` loading, validation, and stock defaults |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Breadth-First, Shallowest Wins
//!
//! Recursive mode walks the folder tree level by level. All manifests of one
//! level are fetched concurrently, then merged in declaration order. An image
//! reachable from several folders is kept once, at its shallowest position.
//! A visited set keyed by folder URL makes cycles and diamonds harmless.
//!
//! ## Parent Tags Match Descendants Only
//!
//! Selecting a tag that has children (`animals` when `animals|birds` exists)
//! matches everything below it but not an image tagged with the bare parent.
//! Parenthood is decided against the tags actually present in the gallery.
//!
//! ## One URL Scheme
//!
//! Tags live in the fragment, each percent-encoded and comma-joined;
//! `recursive` and the 1-based `pid` live in the query. The URL is rewritten
//! with history replacement, so filtering never grows the back stack. See
//! [`url_state`].
//!
//! ## Newest Reload Wins
//!
//! A reload is issued as a numbered ticket. When a ticket finishes after a
//! newer one was issued, its result is dropped rather than merged.
//! The event loop runs reloads in the background, so hover and open stay
//! responsive while manifests are in flight.
//!
//! ## Failure Policy
//!
//! A failing root manifest aborts the cycle and leaves the previous view up.
//! A failing descendant drops only its own subtree. A failing prefetch is
//! invisible. Nothing is retried. See [`policy`].

pub mod aggregate;
pub mod config;
pub mod debounce;
pub mod filter;
pub mod manifest;
pub mod output;
pub mod policy;
pub mod prefetch;
pub mod session;
pub mod tags;
pub mod types;
pub mod url_state;

#[cfg(test)]
pub(crate) mod test_helpers;
