//! The stateful shell around the pure parts.
//!
//! A [`Session`] owns the page's [`ViewState`] and is the only thing that
//! mutates it. Every user action is a command handler:
//!
//! | Handler | Fetches | Effect |
//! |---------|---------|--------|
//! | [`Session::on_load`] | yes | decode URL, load, filter, auto-open `pid` |
//! | [`Session::on_filter_changed`] / [`Session::on_tag_toggled`] | no | refilter |
//! | [`Session::on_recursive_toggled`] | yes | aggregate or reload current folder |
//! | [`Session::on_reset`] | yes | clear everything, canonical URL, reload |
//! | [`Session::on_open`] / [`Session::on_viewer_closed`] | no | viewer + `pid` |
//! | [`Session::on_hover`] / [`Session::on_leave`] | prefetch | warm / abort |
//!
//! After every change the URL is rewritten with [`History::replace_state`],
//! never pushed, so toggling filters does not grow the browser history.
//!
//! ## Reload Cycle
//!
//! A reload is split in three so a newer reload can supersede an older one:
//!
//! ```text
//! begin_reload()  →  ReloadTicket   (bumps the generation, captures inputs)
//! ticket.run()    →  Loaded         (network only, no access to the session)
//! finish_reload() →  applied, or discarded if a newer ticket was issued
//! ```
//!
//! Two aggregations are never merged: only the newest generation is applied.
//! [`Session::run`] keeps reloads in a `JoinSet`, so hover, leave and open
//! commands are still handled while the network is busy.

use crate::aggregate::FolderAggregator;
use crate::config::ViewerConfig;
use crate::debounce::Debouncer;
use crate::filter::{self, Scope};
use crate::manifest::{self, ManifestError, ManifestSource};
use crate::policy::{self, FetchRole};
use crate::prefetch::{ImageWarmer, PrefetchManager};
use crate::tags::{TagTree, collect_tags};
use crate::types::{FolderDescriptor, ImageItem};
use crate::url_state::{UrlState, canonical_page};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use url::Url;

/// Everything the page currently knows and shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// All loaded items (one folder, or an aggregated tree).
    pub items: Vec<ImageItem>,
    /// Visible subset of `items`, always recomputed, never edited.
    pub shown: Vec<ImageItem>,
    /// The current folder's subfolders.
    pub subfolders: Vec<FolderDescriptor>,
    pub selected_tags: BTreeSet<String>,
    pub recursive: bool,
    /// Index into `shown` the viewer is open at.
    pub active_index: Option<usize>,
}

impl ViewState {
    /// The folder list is hidden while descendants are merged in.
    pub fn folders_visible(&self) -> bool {
        !self.recursive
    }

    pub fn url_state(&self) -> UrlState {
        UrlState {
            tags: self.selected_tags.clone(),
            recursive: self.recursive,
            open_index: self.active_index,
        }
    }

    /// Display tree of every tag on the loaded items.
    pub fn tag_tree(&self, delimiter: &str) -> TagTree {
        let tags = collect_tags(self.items.iter().map(|i| i.tags.as_slice()));
        TagTree::build(tags, delimiter)
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// The address bar. Only replacement is ever used.
pub trait History {
    fn replace_state(&mut self, url: &Url);
}

/// Full-screen viewer. Takes over presentation; nothing comes back.
pub trait Viewer {
    fn open(&mut self, shown: &[ImageItem], index: usize);
}

/// Grid renderer. Called after every recompute.
pub trait Renderer {
    fn render(&mut self, view: &ViewState);
}

struct Detached;

impl History for Detached {
    fn replace_state(&mut self, _url: &Url) {}
}

impl Viewer for Detached {
    fn open(&mut self, _shown: &[ImageItem], _index: usize) {}
}

impl Renderer for Detached {
    fn render(&mut self, _view: &ViewState) {}
}

// =============================================================================
// Reload tickets
// =============================================================================

/// Inputs of one reload, detached from the session.
#[derive(Debug, Clone)]
pub struct ReloadTicket {
    generation: u64,
    manifest: Url,
    base: Url,
    recursive: bool,
}

/// Outcome of [`ReloadTicket::run`], to be handed to [`Session::finish_reload`].
#[derive(Debug)]
pub struct Loaded {
    generation: u64,
    result: Result<(Vec<ImageItem>, Vec<FolderDescriptor>), ManifestError>,
}

impl ReloadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fetch the current folder, or the whole tree in recursive mode.
    pub async fn run<S: ManifestSource>(self, store: Arc<S>) -> Loaded {
        let result = if self.recursive {
            FolderAggregator::new(store, self.base)
                .aggregate(self.manifest)
                .await
                .map(|agg| (agg.items, agg.subfolders))
        } else {
            let fetched = store.fetch(self.manifest.clone()).await;
            policy::settle(FetchRole::Root, &self.manifest, fetched)
                .map(|m| m.map(|m| (m.images, m.subfolders)).unwrap_or_default())
        };
        Loaded {
            generation: self.generation,
            result,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// A user action, as delivered to [`Session::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ToggleTag(String),
    SetTags(BTreeSet<String>),
    SetRecursive(bool),
    Reset,
    Open(usize),
    CloseViewer,
    Hover(usize),
    Leave(usize),
}

pub struct Session<S, W> {
    config: ViewerConfig,
    location: Url,
    scope: Scope,
    manifest: Url,
    store: Arc<S>,
    prefetch: Option<PrefetchManager<W>>,
    state: ViewState,
    /// Labels decoded from the URL, applied once the first load lands.
    restore: Option<BTreeSet<String>>,
    generation: u64,
    history: Box<dyn History>,
    viewer: Box<dyn Viewer>,
    renderer: Box<dyn Renderer>,
}

impl<S: ManifestSource, W: ImageWarmer> Session<S, W> {
    /// A session for the page at `location` (which may carry view state).
    pub fn new(
        config: ViewerConfig,
        location: Url,
        store: Arc<S>,
        warmer: Arc<W>,
    ) -> Result<Self, url::ParseError> {
        let page = canonical_page(&location);
        let manifest = manifest::manifest_url(&page, &config.manifest_file)?;
        let prefetch = config
            .prefetch
            .enabled
            .then(|| PrefetchManager::new(warmer));
        Ok(Self {
            scope: Scope::from_page(&page),
            config,
            location,
            manifest,
            store,
            prefetch,
            state: ViewState::default(),
            restore: None,
            generation: 0,
            history: Box::new(Detached),
            viewer: Box::new(Detached),
            renderer: Box::new(Detached),
        })
    }

    pub fn with_history(mut self, history: impl History + 'static) -> Self {
        self.history = Box::new(history);
        self
    }

    pub fn with_viewer(mut self, viewer: impl Viewer + 'static) -> Self {
        self.viewer = Box::new(viewer);
        self
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Current address, including view state.
    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn manifest_url(&self) -> &Url {
        &self.manifest
    }

    pub fn tag_tree(&self) -> TagTree {
        self.state.tag_tree(&self.config.tag_delimiter)
    }

    pub fn prefetch(&self) -> Option<&PrefetchManager<W>> {
        self.prefetch.as_ref()
    }

    // -------------------------------------------------------------------------
    // Reload cycle
    // -------------------------------------------------------------------------

    /// Start a reload. Any ticket issued earlier is now stale.
    pub fn begin_reload(&mut self) -> ReloadTicket {
        self.generation += 1;
        ReloadTicket {
            generation: self.generation,
            manifest: self.manifest.clone(),
            base: self.scope.base().clone(),
            recursive: self.state.recursive,
        }
    }

    /// Apply a finished reload.
    ///
    /// Returns `Ok(false)` when the result is stale and was discarded. On a
    /// root failure the previous view stays in place and the error is returned.
    pub fn finish_reload(&mut self, loaded: Loaded) -> Result<bool, ManifestError> {
        if loaded.generation != self.generation {
            tracing::debug!(
                stale = loaded.generation,
                current = self.generation,
                "discarding superseded reload"
            );
            return Ok(false);
        }
        match loaded.result {
            Ok((items, subfolders)) => {
                self.state.items = items;
                self.state.subfolders = subfolders;
                if let Some(labels) = self.restore.take() {
                    self.state.selected_tags =
                        filter::known_labels(labels, &self.state.items, &self.config.tag_delimiter);
                }
                self.recompute();
                tracing::info!(
                    items = self.state.items.len(),
                    shown = self.state.shown.len(),
                    recursive = self.state.recursive,
                    "view loaded"
                );
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(error = %err, "load failed, keeping previous view");
                Err(err)
            }
        }
    }

    pub async fn reload(&mut self) -> Result<(), ManifestError> {
        let ticket = self.begin_reload();
        let loaded = ticket.run(Arc::clone(&self.store)).await;
        self.finish_reload(loaded).map(|_| ())
    }

    fn recompute(&mut self) {
        let filters = filter::filters_for(
            &self.state.selected_tags,
            &self.state.items,
            &self.config.tag_delimiter,
        );
        self.state.shown =
            filter::compute_shown(&self.state.items, &filters, self.state.recursive, &self.scope);
        self.renderer.render(&self.state);
        self.write_url();
    }

    fn write_url(&mut self) {
        let next = self.state.url_state().apply(&self.location);
        if next != self.location {
            self.history.replace_state(&next);
            self.location = next;
        }
    }

    // -------------------------------------------------------------------------
    // Command handlers
    // -------------------------------------------------------------------------

    /// Restore view state from the current URL and load.
    ///
    /// Restored tag labels that match nothing in the loaded items are dropped,
    /// so a stale link shows the folder instead of an empty grid.
    pub async fn on_load(&mut self) -> Result<(), ManifestError> {
        let restored = UrlState::from_url(&self.location);
        self.restore = Some(restored.tags);
        self.state.selected_tags.clear();
        self.state.recursive = restored.recursive;
        self.state.active_index = restored.open_index;

        self.reload().await?;

        if let Some(index) = self.state.active_index {
            if index < self.state.shown.len() {
                self.viewer.open(&self.state.shown, index);
            } else {
                tracing::debug!(index, shown = self.state.shown.len(), "pid out of range");
                self.state.active_index = None;
                self.write_url();
            }
        }
        Ok(())
    }

    /// Replace the selected tags and refilter. No fetch.
    pub fn on_filter_changed(&mut self, selected: BTreeSet<String>) {
        self.restore = None;
        self.state.selected_tags = selected;
        self.state.active_index = None;
        self.recompute();
    }

    /// Flip one tag label and refilter.
    pub fn on_tag_toggled(&mut self, label: &str) {
        let selected = toggled(self.state.selected_tags.clone(), label);
        self.on_filter_changed(selected);
    }

    /// Switch between the current folder and the aggregated tree.
    pub async fn on_recursive_toggled(&mut self, recursive: bool) -> Result<(), ManifestError> {
        self.set_recursive(recursive);
        self.reload().await
    }

    /// Back to defaults: no tags, current folder only, parameter-free URL.
    pub async fn on_reset(&mut self) -> Result<(), ManifestError> {
        self.clear_view();
        self.reload().await
    }

    fn set_recursive(&mut self, recursive: bool) {
        self.state.recursive = recursive;
        self.state.active_index = None;
        self.write_url();
    }

    fn clear_view(&mut self) {
        self.restore = None;
        self.state.selected_tags.clear();
        self.state.recursive = false;
        self.state.active_index = None;
        if let Some(prefetch) = self.prefetch.as_mut() {
            prefetch.cancel_all();
        }
        let page = canonical_page(&self.location);
        self.history.replace_state(&page);
        self.location = page;
    }

    /// Open the viewer at `index` of the shown list. False if out of range.
    pub fn on_open(&mut self, index: usize) -> bool {
        if index >= self.state.shown.len() {
            return false;
        }
        self.state.active_index = Some(index);
        self.viewer.open(&self.state.shown, index);
        self.write_url();
        true
    }

    pub fn on_viewer_closed(&mut self) {
        self.state.active_index = None;
        self.write_url();
    }

    /// Pointer entered the thumbnail at `index` of the shown list.
    pub fn on_hover(&mut self, index: usize) {
        let Some(prefetch) = self.prefetch.as_mut() else {
            return;
        };
        let Some(item) = self.state.shown.get(index) else {
            return;
        };
        match self.scope.base().join(&item.src) {
            Ok(url) => prefetch.begin(index, url),
            Err(err) => tracing::debug!(src = %item.src, error = %err, "cannot prefetch"),
        }
    }

    /// Pointer left the thumbnail at `index`.
    pub fn on_leave(&mut self, index: usize) {
        if let Some(prefetch) = self.prefetch.as_mut() {
            prefetch.cancel(index);
        }
    }

    // -------------------------------------------------------------------------
    // Event loop
    // -------------------------------------------------------------------------

    /// Process commands until the channel closes.
    ///
    /// Tag and recursive changes are debounced separately; everything else
    /// applies immediately. Reloads run in the background while commands keep
    /// flowing, and a reload overtaken by a newer one is discarded when it
    /// lands. On close, pending toggles are applied and in-flight reloads are
    /// awaited before returning.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let window = self.config.sync.debounce();
        let mut tags: Debouncer<BTreeSet<String>> = Debouncer::new(window);
        let mut recursive: Debouncer<bool> = Debouncer::new(window);
        let mut reloads: JoinSet<Loaded> = JoinSet::new();

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    match command {
                        Command::ToggleTag(label) => {
                            let current = self.state.selected_tags.clone();
                            tags.update(|pending| toggled(pending.unwrap_or(current), &label));
                        }
                        Command::SetTags(selected) => tags.push(selected),
                        Command::SetRecursive(on) => recursive.push(on),
                        Command::Reset => {
                            tags.clear();
                            recursive.clear();
                            self.clear_view();
                            self.spawn_reload(&mut reloads);
                        }
                        Command::Open(index) => {
                            self.on_open(index);
                        }
                        Command::CloseViewer => self.on_viewer_closed(),
                        Command::Hover(index) => self.on_hover(index),
                        Command::Leave(index) => self.on_leave(index),
                    }
                }
                selected = tags.settled() => self.on_filter_changed(selected),
                on = recursive.settled() => {
                    self.set_recursive(on);
                    self.spawn_reload(&mut reloads);
                }
                Some(joined) = reloads.join_next() => self.land_reload(joined),
            }
        }

        if let Some(selected) = tags.clear() {
            self.on_filter_changed(selected);
        }
        if let Some(on) = recursive.clear() {
            self.set_recursive(on);
            self.spawn_reload(&mut reloads);
        }
        while let Some(joined) = reloads.join_next().await {
            self.land_reload(joined);
        }
    }

    fn spawn_reload(&mut self, reloads: &mut JoinSet<Loaded>) {
        let ticket = self.begin_reload();
        reloads.spawn(ticket.run(Arc::clone(&self.store)));
    }

    fn land_reload(&mut self, joined: Result<Loaded, JoinError>) {
        match joined {
            // failures are logged by finish_reload; the old view stays
            Ok(loaded) => {
                let _ = self.finish_reload(loaded);
            }
            Err(err) => tracing::warn!(error = %err, "reload task failed"),
        }
    }
}

fn toggled(mut selected: BTreeSet<String>, label: &str) -> BTreeSet<String> {
    if !selected.remove(label) {
        selected.insert(label.to_string());
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use std::time::Duration;

    const ROOT: &str = "https://g.test/f/.metadata.json";
    const SUB: &str = "https://g.test/f/sub/.metadata.json";

    fn gallery() -> MemorySource {
        MemorySource::new()
            .with(
                ROOT,
                manifest(
                    vec![
                        image("https://g.test/f/owl.jpg", &["animals|birds|owls"]),
                        image("https://g.test/f/cat.jpg", &["animals|cats"]),
                        image("https://g.test/f/fern.jpg", &["plants"]),
                    ],
                    vec![folder("https://g.test/f/sub/")],
                ),
            )
            .with(
                "https://g.test/f/sub/.metadata.json",
                manifest(
                    vec![
                        image("https://g.test/f/sub/crow.jpg", &["animals|birds"]),
                        image("https://g.test/f/owl.jpg", &["animals|birds|owls"]),
                    ],
                    vec![],
                ),
            )
    }

    struct Harness {
        session: Session<MemorySource, RecordingWarmer>,
        source: MemorySource,
        warmer: RecordingWarmer,
        history: RecordingHistory,
        viewer: RecordingViewer,
        renderer: RecordingRenderer,
    }

    fn harness(location: &str, source: MemorySource) -> Harness {
        harness_with(location, source, ViewerConfig::default())
    }

    fn harness_with(location: &str, source: MemorySource, config: ViewerConfig) -> Harness {
        let history = RecordingHistory::default();
        let viewer = RecordingViewer::default();
        let renderer = RecordingRenderer::default();
        let warmer = RecordingWarmer::default();
        let session = Session::new(
            config,
            url(location),
            Arc::new(source.clone()),
            Arc::new(warmer.clone()),
        )
        .unwrap()
        .with_history(history.clone())
        .with_viewer(viewer.clone())
        .with_renderer(renderer.clone());
        Harness {
            session,
            source,
            warmer,
            history,
            viewer,
            renderer,
        }
    }

    fn labels(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn load_shows_current_folder() {
        let mut h = harness("https://g.test/f/", gallery());
        h.session.on_load().await.unwrap();

        let state = h.session.state();
        assert_eq!(state.items.len(), 3);
        assert_eq!(srcs(&state.shown).len(), 3);
        assert_eq!(state.subfolders.len(), 1);
        assert!(state.folders_visible());
        assert_eq!(h.source.fetched(), vec![ROOT.to_string()]);
        // default state: nothing to write back
        assert!(h.history.entries().is_empty());
        assert_eq!(h.renderer.count(), 1);
    }

    #[tokio::test]
    async fn load_restores_tags_from_fragment() {
        let mut h = harness("https://g.test/f/index.html#animals", gallery());
        h.session.on_load().await.unwrap();

        // "animals" branches, so it matches by prefix
        assert_eq!(
            srcs(&h.session.state().shown),
            vec!["https://g.test/f/owl.jpg", "https://g.test/f/cat.jpg"]
        );
        assert_eq!(h.session.state().selected_tags, labels(&["animals"]));
    }

    #[tokio::test]
    async fn load_in_recursive_mode_aggregates() {
        let mut h = harness("https://g.test/f/?recursive=true", gallery());
        h.session.on_load().await.unwrap();

        let state = h.session.state();
        assert!(state.recursive);
        assert!(!state.folders_visible());
        assert_eq!(
            srcs(&state.items),
            vec![
                "https://g.test/f/owl.jpg",
                "https://g.test/f/cat.jpg",
                "https://g.test/f/fern.jpg",
                "https://g.test/f/sub/crow.jpg",
            ]
        );
        assert_eq!(state.shown.len(), 4);
    }

    #[tokio::test]
    async fn load_opens_viewer_at_pid() {
        let mut h = harness("https://g.test/f/?pid=2", gallery());
        h.session.on_load().await.unwrap();

        assert_eq!(h.viewer.opened(), vec![(3, 1)]);
        assert_eq!(h.session.state().active_index, Some(1));
        assert_eq!(h.session.location().as_str(), "https://g.test/f/?pid=2");
    }

    #[tokio::test]
    async fn load_with_out_of_range_pid_drops_it() {
        let mut h = harness("https://g.test/f/?pid=9", gallery());
        h.session.on_load().await.unwrap();

        assert!(h.viewer.opened().is_empty());
        assert_eq!(h.session.location().as_str(), "https://g.test/f/");
        assert_eq!(h.history.entries(), vec!["https://g.test/f/".to_string()]);
    }

    #[tokio::test]
    async fn root_failure_on_first_load_leaves_empty_view() {
        let mut h = harness("https://g.test/f/", MemorySource::new().failing(ROOT));
        assert!(h.session.on_load().await.is_err());
        assert!(h.session.state().shown.is_empty());
        assert_eq!(h.renderer.count(), 0);
    }

    #[tokio::test]
    async fn root_failure_keeps_previous_view() {
        let mut h = harness("https://g.test/f/", gallery());
        h.session.on_load().await.unwrap();
        let before = h.session.state().clone();

        let ticket = h.session.begin_reload();
        let failed = Loaded {
            generation: ticket.generation(),
            result: Err(ManifestError::Status {
                url: url(ROOT),
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            }),
        };
        assert!(h.session.finish_reload(failed).is_err());
        assert_eq!(h.session.state(), &before);
    }

    #[tokio::test]
    async fn tag_toggle_refilters_without_fetching() {
        let mut h = harness("https://g.test/f/", gallery());
        h.session.on_load().await.unwrap();

        h.session.on_tag_toggled("plants");
        assert_eq!(srcs(&h.session.state().shown), vec!["https://g.test/f/fern.jpg"]);
        assert_eq!(h.session.location().as_str(), "https://g.test/f/#plants");

        h.session.on_tag_toggled("plants");
        assert_eq!(h.session.state().shown.len(), 3);
        assert_eq!(h.session.location().as_str(), "https://g.test/f/");

        assert_eq!(h.source.fetched().len(), 1);
        assert_eq!(
            h.history.entries(),
            vec!["https://g.test/f/#plants".to_string(), "https://g.test/f/".to_string()]
        );
    }

    #[tokio::test]
    async fn filters_and_together() {
        let mut h = harness("https://g.test/f/", gallery());
        h.session.on_load().await.unwrap();

        h.session.on_filter_changed(labels(&["animals", "plants"]));
        assert!(h.session.state().shown.is_empty());

        h.session.on_filter_changed(labels(&["animals|birds", "animals"]));
        assert_eq!(srcs(&h.session.state().shown), vec!["https://g.test/f/owl.jpg"]);
    }

    #[tokio::test]
    async fn recursive_toggle_round_trip() {
        let mut h = harness("https://g.test/f/#animals", gallery());
        h.session.on_load().await.unwrap();
        assert_eq!(
            srcs(&h.session.state().shown),
            vec!["https://g.test/f/owl.jpg", "https://g.test/f/cat.jpg"]
        );

        h.session.on_recursive_toggled(true).await.unwrap();
        assert_eq!(
            srcs(&h.session.state().shown),
            vec![
                "https://g.test/f/owl.jpg",
                "https://g.test/f/cat.jpg",
                "https://g.test/f/sub/crow.jpg",
            ]
        );
        assert_eq!(
            h.session.location().as_str(),
            "https://g.test/f/?recursive=true#animals"
        );

        h.session.on_recursive_toggled(false).await.unwrap();
        assert_eq!(h.session.state().items.len(), 3);
        assert_eq!(h.session.state().shown.len(), 2);
        assert_eq!(h.session.location().as_str(), "https://g.test/f/#animals");
        assert_eq!(h.source.fetch_count(ROOT), 3);
    }

    #[tokio::test]
    async fn branch_label_excludes_items_tagged_with_it_exactly() {
        // crow is tagged "animals|birds", which also has "owls" below it
        let mut h = harness("https://g.test/f/?recursive#animals%7Cbirds", gallery());
        h.session.on_load().await.unwrap();
        assert_eq!(srcs(&h.session.state().shown), vec!["https://g.test/f/owl.jpg"]);
    }

    #[tokio::test]
    async fn unknown_tags_in_link_are_dropped_on_load() {
        let mut h = harness("https://g.test/f/#nonexistent", gallery());
        h.session.on_load().await.unwrap();

        assert!(h.session.state().selected_tags.is_empty());
        assert_eq!(h.session.state().shown.len(), 3);
        assert_eq!(h.session.location().as_str(), "https://g.test/f/");
        assert_eq!(h.renderer.count(), 1);
    }

    #[tokio::test]
    async fn known_tags_in_link_survive_next_to_unknown_ones() {
        let mut h = harness("https://g.test/f/#nonexistent,plants", gallery());
        h.session.on_load().await.unwrap();

        assert_eq!(h.session.state().selected_tags, labels(&["plants"]));
        assert_eq!(srcs(&h.session.state().shown), vec!["https://g.test/f/fern.jpg"]);
        assert_eq!(h.session.location().as_str(), "https://g.test/f/#plants");
    }

    #[tokio::test]
    async fn reset_restores_canonical_url_and_reloads() {
        let mut h = harness("https://g.test/f/?recursive=true&pid=1#plants", gallery());
        h.session.on_load().await.unwrap();

        h.session.on_reset().await.unwrap();

        let state = h.session.state();
        assert!(state.selected_tags.is_empty());
        assert!(!state.recursive);
        assert_eq!(state.active_index, None);
        assert_eq!(state.shown.len(), 3);
        assert_eq!(h.session.location().as_str(), "https://g.test/f/");
        assert_eq!(h.history.entries().last().unwrap(), "https://g.test/f/");
        assert_eq!(h.source.fetch_count(ROOT), 2);
    }

    #[tokio::test]
    async fn superseded_reload_is_discarded() {
        let mut h = harness("https://g.test/f/", gallery());
        let store = Arc::new(h.source.clone());

        let older = h.session.begin_reload();
        h.session.state.recursive = true;
        let newer = h.session.begin_reload();

        let older = older.run(Arc::clone(&store)).await;
        let newer = newer.run(store).await;

        assert!(h.session.finish_reload(newer).unwrap());
        assert!(!h.session.finish_reload(older).unwrap());
        assert_eq!(h.session.state().items.len(), 4);
    }

    #[tokio::test]
    async fn open_and_close_viewer_track_pid() {
        let mut h = harness("https://g.test/f/", gallery());
        h.session.on_load().await.unwrap();

        assert!(h.session.on_open(2));
        assert_eq!(h.viewer.opened(), vec![(3, 2)]);
        assert_eq!(h.session.location().as_str(), "https://g.test/f/?pid=3");

        h.session.on_viewer_closed();
        assert_eq!(h.session.location().as_str(), "https://g.test/f/");

        assert!(!h.session.on_open(3));
    }

    #[tokio::test]
    async fn filter_change_closes_pid() {
        let mut h = harness("https://g.test/f/?pid=1", gallery());
        h.session.on_load().await.unwrap();
        h.session.on_tag_toggled("plants");
        assert_eq!(h.session.state().active_index, None);
        assert_eq!(h.session.location().as_str(), "https://g.test/f/#plants");
    }

    #[tokio::test]
    async fn hover_and_leave_drive_prefetch() {
        let mut h = harness("https://g.test/f/", gallery());
        h.session.on_load().await.unwrap();

        h.session.on_hover(0);
        h.session.on_hover(0);
        let prefetch = h.session.prefetch().unwrap();
        assert!(prefetch.is_active(0));
        assert_eq!(prefetch.active_count(), 1);

        h.session.on_leave(0);
        assert!(!h.session.prefetch().unwrap().is_active(0));

        // out of range and unknown indices are ignored
        h.session.on_hover(99);
        h.session.on_leave(42);
        assert_eq!(h.session.prefetch().unwrap().active_count(), 0);
    }

    #[tokio::test]
    async fn prefetch_can_be_disabled() {
        let mut config = ViewerConfig::default();
        config.prefetch.enabled = false;
        let mut h = harness_with("https://g.test/f/", gallery(), config);
        h.session.on_load().await.unwrap();

        h.session.on_hover(0);
        assert!(h.session.prefetch().is_none());
    }

    #[tokio::test]
    async fn tag_tree_covers_loaded_items() {
        let mut h = harness("https://g.test/f/?recursive", gallery());
        h.session.on_load().await.unwrap();
        assert_eq!(
            h.session.tag_tree().render("  "),
            vec!["animals", "  birds", "    owls", "  cats", "plants"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_recursive_toggles_fetch_once() {
        let mut h = harness("https://g.test/f/", gallery());
        h.session.on_load().await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let driver = async move {
            for on in [true, false, true] {
                tx.send(Command::SetRecursive(on)).unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        };
        tokio::join!(h.session.run(rx), driver);

        assert!(h.session.state().recursive);
        // initial load + one aggregation
        assert_eq!(h.source.fetch_count(ROOT), 2);
        assert_eq!(h.source.fetch_count(SUB), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_tag_toggles_coalesce() {
        let mut h = harness("https://g.test/f/", gallery());
        h.session.on_load().await.unwrap();
        let renders_before = h.renderer.count();

        let (tx, rx) = mpsc::unbounded_channel();
        let driver = async move {
            for label in ["plants", "animals", "plants"] {
                tx.send(Command::ToggleTag(label.to_string())).unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        };
        tokio::join!(h.session.run(rx), driver);

        assert_eq!(h.session.state().selected_tags, labels(&["animals"]));
        assert_eq!(h.renderer.count(), renders_before + 1);
        assert_eq!(h.history.entries(), vec!["https://g.test/f/#animals".to_string()]);
    }

    #[tokio::test]
    async fn pending_toggle_applies_when_commands_end() {
        let mut h = harness("https://g.test/f/", gallery());
        h.session.on_load().await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Command::SetTags(labels(&["plants"]))).unwrap();
        drop(tx);
        h.session.run(rx).await;

        assert_eq!(h.session.state().shown.len(), 1);
    }

    #[tokio::test]
    async fn reset_command_drops_pending_toggles() {
        let mut h = harness("https://g.test/f/#plants", gallery());
        h.session.on_load().await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Command::SetTags(labels(&["animals"]))).unwrap();
        tx.send(Command::Reset).unwrap();
        drop(tx);
        h.session.run(rx).await;

        assert!(h.session.state().selected_tags.is_empty());
        assert_eq!(h.session.state().shown.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_supersedes_inflight_aggregation() {
        let slow = gallery().delayed(SUB, Duration::from_secs(5));
        let mut h = harness("https://g.test/f/", slow);
        h.session.on_load().await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let driver = async move {
            tx.send(Command::SetRecursive(true)).unwrap();
            // debounce has fired, aggregation is waiting on the subfolder
            tokio::time::sleep(Duration::from_millis(300)).await;
            tx.send(Command::Reset).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        };
        tokio::join!(h.session.run(rx), driver);

        // the aggregation landed after the reset and was discarded
        assert_eq!(h.source.fetch_count(SUB), 1);
        assert_eq!(h.renderer.renders(), vec![(3, false), (3, false)]);
        let state = h.session.state();
        assert!(!state.recursive);
        assert_eq!(state.items.len(), 3);
        assert_eq!(h.session.location().as_str(), "https://g.test/f/");
    }

    #[tokio::test(start_paused = true)]
    async fn commands_flow_while_reload_is_in_flight() {
        let slow = gallery().delayed(SUB, Duration::from_secs(5));
        let mut h = harness("https://g.test/f/", slow);
        h.session.on_load().await.unwrap();

        let warmer = h.warmer.clone();
        let viewer = h.viewer.clone();
        let renderer = h.renderer.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = async move {
            let tick = Duration::from_millis(10);
            tx.send(Command::SetRecursive(true)).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;

            tx.send(Command::Hover(0)).unwrap();
            tokio::time::sleep(tick).await;
            assert_eq!(warmer.log(), vec!["start https://g.test/f/owl.jpg"]);

            tx.send(Command::Leave(0)).unwrap();
            tokio::time::sleep(tick).await;
            assert_eq!(
                warmer.log(),
                vec!["start https://g.test/f/owl.jpg", "stop https://g.test/f/owl.jpg"]
            );

            tx.send(Command::Open(1)).unwrap();
            tokio::time::sleep(tick).await;
            assert_eq!(viewer.opened(), vec![(3, 1)]);

            // the aggregation is still out
            assert_eq!(renderer.renders(), vec![(3, false)]);
        };
        tokio::join!(h.session.run(rx), driver);

        assert_eq!(h.renderer.renders(), vec![(3, false), (4, true)]);
        assert!(h.session.state().recursive);
    }
}
