use anyhow::Result;

use crate::engagement::{EngagementTracker, VisibilityEntry};
use crate::feed::FeedController;
use crate::library::LibraryStore;
use crate::recommendation::RecommendationSource;
use crate::reconcile::visible_items;
use crate::scroll::ScrollTrigger;
use crate::types::{Book, ReadingStatus};

// ─── Session ──────────────────────────────────────────────────────────────────

/// One running app: the library, the feed and the engagement tracker wired
/// together. Every user action on the feed or library screens goes through here.
pub struct Session<S> {
    library: LibraryStore,
    feed: FeedController<S>,
    tracker: EngagementTracker,
    scroll: ScrollTrigger,
}

impl<S: RecommendationSource> Session<S> {
    pub fn new(library: LibraryStore, feed: FeedController<S>, tracker: EngagementTracker) -> Self {
        Self {
            library,
            feed,
            tracker,
            scroll: ScrollTrigger::default(),
        }
    }

    pub fn library(&self) -> &LibraryStore {
        &self.library
    }

    pub fn feed(&self) -> &FeedController<S> {
        &self.feed
    }

    pub fn tracker(&self) -> &EngagementTracker {
        &self.tracker
    }

    // ─── Feed actions ─────────────────────────────────────────────────────────

    /// Run a search. An empty query is the unfiltered feed.
    pub async fn search(&mut self, query: &str) {
        self.scroll.reset();
        self.feed.set_query(query, &mut self.tracker).await;
    }

    /// Pull-to-refresh.
    pub async fn refresh(&mut self) {
        self.scroll.reset();
        self.feed.refresh(&mut self.tracker).await;
    }

    /// Explicit "load more" (e.g. a button). Returns false if ignored.
    pub async fn load_more(&mut self) -> bool {
        self.feed.load_more(&mut self.tracker).await
    }

    /// The card at `index` of the displayed feed scrolled into view. Loads the
    /// next page when it is near the end, throttled.
    pub async fn item_appeared(&mut self, index: usize) -> bool {
        let total = self.display_feed().len();
        if !self.scroll.should_load_more(index, total) {
            return false;
        }
        self.load_more().await
    }

    /// What the feed screen shows right now: fetched items minus owned books.
    pub fn display_feed(&self) -> Vec<&Book> {
        visible_items(self.feed.items(), &self.library.snapshot())
    }

    // ─── Card visibility ──────────────────────────────────────────────────────

    pub fn register_card(&mut self, key: &str) {
        self.tracker.register(key);
    }

    pub fn unregister_card(&mut self, key: &str) {
        self.tracker.unregister(key);
    }

    pub fn visibility_changed(&mut self, entries: &[VisibilityEntry]) {
        self.tracker.handle_visibility(entries);
    }

    // ─── Library actions ──────────────────────────────────────────────────────

    /// Add a feed book to the library in the chosen status. The book drops out
    /// of [`display_feed`](Self::display_feed) immediately.
    pub fn add_to_library(&mut self, book: &Book, status: ReadingStatus) -> Result<()> {
        self.library.add_with_status(book, status)
    }

    pub fn set_status(&mut self, id: &str, status: ReadingStatus) -> Result<()> {
        self.library.set_status(id, status)
    }

    pub fn remove_from_library(&mut self, id: &str) -> Result<()> {
        self.library.remove(id)
    }

    pub fn library_view(&self, status: ReadingStatus) -> Vec<Book> {
        self.library.all_by_status(status)
    }
}
