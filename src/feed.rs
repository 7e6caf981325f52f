//! Paginated recommendation feed.
//!
//! A fetch runs in two phases so the UI can keep interacting while the request
//! is out: `begin_*` flushes telemetry, updates the state guard and hands back
//! a [`PendingFetch`], and [`FeedController::complete`] applies the response.
//! Every fetch carries a request token; only the latest token may write state,
//! so a response overtaken by a newer query is dropped.

use std::collections::HashSet;

use crate::engagement::{EngagementTracker, TelemetryIdentity};
use crate::recommendation::{
    card_to_book, FetchError, RecommendationEvent, RecommendationRequest,
    RecommendationResponse, RecommendationSource,
};
use crate::types::{Book, FeedStatus};

pub const DEFAULT_BATCH_COUNT: u32 = 10;
pub const DEFAULT_ORGANIZATION_ID: &str = "Bookly";
pub const DEFAULT_VISITOR_ID: &str = "6ee0e958-adb0-49b4-8415-31556bef71e9";

#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    pub batch_count: u32,
    pub organization_id: String,
    pub visitor_id: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            batch_count: DEFAULT_BATCH_COUNT,
            organization_id: DEFAULT_ORGANIZATION_ID.to_string(),
            visitor_id: DEFAULT_VISITOR_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Page 1, replaces the displayed items.
    Reset,
    /// Next page, appended to the displayed items.
    Append,
}

/// An issued request waiting for its response.
#[derive(Debug, Clone)]
pub struct PendingFetch {
    pub token: u64,
    pub mode: FetchMode,
    pub request: RecommendationRequest,
}

/// What the feed screen renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub items: Vec<Book>,
    pub page_cursor: u32,
    pub status: FeedStatus,
    pub error_message: Option<String>,
    pub can_load_more: bool,
}

impl Default for FeedPage {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page_cursor: 1,
            status: FeedStatus::Idle,
            error_message: None,
            can_load_more: true,
        }
    }
}

pub struct FeedController<S> {
    source: S,
    settings: FeedSettings,
    identity: TelemetryIdentity,
    query: String,
    page: FeedPage,
    latest_token: u64,
    queued_events: Vec<RecommendationEvent>,
}

impl<S: RecommendationSource> FeedController<S> {
    /// New controller with a fresh session id.
    pub fn new(source: S, settings: FeedSettings) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        Self::with_session(source, settings, session_id)
    }

    pub fn with_session(source: S, settings: FeedSettings, session_id: String) -> Self {
        let identity = TelemetryIdentity {
            organization_id: settings.organization_id.clone(),
            visitor_id: settings.visitor_id.clone(),
            session_id,
        };
        Self {
            source,
            settings,
            identity,
            query: String::new(),
            page: FeedPage::default(),
            latest_token: 0,
            queued_events: Vec::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn identity(&self) -> &TelemetryIdentity {
        &self.identity
    }

    pub fn session_id(&self) -> &str {
        &self.identity.session_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn page(&self) -> &FeedPage {
        &self.page
    }

    pub fn items(&self) -> &[Book] {
        &self.page.items
    }

    pub fn status(&self) -> FeedStatus {
        self.page.status
    }

    /// Attach `event` to the next outbound request.
    pub fn enqueue_event(&mut self, event: RecommendationEvent) {
        self.queued_events.push(event);
    }

    fn issue(
        &mut self,
        mode: FetchMode,
        page: u32,
        tracker: &mut EngagementTracker,
    ) -> PendingFetch {
        let mut events = std::mem::take(&mut self.queued_events);
        if let Some(batch) = tracker.flush() {
            events.push(batch.into_event(&self.identity));
        }
        self.latest_token += 1;
        PendingFetch {
            token: self.latest_token,
            mode,
            request: RecommendationRequest {
                session_id: self.identity.session_id.clone(),
                page,
                batch_count: self.settings.batch_count,
                events,
                search_prompt: self.query.clone(),
            },
        }
    }

    /// Switch to `query` and start a reset fetch.
    pub fn begin_query(
        &mut self,
        query: impl Into<String>,
        tracker: &mut EngagementTracker,
    ) -> PendingFetch {
        self.query = query.into();
        self.begin_reset(tracker)
    }

    /// Start a page-1 fetch for the current query. Always issued: a reset
    /// supersedes whatever is in flight. Engagement is flushed into the
    /// request first, then cleared so it is not attributed to the new results.
    pub fn begin_reset(&mut self, tracker: &mut EngagementTracker) -> PendingFetch {
        let pending = self.issue(FetchMode::Reset, 1, tracker);
        tracker.reset();
        self.page.page_cursor = 1;
        self.page.status = FeedStatus::Loading;
        tracing::debug!(query = %self.query, token = pending.token, "Feed reset");
        pending
    }

    /// Start fetching the next page. Only a loaded feed can grow: nothing
    /// happens before the first page arrives, while a fetch is in flight, or
    /// once the feed is exhausted.
    pub fn begin_append(&mut self, tracker: &mut EngagementTracker) -> Option<PendingFetch> {
        if self.page.status != FeedStatus::Ready || !self.page.can_load_more {
            tracing::debug!(status = ?self.page.status, can_load_more = self.page.can_load_more, "Ignoring load more");
            return None;
        }
        let next = self.page.page_cursor + 1;
        let pending = self.issue(FetchMode::Append, next, tracker);
        self.page.status = FeedStatus::LoadingMore;
        tracing::debug!(page = next, token = pending.token, "Feed append");
        Some(pending)
    }

    /// Apply the outcome of `pending`. Returns false if a newer fetch has been
    /// issued since, in which case nothing changes.
    pub fn complete(
        &mut self,
        pending: PendingFetch,
        result: Result<RecommendationResponse, FetchError>,
    ) -> bool {
        if pending.token != self.latest_token {
            tracing::debug!(
                token = pending.token,
                latest = self.latest_token,
                "Discarding stale feed response"
            );
            return false;
        }

        match result {
            Ok(response) => {
                let books: Vec<Book> = response.cards.into_iter().map(card_to_book).collect();
                self.page.can_load_more = !books.is_empty();
                match pending.mode {
                    FetchMode::Reset => {
                        self.page.items = books;
                        self.page.page_cursor = 1;
                    }
                    FetchMode::Append => {
                        let fresh: Vec<Book> = {
                            let shown: HashSet<&str> =
                                self.page.items.iter().map(|b| b.id.as_str()).collect();
                            books
                                .into_iter()
                                .filter(|b| !shown.contains(b.id.as_str()))
                                .collect()
                        };
                        self.page.items.extend(fresh);
                        self.page.page_cursor = pending.request.page;
                    }
                }
                self.page.status = FeedStatus::Ready;
                self.page.error_message = None;
                tracing::debug!(
                    items = self.page.items.len(),
                    page = self.page.page_cursor,
                    "Feed page applied"
                );
            }
            Err(e) => {
                tracing::warn!(mode = ?pending.mode, "Feed fetch failed: {e}");
                if pending.mode == FetchMode::Reset {
                    self.page.items.clear();
                }
                self.page.status = FeedStatus::Error;
                self.page.error_message = Some(e.to_string());
                self.page.can_load_more = false;
            }
        }
        true
    }

    async fn run(&mut self, pending: PendingFetch) -> bool {
        let result = self.source.fetch(&pending.request).await;
        self.complete(pending, result)
    }

    /// Change the search query and reload from page 1.
    pub async fn set_query(&mut self, query: impl Into<String>, tracker: &mut EngagementTracker) {
        let pending = self.begin_query(query, tracker);
        self.run(pending).await;
    }

    /// Reload page 1 of the current query.
    pub async fn refresh(&mut self, tracker: &mut EngagementTracker) {
        let pending = self.begin_reset(tracker);
        self.run(pending).await;
    }

    /// Fetch and append the next page. Returns false if the call was ignored.
    pub async fn load_more(&mut self, tracker: &mut EngagementTracker) -> bool {
        match self.begin_append(tracker) {
            Some(pending) => self.run(pending).await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagement::VisibilityEntry;
    use crate::recommendation::{EventProperties, RecommendationCard, RecommendationProduct};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct StubSource {
        responses: Mutex<VecDeque<Result<RecommendationResponse, FetchError>>>,
        requests: Mutex<Vec<RecommendationRequest>>,
    }

    impl StubSource {
        fn with_pages(pages: &[&[&str]]) -> Self {
            let stub = Self::default();
            for ids in pages {
                stub.push_page(ids);
            }
            stub
        }

        fn push_page(&self, ids: &[&str]) {
            self.responses.lock().unwrap().push_back(Ok(response(ids)));
        }

        fn push_error(&self, status: u16) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(FetchError::Status(status)));
        }

        fn requests(&self) -> Vec<RecommendationRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecommendationSource for StubSource {
        async fn fetch(
            &self,
            request: &RecommendationRequest,
        ) -> Result<RecommendationResponse, FetchError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RecommendationResponse::default()))
        }
    }

    fn card(id: &str) -> RecommendationCard {
        RecommendationCard {
            card_type: "product".into(),
            id: id.into(),
            product: RecommendationProduct {
                sku: format!("sku-{id}"),
                body: String::new(),
                title: format!("Title {id}"),
                image_url: None,
                product_url: None,
                attributes: vec![],
            },
        }
    }

    fn response(ids: &[&str]) -> RecommendationResponse {
        RecommendationResponse {
            cards: ids.iter().map(|id| card(id)).collect(),
        }
    }

    fn ids(controller: &FeedController<StubSource>) -> Vec<&str> {
        controller.items().iter().map(|b| b.id.as_str()).collect()
    }

    fn controller(source: StubSource) -> FeedController<StubSource> {
        FeedController::with_session(source, FeedSettings::default(), "session-1".into())
    }

    #[tokio::test]
    async fn reset_then_append_dedupes_displayed_items() {
        let mut feed = controller(StubSource::with_pages(&[&["a", "b", "c"], &["c", "d"]]));
        let mut tracker = EngagementTracker::new();

        feed.refresh(&mut tracker).await;
        assert_eq!(feed.status(), FeedStatus::Ready);
        assert!(feed.page().can_load_more);

        assert!(feed.load_more(&mut tracker).await);
        assert_eq!(ids(&feed), vec!["a", "b", "c", "d"]);
        assert_eq!(feed.page().page_cursor, 2);

        let pages: Vec<u32> = feed.source().requests().iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 2]);
    }

    #[tokio::test]
    async fn duplicates_within_one_page_are_kept() {
        let mut feed = controller(StubSource::with_pages(&[&["a", "a", "b"]]));
        feed.refresh(&mut EngagementTracker::new()).await;
        assert_eq!(ids(&feed), vec!["a", "a", "b"]);
    }

    #[tokio::test]
    async fn empty_page_stops_pagination() {
        let mut feed = controller(StubSource::with_pages(&[&["a"], &[]]));
        let mut tracker = EngagementTracker::new();
        feed.refresh(&mut tracker).await;
        assert!(feed.load_more(&mut tracker).await);
        assert!(!feed.page().can_load_more);
        assert!(!feed.load_more(&mut tracker).await);
        assert_eq!(feed.source().requests().len(), 2);
    }

    #[tokio::test]
    async fn query_change_resets_cursor_and_items() {
        let source = StubSource::with_pages(&[&["a", "b"], &["c"], &["dune-1"]]);
        let mut feed = controller(source);
        let mut tracker = EngagementTracker::new();
        feed.refresh(&mut tracker).await;
        feed.load_more(&mut tracker).await;
        assert_eq!(feed.page().page_cursor, 2);

        feed.set_query("dune", &mut tracker).await;
        assert_eq!(ids(&feed), vec!["dune-1"]);
        assert_eq!(feed.page().page_cursor, 1);
        let last = feed.source().requests().pop().unwrap();
        assert_eq!(last.page, 1);
        assert_eq!(last.search_prompt, "dune");
    }

    #[tokio::test]
    async fn append_failure_keeps_displayed_page() {
        let source = StubSource::with_pages(&[&["a", "b"]]);
        source.push_error(502);
        let mut feed = controller(source);
        let mut tracker = EngagementTracker::new();
        feed.refresh(&mut tracker).await;
        feed.load_more(&mut tracker).await;

        assert_eq!(feed.status(), FeedStatus::Error);
        assert_eq!(ids(&feed), vec!["a", "b"]);
        assert_eq!(feed.page().page_cursor, 1);
        assert!(!feed.page().can_load_more);
        assert!(feed.page().error_message.as_deref().unwrap().contains("502"));
    }

    #[tokio::test]
    async fn reset_failure_clears_items_and_recovers() {
        let source = StubSource::with_pages(&[&["a"]]);
        source.push_error(500);
        source.push_page(&["z"]);
        let mut feed = controller(source);
        let mut tracker = EngagementTracker::new();
        feed.refresh(&mut tracker).await;
        feed.refresh(&mut tracker).await;
        assert_eq!(feed.status(), FeedStatus::Error);
        assert!(feed.items().is_empty());

        feed.refresh(&mut tracker).await;
        assert_eq!(feed.status(), FeedStatus::Ready);
        assert_eq!(feed.page().error_message, None);
        assert_eq!(ids(&feed), vec!["z"]);
    }

    #[test]
    fn append_is_ignored_while_in_flight() {
        let mut feed = controller(StubSource::default());
        let mut tracker = EngagementTracker::new();
        let first = feed.begin_reset(&mut tracker);
        assert_eq!(feed.status(), FeedStatus::Loading);
        assert!(feed.begin_append(&mut tracker).is_none());

        assert!(feed.complete(first, Ok(response(&["a"]))));
        let more = feed.begin_append(&mut tracker).unwrap();
        assert_eq!(feed.status(), FeedStatus::LoadingMore);
        assert!(feed.begin_append(&mut tracker).is_none());
        assert_eq!(more.request.page, 2);
    }

    #[tokio::test]
    async fn load_more_before_first_page_is_ignored() {
        let mut feed = controller(StubSource::with_pages(&[&["a", "b", "c"]]));
        let mut tracker = EngagementTracker::new();
        assert!(!feed.load_more(&mut tracker).await);
        assert!(feed.source().requests().is_empty());
        assert_eq!(feed.status(), FeedStatus::Idle);
        assert_eq!(feed.page().page_cursor, 1);
        assert!(feed.items().is_empty());

        feed.refresh(&mut tracker).await;
        assert_eq!(ids(&feed), vec!["a", "b", "c"]);
        assert_eq!(feed.source().requests()[0].page, 1);
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut feed = controller(StubSource::default());
        let mut tracker = EngagementTracker::new();
        let old = feed.begin_query("tolkien", &mut tracker);
        let new = feed.begin_query("dune", &mut tracker);
        assert!(new.token > old.token);

        assert!(feed.complete(new, Ok(response(&["dune-1"]))));
        assert!(!feed.complete(old, Ok(response(&["hobbit"]))));
        assert_eq!(ids(&feed), vec!["dune-1"]);
        assert_eq!(feed.status(), FeedStatus::Ready);
    }

    #[test]
    fn reset_supersedes_in_flight_append() {
        let mut feed = controller(StubSource::default());
        let mut tracker = EngagementTracker::new();
        let first = feed.begin_reset(&mut tracker);
        feed.complete(first, Ok(response(&["a"])));
        let append = feed.begin_append(&mut tracker).unwrap();
        let reset = feed.begin_query("dune", &mut tracker);
        assert!(!feed.complete(append, Ok(response(&["b"]))));
        assert!(feed.complete(reset, Ok(response(&["c"]))));
        assert_eq!(ids(&feed), vec!["c"]);
    }

    #[test]
    fn requests_carry_linger_metrics_and_queued_events() {
        let mut feed = controller(StubSource::default());
        let mut tracker = EngagementTracker::new();
        let t0 = Instant::now() - Duration::from_secs(5);
        tracker.register("a#0");
        tracker.handle_visibility_at(&[VisibilityEntry::new("a#0", 1.0)], t0);
        tracker.handle_visibility_at(&[VisibilityEntry::new("a#0", 0.0)], t0 + Duration::from_secs(2));

        let interest = RecommendationEvent::abstract_interest("interest", feed.identity(), "a", 1.0);
        feed.enqueue_event(interest.clone());
        let pending = feed.begin_reset(&mut tracker);

        let events = &pending.request.events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], interest);
        match &events[1].properties {
            EventProperties::Linger(props) => {
                assert_eq!(props.session_id, "session-1");
                let entry = props.payload.values().next().unwrap();
                assert_eq!(entry.id, "a");
                assert_eq!(entry.time, 2.0);
            }
            other => panic!("expected linger event, got {other:?}"),
        }
        // Reset cleared engagement and the queue was drained.
        assert_eq!(tracker.tracked_len(), 0);
        feed.complete(pending, Ok(response(&[])));
        let next = feed.begin_reset(&mut tracker);
        assert!(next.request.events.is_empty());
    }

    #[test]
    fn append_flush_keeps_engagement_state() {
        let mut feed = controller(StubSource::default());
        let mut tracker = EngagementTracker::new();
        let first = feed.begin_reset(&mut tracker);
        feed.complete(first, Ok(response(&["a"])));

        tracker.register("a#0");
        tracker.handle_visibility_at(&[VisibilityEntry::new("a#0", 1.0)], Instant::now() - Duration::from_secs(1));
        let append = feed.begin_append(&mut tracker).unwrap();
        assert_eq!(append.request.events.len(), 1);
        assert_eq!(tracker.tracked_len(), 1);
    }
}
