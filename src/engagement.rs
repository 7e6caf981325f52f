//! Viewport dwell tracking for feed cards.
//!
//! The presentation layer reports visibility edges (intersection ratio per
//! card) and the tracker accumulates how long each card stayed at least half
//! visible and how often it came back into view. Before each feed request the
//! controller calls [`EngagementTracker::flush`] to get one aggregated
//! [`LingerBatch`] for the outbound event list.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Fraction of a card's area that must be on screen for it to count as visible.
pub const VISIBILITY_THRESHOLD: f32 = 0.5;

/// Cards with less accumulated dwell than this are flicker and are left out
/// of the telemetry payload.
pub const MIN_DWELL_SECONDS: f64 = 0.1;

/// Build the tracking key for the card at `position` in the feed. The same
/// book can be rendered more than once, so the id alone is not unique.
pub fn tracking_key(book_id: &str, position: usize) -> String {
    format!("{book_id}#{position}")
}

/// Recover the book id from a tracking key.
pub fn book_id_from_key(key: &str) -> &str {
    key.split_once('#').map_or(key, |(id, _)| id)
}

/// One visibility observation for a registered card.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityEntry {
    pub key: String,
    pub intersection_ratio: f32,
}

impl VisibilityEntry {
    pub fn new(key: impl Into<String>, intersection_ratio: f32) -> Self {
        Self {
            key: key.into(),
            intersection_ratio,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.intersection_ratio >= VISIBILITY_THRESHOLD
    }
}

#[derive(Debug, Clone)]
struct TrackedCard {
    start_time: Instant,
    accumulated_seconds: f64,
    enter_count: u32,
    visible: bool,
}

impl TrackedCard {
    /// Move time spent visible since `start_time` into the total.
    fn accrue(&mut self, now: Instant) {
        if self.visible {
            self.accumulated_seconds += now.saturating_duration_since(self.start_time).as_secs_f64();
            self.start_time = now;
        }
    }
}

/// Dwell reported for one card in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct LingerEntry {
    pub book_id: String,
    pub dwell_seconds: f64,
    pub enter_count: u32,
}

/// One flush worth of engagement, keyed by a fresh v4 UUID per entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LingerBatch {
    pub entries: HashMap<String, LingerEntry>,
}

impl LingerBatch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry for a book, if any.
    pub fn for_book(&self, book_id: &str) -> Option<&LingerEntry> {
        self.entries.values().find(|e| e.book_id == book_id)
    }
}

/// Who the telemetry is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryIdentity {
    pub organization_id: String,
    pub visitor_id: String,
    pub session_id: String,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct EngagementTracker {
    observing: bool,
    registered: HashSet<String>,
    cards: HashMap<String, TrackedCard>,
}

impl Default for EngagementTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl EngagementTracker {
    pub fn new() -> Self {
        Self {
            observing: true,
            registered: HashSet::new(),
            cards: HashMap::new(),
        }
    }

    /// A tracker with no visibility source (headless runs). Registration is
    /// ignored and no telemetry is ever produced.
    pub fn detached() -> Self {
        Self {
            observing: false,
            ..Self::new()
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    /// Start observing `key`.
    pub fn register(&mut self, key: &str) {
        if !self.observing {
            return;
        }
        self.registered.insert(key.to_string());
    }

    pub fn unregister(&mut self, key: &str) {
        self.unregister_at(key, Instant::now());
    }

    /// Stop observing `key`. Time the card was visible up to `now` is kept and
    /// still reported by later flushes until the next [`reset`](Self::reset).
    pub fn unregister_at(&mut self, key: &str, now: Instant) {
        if !self.registered.remove(key) {
            return;
        }
        if let Some(card) = self.cards.get_mut(key) {
            card.accrue(now);
            card.visible = false;
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.registered.contains(key)
    }

    pub fn handle_visibility(&mut self, entries: &[VisibilityEntry]) {
        self.handle_visibility_at(entries, Instant::now());
    }

    /// Apply a batch of visibility edges. Each entry is handled on its own;
    /// entries for unregistered keys are ignored.
    pub fn handle_visibility_at(&mut self, entries: &[VisibilityEntry], now: Instant) {
        for entry in entries {
            if !self.registered.contains(&entry.key) {
                continue;
            }
            let visible = entry.is_visible();
            match self.cards.get_mut(&entry.key) {
                Some(card) if visible && !card.visible => {
                    card.start_time = now;
                    card.enter_count += 1;
                    card.visible = true;
                }
                Some(card) if !visible && card.visible => {
                    card.accrue(now);
                    card.visible = false;
                }
                Some(_) => {}
                None if visible => {
                    self.cards.insert(
                        entry.key.clone(),
                        TrackedCard {
                            start_time: now,
                            accumulated_seconds: 0.0,
                            enter_count: 1,
                            visible: true,
                        },
                    );
                }
                None => {}
            }
        }
    }

    pub fn flush(&mut self) -> Option<LingerBatch> {
        self.flush_at(Instant::now())
    }

    /// Bring visible cards up to date and report every card above the dwell
    /// floor. Tracked state is kept, so totals are cumulative across flushes.
    pub fn flush_at(&mut self, now: Instant) -> Option<LingerBatch> {
        let mut batch = LingerBatch::default();
        for (key, card) in self.cards.iter_mut() {
            card.accrue(now);
            if card.accumulated_seconds > MIN_DWELL_SECONDS {
                batch.entries.insert(
                    uuid::Uuid::new_v4().to_string(),
                    LingerEntry {
                        book_id: book_id_from_key(key).to_string(),
                        dwell_seconds: round2(card.accumulated_seconds),
                        enter_count: card.enter_count,
                    },
                );
            }
        }

        if batch.is_empty() {
            None
        } else {
            tracing::debug!(cards = batch.len(), "Flushed linger metrics");
            Some(batch)
        }
    }

    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    /// Close out visible cards and forget every tracked card. Registrations
    /// survive so cards still on screen are picked up again on their next edge.
    pub fn reset_at(&mut self, now: Instant) {
        for card in self.cards.values_mut() {
            card.accrue(now);
            card.visible = false;
        }
        self.cards.clear();
        tracing::debug!("Engagement tracking reset");
    }

    /// Accumulated dwell for `key`, not counting an open visible interval.
    pub fn dwell_seconds(&self, key: &str) -> Option<f64> {
        self.cards.get(key).map(|c| c.accumulated_seconds)
    }

    pub fn enter_count(&self, key: &str) -> Option<u32> {
        self.cards.get(key).map(|c| c.enter_count)
    }

    pub fn tracked_len(&self) -> usize {
        self.cards.len()
    }
}
