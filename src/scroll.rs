use std::time::{Duration, Instant};

/// How close to the end of the list a card must be to trigger the next page.
const NEAR_END: usize = 3;

/// Minimum spacing between scroll-driven load-more triggers.
/// Fast flings report many cards per frame; without this each would fire.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Decides when scrolling should ask the feed for another page.
#[derive(Debug, Clone)]
pub struct ScrollTrigger {
    min_interval: Duration,
    last_fired: Option<Instant>,
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self::new(MIN_INTERVAL)
    }
}

impl ScrollTrigger {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_fired: None,
        }
    }

    pub fn should_load_more(&mut self, index: usize, total: usize) -> bool {
        self.should_load_more_at(index, total, Instant::now())
    }

    /// Called when the card at `index` of `total` displayed cards appears.
    pub fn should_load_more_at(&mut self, index: usize, total: usize, now: Instant) -> bool {
        if total == 0 || index < total.saturating_sub(NEAR_END) {
            return false;
        }
        if let Some(last) = self.last_fired {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_fired = Some(now);
        true
    }

    /// Forget the last trigger, e.g. after the query changes.
    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}
