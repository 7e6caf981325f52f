use crate::library::LibrarySnapshot;
use crate::types::{Book, ReadingStatus};

/// How a feed card should be drawn given the current library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    /// Owned, and owned books are not shown in this view.
    Hidden,
    /// Owned; show a badge with its status.
    Badge(ReadingStatus),
    /// Not owned; offer the add-to-library actions.
    Addable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// The recommendation feed: owned books disappear.
    #[default]
    HideOwned,
    /// Search or detail views that keep owned books but mark them.
    BadgeOwned,
}

pub fn display_state(book: &Book, library: &LibrarySnapshot, mode: ReconcileMode) -> DisplayState {
    match (library.status_of(&book.id), mode) {
        (None, _) => DisplayState::Addable,
        (Some(_), ReconcileMode::HideOwned) => DisplayState::Hidden,
        (Some(status), ReconcileMode::BadgeOwned) => DisplayState::Badge(status),
    }
}

/// The feed items to render, in order, with owned books removed. Run this on
/// every render so library changes show up without a refetch.
pub fn visible_items<'a>(items: &'a [Book], library: &LibrarySnapshot) -> Vec<&'a Book> {
    items
        .iter()
        .filter(|b| display_state(b, library, ReconcileMode::HideOwned) != DisplayState::Hidden)
        .collect()
}
