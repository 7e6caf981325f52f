use serde::{Deserialize, Serialize};

/// Where a book sits in the owner's reading lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    #[default]
    WantToRead,
    Reading,
    Read,
}

impl ReadingStatus {
    pub const ALL: [ReadingStatus; 3] = [
        ReadingStatus::WantToRead,
        ReadingStatus::Reading,
        ReadingStatus::Read,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReadingStatus::WantToRead => "want_to_read",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Read => "read",
        }
    }
}

impl std::fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReadingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "want_to_read" | "wanttoread" | "unread" => Ok(ReadingStatus::WantToRead),
            "reading" => Ok(ReadingStatus::Reading),
            "read" => Ok(ReadingStatus::Read),
            other => Err(anyhow::anyhow!("unknown reading status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String, // stable identity from the recommendation feed
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    #[serde(default, alias = "imageURL", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, alias = "productURL", skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(default)]
    pub status: ReadingStatus,
}

impl Book {
    /// A bare book with only identity and title, as used by the CLI and tests.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: None,
            description: None,
            genre: None,
            published_year: None,
            image_url: None,
            product_url: None,
            status: ReadingStatus::WantToRead,
        }
    }
}

/// The persisted library blob. The three id lists are an index derived from
/// each book's `status` and are rebuilt on every write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRecord {
    pub books: Vec<Book>,
    pub want_to_read_ids: Vec<String>,
    pub reading_ids: Vec<String>,
    pub read_ids: Vec<String>,
}

impl LibraryRecord {
    pub fn ids_for(&self, status: ReadingStatus) -> &[String] {
        match status {
            ReadingStatus::WantToRead => &self.want_to_read_ids,
            ReadingStatus::Reading => &self.reading_ids,
            ReadingStatus::Read => &self.read_ids,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.books.iter().any(|b| b.id == id)
    }
}

/// Lifecycle of the feed as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedStatus {
    #[default]
    Idle,
    Loading,
    LoadingMore,
    Ready,
    Error,
}

impl FeedStatus {
    pub fn is_fetching(self) -> bool {
        matches!(self, FeedStatus::Loading | FeedStatus::LoadingMore)
    }
}
