//! The personal library: owned books and their reading status, persisted as
//! a single JSON blob.
//!
//! Every operation reads the stored record, and every mutation writes the
//! whole record back. There is no cache between calls, so the blob is the
//! only source of truth. Reads never fail: a missing or malformed blob is an
//! empty library, and a record whose status lists disagree with the books is
//! healed by [`normalize`] and written back. A record holding a book entry
//! that cannot be recovered is never written back on read, so a damaged blob
//! is only replaced by an explicit mutation.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde_json::{Map, Value};

use crate::db::{RecordStorage, LIBRARY_KEY};
use crate::types::{Book, LibraryRecord, ReadingStatus};

/// A stored record as found on disk, before any invariant is enforced.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawLibraryRecord {
    pub(crate) books: Vec<RawBook>,
    pub(crate) want_to_read_ids: Vec<String>,
    pub(crate) reading_ids: Vec<String>,
    pub(crate) read_ids: Vec<String>,
    /// Book entries that could not be recovered at all.
    pub(crate) discarded: usize,
}

/// A stored book whose `status` may be missing or unrecognised.
#[derive(Debug, Clone)]
pub(crate) struct RawBook {
    pub(crate) status: Option<Value>,
    pub(crate) book: Book,
}

impl RawBook {
    /// Decode one stored book. Only `id` and `title` are required; metadata
    /// of the wrong type reads as absent.
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id")?.as_str()?;
        let title = obj.get("title")?.as_str()?;
        let text = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| obj.get(*name).and_then(Value::as_str))
                .map(str::to_string)
        };

        let mut book = Book::new(id, title);
        book.author = text(&["author"]);
        book.description = text(&["description"]);
        book.genre = text(&["genre"]);
        book.published_year = obj.get("publishedYear").and_then(year);
        book.image_url = text(&["imageUrl", "imageURL"]);
        book.product_url = text(&["productUrl", "productURL"]);
        Some(Self {
            status: obj.get("status").cloned(),
            book,
        })
    }
}

fn year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl RawLibraryRecord {
    /// Pull whatever is usable out of a JSON value. Non-array fields read as
    /// empty and book entries without an id or title are counted as discarded.
    pub(crate) fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            tracing::warn!("Library record is not a JSON object, treating as empty");
            return Self::default();
        };

        let mut books = Vec::new();
        let mut discarded = 0;
        for entry in array_field(obj, &["books"]).into_iter().flatten() {
            match RawBook::from_value(entry) {
                Some(book) => books.push(book),
                None => {
                    tracing::warn!("Skipping library entry without id or title: {entry}");
                    discarded += 1;
                }
            }
        }

        Self {
            books,
            want_to_read_ids: id_field(obj, &["wantToReadIds", "futurebooks"]),
            reading_ids: id_field(obj, &["readingIds", "readingbooks"]),
            read_ids: id_field(obj, &["readIds", "readbooks"]),
            discarded,
        }
    }
}

fn array_field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Vec<Value>> {
    names
        .iter()
        .find_map(|name| obj.get(*name).and_then(Value::as_array))
}

fn id_field(obj: &Map<String, Value>, names: &[&str]) -> Vec<String> {
    array_field(obj, names)
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Enforce the record invariant: every book has exactly one status, and each
/// status list holds exactly the ids of the books in that status.
///
/// A book's own `status` wins. Without one, list membership decides with
/// precedence read > reading > want-to-read, and a book found in no list is
/// want-to-read. Duplicate books keep their first occurrence; list ids with
/// no book are dropped.
pub fn normalize(value: &Value) -> LibraryRecord {
    normalize_raw(RawLibraryRecord::from_value(value))
}

fn normalize_raw(raw: RawLibraryRecord) -> LibraryRecord {
    let read: HashSet<&str> = raw.read_ids.iter().map(String::as_str).collect();
    let reading: HashSet<&str> = raw.reading_ids.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let mut books = Vec::with_capacity(raw.books.len());
    for RawBook { status, mut book } in raw.books {
        if !seen.insert(book.id.clone()) {
            tracing::warn!(id = %book.id, "Dropping duplicate library entry");
            continue;
        }
        let declared = status.and_then(|v| serde_json::from_value::<ReadingStatus>(v).ok());
        book.status = declared.unwrap_or_else(|| {
            if read.contains(book.id.as_str()) {
                ReadingStatus::Read
            } else if reading.contains(book.id.as_str()) {
                ReadingStatus::Reading
            } else {
                ReadingStatus::WantToRead
            }
        });
        books.push(book);
    }

    let mut record = LibraryRecord {
        books,
        ..LibraryRecord::default()
    };
    reindex(&mut record);
    record
}

/// Rebuild the three id lists from the books' statuses.
fn reindex(record: &mut LibraryRecord) {
    record.want_to_read_ids.clear();
    record.reading_ids.clear();
    record.read_ids.clear();
    for book in &record.books {
        let list = match book.status {
            ReadingStatus::WantToRead => &mut record.want_to_read_ids,
            ReadingStatus::Reading => &mut record.reading_ids,
            ReadingStatus::Read => &mut record.read_ids,
        };
        list.push(book.id.clone());
    }
}

/// Parse a stored blob. Malformed JSON is an empty library.
pub fn parse_record(text: &str) -> LibraryRecord {
    decode(text).0
}

/// Parse a stored blob and report whether every stored book survived.
/// Only a lossless parse may be written back over the original.
fn decode(text: &str) -> (LibraryRecord, bool) {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            let raw = RawLibraryRecord::from_value(&value);
            let lossless = value.is_object() && raw.discarded == 0;
            (normalize_raw(raw), lossless)
        }
        Err(e) => {
            tracing::warn!("Library record is malformed, reading as empty: {e}");
            (LibraryRecord::default(), false)
        }
    }
}

/// Owned-book lookup used by the feed reconciler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibrarySnapshot {
    statuses: HashMap<String, ReadingStatus>,
}

impl LibrarySnapshot {
    pub fn contains(&self, id: &str) -> bool {
        self.statuses.contains_key(id)
    }

    pub fn status_of(&self, id: &str) -> Option<ReadingStatus> {
        self.statuses.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

impl From<&LibraryRecord> for LibrarySnapshot {
    fn from(record: &LibraryRecord) -> Self {
        Self {
            statuses: record
                .books
                .iter()
                .map(|b| (b.id.clone(), b.status))
                .collect(),
        }
    }
}

pub struct LibraryStore {
    storage: Box<dyn RecordStorage>,
}

impl LibraryStore {
    /// Wrap `storage` and heal whatever record it already holds.
    pub fn new(storage: Box<dyn RecordStorage>) -> Self {
        let store = Self { storage };
        let record = store.load();
        tracing::debug!(books = record.books.len(), "Library store ready");
        store
    }

    /// Read the current record, writing it back if normalization changed it.
    fn load(&self) -> LibraryRecord {
        let raw = match self.storage.load(LIBRARY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return LibraryRecord::default(),
            Err(e) => {
                tracing::warn!("Failed to read library record: {e:#}");
                return LibraryRecord::default();
            }
        };

        let (record, lossless) = decode(&raw);
        if !lossless {
            tracing::warn!("Library record is damaged, leaving it as stored until the next write");
            return record;
        }
        match serde_json::to_string(&record) {
            Ok(healed) if healed != raw => {
                tracing::debug!("Writing back normalized library record");
                if let Err(e) = self.storage.save(LIBRARY_KEY, &healed) {
                    tracing::warn!("Failed to write back healed library record: {e:#}");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to encode library record: {e}"),
        }
        record
    }

    fn save(&self, record: &mut LibraryRecord) -> Result<()> {
        reindex(record);
        let encoded = serde_json::to_string(record)?;
        self.storage.save(LIBRARY_KEY, &encoded)
    }

    /// Add `book` as want-to-read. Adding a book that is already owned is a no-op.
    pub fn add(&mut self, book: &Book) -> Result<()> {
        let mut record = self.load();
        if record.contains(&book.id) {
            tracing::debug!(id = %book.id, "Book already in library");
            return Ok(());
        }
        let mut owned = book.clone();
        owned.status = ReadingStatus::WantToRead;
        record.books.push(owned);
        self.save(&mut record)?;
        tracing::debug!(id = %book.id, "Added book to library");
        Ok(())
    }

    /// Add `book` and move it straight to `status`.
    pub fn add_with_status(&mut self, book: &Book, status: ReadingStatus) -> Result<()> {
        self.add(book)?;
        self.set_status(&book.id, status)
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        let mut record = self.load();
        let before = record.books.len();
        record.books.retain(|b| b.id != id);
        if record.books.len() == before {
            return Ok(());
        }
        self.save(&mut record)?;
        tracing::debug!(id, "Removed book from library");
        Ok(())
    }

    /// The one status transition. Unknown ids are ignored.
    pub fn set_status(&mut self, id: &str, status: ReadingStatus) -> Result<()> {
        let mut record = self.load();
        let Some(book) = record.books.iter_mut().find(|b| b.id == id) else {
            return Ok(());
        };
        if book.status == status {
            return Ok(());
        }
        tracing::debug!(id, from = %book.status, to = %status, "Changing reading status");
        book.status = status;
        self.save(&mut record)
    }

    pub fn mark_read(&mut self, id: &str) -> Result<()> {
        self.set_status(id, ReadingStatus::Read)
    }

    pub fn mark_reading(&mut self, id: &str) -> Result<()> {
        self.set_status(id, ReadingStatus::Reading)
    }

    pub fn mark_unread(&mut self, id: &str) -> Result<()> {
        self.set_status(id, ReadingStatus::WantToRead)
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.load().contains(id)
    }

    pub fn list(&self) -> Vec<Book> {
        self.load().books
    }

    pub fn all_by_status(&self, status: ReadingStatus) -> Vec<Book> {
        self.load()
            .books
            .into_iter()
            .filter(|b| b.status == status)
            .collect()
    }

    pub fn want_to_read(&self) -> Vec<Book> {
        self.all_by_status(ReadingStatus::WantToRead)
    }

    pub fn reading(&self) -> Vec<Book> {
        self.all_by_status(ReadingStatus::Reading)
    }

    pub fn read(&self) -> Vec<Book> {
        self.all_by_status(ReadingStatus::Read)
    }

    /// The full normalized record, lists included.
    pub fn record(&self) -> LibraryRecord {
        self.load()
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        LibrarySnapshot::from(&self.load())
    }

    /// Forget the whole library.
    pub fn clear(&mut self) -> Result<()> {
        self.storage.remove(LIBRARY_KEY)
    }
}
