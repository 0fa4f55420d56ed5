//! Scripture lookup seam and the navigation/selection resolver.
//!
//! Chapter text arrives asynchronously while navigation keeps moving. Every
//! fetch carries a [`FetchTicket`]; a result is applied only if its ticket
//! still names the current navigation, so the last navigation always wins.

use std::collections::BTreeSet;

use async_trait::async_trait;
use shared::{
    domain::NavigationCoords,
    protocol::{BookInfo, Intent, PresentRequest, PresentationContent, VerseSelection},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSummary {
    pub name: String,
    pub abbreviation: String,
    pub chapter_count: Option<u32>,
}

impl BookSummary {
    pub fn into_info(self, default_chapter_count: u32) -> BookInfo {
        BookInfo {
            name: self.name,
            abbrev: self.abbreviation,
            chapters: self.chapter_count.unwrap_or(default_chapter_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("scripture lookup unavailable: {0}")]
    Unavailable(String),
}

/// Read-only scripture source.
#[async_trait]
pub trait ScriptureLookup: Send + Sync + 'static {
    async fn books(&self) -> Result<Vec<BookSummary>, LookupError>;

    /// `chapter` is 1-based.
    async fn chapter(
        &self,
        version: &str,
        book_index: u32,
        chapter: u32,
    ) -> Result<Vec<String>, LookupError>;
}

/// `"John 1:4"`, `"John 1:1-3"` or `"John 1:1,3,5"` for 0-based `indices`.
pub fn format_reference(book: &str, chapter_number: u32, indices: &BTreeSet<u32>) -> Option<String> {
    let verses: Vec<u32> = indices.iter().map(|index| index.saturating_add(1)).collect();
    let first = *verses.first()?;
    let last = *verses.last()?;

    let label = if verses.len() == 1 {
        first.to_string()
    } else if (last - first) as usize + 1 == verses.len() {
        format!("{first}-{last}")
    } else {
        verses
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    };
    Some(format!("{book} {chapter_number}:{label}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub stamp: u64,
    pub coords: NavigationCoords,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresentOutcome {
    /// Coordinates were already loaded; apply this content intent now.
    Show(Intent),
    /// Coordinates match but their fetch is still in flight.
    Queued,
    /// Navigation moved; clear content and start this fetch.
    Navigate(FetchTicket),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Discarded,
    Loaded { verses: usize },
    Presented(Intent),
}

#[derive(Debug, Clone)]
struct PendingSelection {
    coords: NavigationCoords,
    indices: BTreeSet<u32>,
}

#[derive(Debug, Default)]
pub struct NavigationResolver {
    books: Vec<BookSummary>,
    current: Option<NavigationCoords>,
    stamp: u64,
    /// Verses of `current`; `None` while its fetch is in flight.
    verses: Option<Vec<String>>,
    selection: BTreeSet<u32>,
    pending: Option<PendingSelection>,
}

impl NavigationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_books(&mut self, books: Vec<BookSummary>) {
        self.books = books;
    }

    pub fn book_name(&self, book_index: u32) -> String {
        self.books
            .get(book_index as usize)
            .map(|book| book.name.clone())
            .unwrap_or_else(|| format!("Book {}", book_index.saturating_add(1)))
    }

    pub fn current(&self) -> Option<&NavigationCoords> {
        self.current.as_ref()
    }

    pub fn selection(&self) -> &BTreeSet<u32> {
        &self.selection
    }

    pub fn is_loaded(&self) -> bool {
        self.verses.is_some()
    }

    /// Returns the fetch to issue, or `None` when `coords` is already current.
    pub fn navigate(&mut self, coords: NavigationCoords) -> Option<FetchTicket> {
        if self.current.as_ref() == Some(&coords) {
            return None;
        }
        Some(self.begin(coords))
    }

    fn begin(&mut self, coords: NavigationCoords) -> FetchTicket {
        self.stamp += 1;
        self.current = Some(coords.clone());
        self.verses = None;
        self.selection.clear();
        self.pending = None;
        FetchTicket {
            stamp: self.stamp,
            coords,
        }
    }

    pub fn present(&mut self, request: PresentRequest) -> PresentOutcome {
        let coords = request.coords();
        let indices: BTreeSet<u32> = request.indices.into_iter().collect();

        if self.current.as_ref() == Some(&coords) {
            if self.verses.is_some() {
                return PresentOutcome::Show(self.select_indices(indices));
            }
            self.pending = Some(PendingSelection { coords, indices });
            return PresentOutcome::Queued;
        }

        let ticket = self.begin(coords.clone());
        self.pending = Some(PendingSelection { coords, indices });
        PresentOutcome::Navigate(ticket)
    }

    /// Applies a finished fetch if it still belongs to the current navigation.
    /// A queued selection for those coordinates is resolved against `verses`.
    pub fn complete_fetch(&mut self, ticket: FetchTicket, verses: Vec<String>) -> FetchOutcome {
        if ticket.stamp != self.stamp || self.current.as_ref() != Some(&ticket.coords) {
            return FetchOutcome::Discarded;
        }

        let count = verses.len();
        self.verses = Some(verses);
        match self.pending.take() {
            Some(pending) if pending.coords == ticket.coords => {
                FetchOutcome::Presented(self.select_indices(pending.indices))
            }
            _ => FetchOutcome::Loaded { verses: count },
        }
    }

    /// Local controller selection gestures. `None` when no chapter is loaded.
    pub fn select(&mut self, gesture: VerseSelection) -> Option<Intent> {
        let count = self.verses.as_ref()?.len();
        let last_verse = u32::try_from(count).unwrap_or(u32::MAX).saturating_sub(1);

        let indices = match gesture {
            VerseSelection::Set { indices } => indices.into_iter().collect(),
            VerseSelection::Click { index } => BTreeSet::from([index]),
            VerseSelection::Toggle { index } => {
                let mut next = self.selection.clone();
                if !next.remove(&index) {
                    next.insert(index);
                }
                next
            }
            VerseSelection::Extend { index } => {
                match (self.selection.first(), self.selection.last()) {
                    (Some(&low), Some(&high)) => {
                        (low.min(index)..=high.max(index.min(last_verse))).collect()
                    }
                    _ => BTreeSet::from([index]),
                }
            }
        };
        Some(self.select_indices(indices))
    }

    fn select_indices(&mut self, indices: BTreeSet<u32>) -> Intent {
        let count = self.verses.as_ref().map_or(0, Vec::len);
        self.selection = indices
            .into_iter()
            .filter(|index| (*index as usize) < count)
            .collect();
        self.content_intent()
    }

    fn content_intent(&self) -> Intent {
        let (Some(coords), Some(verses)) = (self.current.as_ref(), self.verses.as_ref()) else {
            return Intent::ClearContent;
        };
        let book = self.book_name(coords.book_index);
        let Some(title) = format_reference(&book, coords.chapter_number(), &self.selection) else {
            return Intent::ClearContent;
        };
        let body = self
            .selection
            .iter()
            .filter_map(|index| verses.get(*index as usize))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        Intent::SetContent {
            content: PresentationContent::Bible { title, body },
        }
    }
}

#[cfg(test)]
#[path = "tests/scripture_tests.rs"]
mod tests;
