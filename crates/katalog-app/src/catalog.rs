// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{BTreeMap, BTreeSet};

use crate::collate::CollationKey;
use crate::request::{Lookup, LookupRequest, LookupResult, Ticket, TicketSeq};
use crate::{LookupKind, Record};

/// Option catalogs a form or dialog can fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Catalog {
    Genres,
    Libraries,
    Books,
    Readers,
    Topics,
    BooksWithTopics,
    BookTopics,
}

impl Catalog {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Genres => "genres",
            Self::Libraries => "libraries",
            Self::Books => "books",
            Self::Readers => "readers",
            Self::Topics => "topics",
            Self::BooksWithTopics => "books with topics",
            Self::BookTopics => "book topics",
        }
    }

    /// Catalogs that do not depend on a selection map straight onto a
    /// lookup. Book topics need the chosen library and book.
    pub const fn fixed_lookup(self) -> Option<LookupKind> {
        match self {
            Self::Genres => Some(LookupKind::Genres),
            Self::Libraries => Some(LookupKind::Libraries),
            Self::Books => Some(LookupKind::Books),
            Self::Readers => Some(LookupKind::Readers),
            Self::Topics => Some(LookupKind::Topics),
            Self::BooksWithTopics => Some(LookupKind::BooksWithTopics),
            Self::BookTopics => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// Typed `(record) -> {value, label}` mapping for a select field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub value: &'static str,
    pub label: &'static str,
}

impl Projection {
    pub const fn new(value: &'static str, label: &'static str) -> Self {
        Self { value, label }
    }

    pub fn project(self, record: &Record) -> Option<SelectOption> {
        let value = record.text(self.value);
        if value.is_empty() {
            return None;
        }
        let label = record.text(self.label);
        Some(SelectOption {
            label: if label.is_empty() { value.clone() } else { label },
            value,
        })
    }
}

pub const LIBRARY: Projection = Projection::new("library_id", "name");
pub const BOOK: Projection = Projection::new("book_id", "title");
pub const READER: Projection = Projection::new("reader_id", "full_name");
pub const GENRE: Projection = Projection::new("genre_id", "name");
pub const TOPIC: Projection = Projection::new("topic_id", "name");
pub const AUTHOR: Projection = Projection::new("author", "author");

static IDLE: Lookup = Lookup::Idle;

/// Fetch state per catalog for one form or dialog session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalogs {
    entries: BTreeMap<Catalog, Lookup>,
}

impl Catalogs {
    pub fn get(&self, catalog: Catalog) -> &Lookup {
        self.entries.get(&catalog).unwrap_or(&IDLE)
    }

    pub fn records(&self, catalog: Catalog) -> &[Record] {
        self.get(catalog).records().unwrap_or(&[])
    }

    pub fn is_loaded(&self, catalog: Catalog) -> bool {
        self.get(catalog).is_loaded()
    }

    pub fn insert(&mut self, catalog: Catalog, lookup: Lookup) {
        self.entries.insert(catalog, lookup);
    }

    pub fn reset(&mut self, catalog: Catalog) {
        self.entries.remove(&catalog);
    }

    /// Marks the catalog loading under a fresh ticket and returns the
    /// request to run.
    pub fn request(
        &mut self,
        catalog: Catalog,
        kind: LookupKind,
        tickets: &mut TicketSeq,
    ) -> LookupRequest {
        let ticket = tickets.issue();
        self.entries.insert(catalog, Lookup::Loading(ticket));
        log::debug!("lookup {} for {} issued as {ticket}", kind.describe(), catalog.label());
        LookupRequest { ticket, kind }
    }

    /// Settles whichever catalog waits on `ticket`.
    pub fn settle(&mut self, ticket: Ticket, result: LookupResult) -> Option<Catalog> {
        let (catalog, lookup) = self
            .entries
            .iter_mut()
            .find(|(_, lookup)| lookup.awaits(ticket))?;
        if let Err(message) = &result {
            log::warn!("{} failed to load: {message}", catalog.label());
        }
        lookup.settle(ticket, result);
        Some(*catalog)
    }

    pub fn awaits(&self, ticket: Ticket) -> bool {
        self.entries.values().any(|lookup| lookup.awaits(ticket))
    }
}

/// Distinct non-empty authors across the given books, locale-sorted.
pub fn author_index(books: &[Record]) -> Vec<String> {
    let distinct: BTreeSet<String> = books
        .iter()
        .map(|book| book.text("author"))
        .filter(|author| !author.trim().is_empty())
        .collect();
    let mut authors: Vec<String> = distinct.into_iter().collect();
    authors.sort_by_cached_key(|author| CollationKey::new(author));
    authors
}

#[cfg(test)]
mod tests {
    use super::{BOOK, Catalog, Catalogs, author_index};
    use crate::request::{Lookup, TicketSeq};
    use crate::{LookupKind, Record};

    #[test]
    fn projection_skips_rows_without_a_value() {
        let record = Record::new().with("title", "Untitled");
        assert_eq!(BOOK.project(&record), None);

        let record = Record::new().with("book_id", 4).with("title", "Война и мир");
        let option = BOOK.project(&record).expect("projected");
        assert_eq!(option.value, "4");
        assert_eq!(option.label, "Война и мир");
    }

    #[test]
    fn authors_are_distinct_and_locale_sorted() {
        let books = vec![
            Record::new().with("author", "Сидоров"),
            Record::new().with("author", "Иванов"),
            Record::new().with("author", "Сидоров"),
            Record::new().with("author", ""),
            Record::new().with("author", "Ёлкин"),
        ];
        assert_eq!(author_index(&books), vec!["Ёлкин", "Иванов", "Сидоров"]);
    }

    #[test]
    fn settle_routes_by_ticket() {
        let mut tickets = TicketSeq::new(1);
        let mut catalogs = Catalogs::default();
        let genres = catalogs.request(Catalog::Genres, LookupKind::Genres, &mut tickets);
        let libraries = catalogs.request(Catalog::Libraries, LookupKind::Libraries, &mut tickets);

        assert_eq!(
            catalogs.settle(libraries.ticket, Err("down".to_owned())),
            Some(Catalog::Libraries)
        );
        assert_eq!(catalogs.get(Catalog::Libraries).failure(), Some("down"));
        assert_eq!(catalogs.get(Catalog::Genres), &Lookup::Loading(genres.ticket));
        assert_eq!(catalogs.settle(libraries.ticket, Ok(Vec::new())), None);
    }
}
