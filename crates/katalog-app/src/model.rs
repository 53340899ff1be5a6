// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::{BookId, LibraryId};

/// One cell as the backend sent it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// The single stringification shared by filters, search, sorting and
    /// rendering. Null renders as the empty string.
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(value) => value.is_empty(),
            _ => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(value) => serde_json::Value::Bool(*value),
            Self::Integer(value) => serde_json::Value::from(*value),
            Self::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(value) => serde_json::Value::String(value.clone()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Text(value) => serializer.serialize_str(value),
        }
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON scalar")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Scalar, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Scalar, E> {
        Ok(Scalar::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Scalar, E> {
        Ok(Scalar::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Scalar, E> {
        Ok(match i64::try_from(value) {
            Ok(value) => Scalar::Integer(value),
            Err(_) => Scalar::Float(value as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Scalar, E> {
        Ok(Scalar::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Scalar, E> {
        Ok(Scalar::Text(value.to_owned()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Scalar, E> {
        Ok(Scalar::Text(value))
    }

    // Aggregated columns occasionally arrive as arrays; flatten them the
    // way the grid would print them.
    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Scalar, A::Error> {
        let mut parts = Vec::new();
        while let Some(item) = seq.next_element::<Scalar>()? {
            parts.push(item.display());
        }
        Ok(Scalar::Text(parts.join(", ")))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Scalar, A::Error> {
        let value =
            serde_json::Value::deserialize(de::value::MapAccessDeserializer::new(map))?;
        Ok(Scalar::Text(value.to_string()))
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// A flat row. Keeps the key order the server used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Scalar>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn insert(&mut self, column: &str, value: Scalar) {
        match self.fields.iter_mut().find(|(name, _)| name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column.to_owned(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Display text of a cell; missing columns read as empty.
    pub fn text(&self, column: &str) -> String {
        self.get(column).map(Scalar::display).unwrap_or_default()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Scalar> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a flat JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Record, A::Error> {
        let mut record = Record {
            fields: Vec::with_capacity(map.size_hint().unwrap_or(0)),
        };
        while let Some((column, value)) = map.next_entry::<String, Scalar>()? {
            record.insert(&column, value);
        }
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DatasetKind {
    Books,
    Genres,
    Libraries,
    Loans,
    Readers,
    Topics,
    AvailableBooks,
    BookGenresCount,
    LibraryBooksQuantity,
    ReadersWithLoans,
    BookTopicsDetailed,
}

impl DatasetKind {
    pub const ALL: [Self; 11] = [
        Self::Books,
        Self::Genres,
        Self::Libraries,
        Self::Loans,
        Self::Readers,
        Self::Topics,
        Self::AvailableBooks,
        Self::BookGenresCount,
        Self::LibraryBooksQuantity,
        Self::ReadersWithLoans,
        Self::BookTopicsDetailed,
    ];

    /// REST path segment, also the name accepted by `--table`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Books => "books",
            Self::Genres => "genres",
            Self::Libraries => "libraries",
            Self::Loans => "loans",
            Self::Readers => "readers",
            Self::Topics => "topics",
            Self::AvailableBooks => "available-books",
            Self::BookGenresCount => "book-genres-count",
            Self::LibraryBooksQuantity => "library-books-quantity",
            Self::ReadersWithLoans => "readers-with-loans",
            Self::BookTopicsDetailed => "book-topics-detailed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Books => "books",
            Self::Genres => "genres",
            Self::Libraries => "libraries",
            Self::Loans => "loans",
            Self::Readers => "readers",
            Self::Topics => "topics",
            Self::AvailableBooks => "available",
            Self::BookGenresCount => "per genre",
            Self::LibraryBooksQuantity => "per library",
            Self::ReadersWithLoans => "active readers",
            Self::BookTopicsDetailed => "book topics",
        }
    }

    pub const fn fixed_columns(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Books => Some(&[
                "title",
                "author",
                "book_id",
                "genre_id",
                "library_id",
                "publication_place",
                "publication_year",
                "publisher",
                "quantity",
            ]),
            Self::Libraries => Some(&["library_id", "name", "address"]),
            Self::Loans => Some(&[
                "library_id",
                "library_name",
                "book_id",
                "book_title",
                "reader_id",
                "reader_name",
                "issue_date",
                "due_date",
                "return_date",
                "deposit",
            ]),
            Self::Readers => Some(&["reader_id", "full_name", "phone", "address"]),
            Self::AvailableBooks => Some(&[
                "book_title",
                "book_author",
                "library_name",
                "available_quantity",
                "total_quantity",
            ]),
            Self::BookTopicsDetailed => Some(&["book_title", "book_author", "topic_names"]),
            Self::ReadersWithLoans => Some(&[
                "reader_name",
                "current_loans_count",
                "reader_phone",
                "library_id",
                "reader_address",
                "borrowed_books",
            ]),
            Self::Genres
            | Self::Topics
            | Self::BookGenresCount
            | Self::LibraryBooksQuantity => None,
        }
    }
}

/// The active table's rows, replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub kind: DatasetKind,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(kind: DatasetKind, records: Vec<Record>) -> Self {
        let columns = match kind.fixed_columns() {
            Some(fixed) => fixed.iter().map(|column| (*column).to_owned()).collect(),
            None => records
                .first()
                .map(|first| first.columns().map(str::to_owned).collect())
                .unwrap_or_default(),
        };
        Self {
            kind,
            columns,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|name| name == column)
    }
}

/// Non-grid fetches that feed form selects and deletion dialogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Genres,
    Libraries,
    Books,
    Readers,
    Topics,
    BooksWithTopics,
    AvailableBooks,
    BookTopics {
        library_id: LibraryId,
        book_id: BookId,
    },
}

impl LookupKind {
    pub fn path_segments(self) -> Vec<String> {
        match self {
            Self::Genres => vec!["genres".to_owned()],
            Self::Libraries => vec!["libraries".to_owned()],
            Self::Books => vec!["books".to_owned()],
            Self::Readers => vec!["readers".to_owned()],
            Self::Topics => vec!["topics".to_owned()],
            Self::BooksWithTopics => vec!["books-with-topics".to_owned()],
            Self::AvailableBooks => vec!["available-books".to_owned()],
            Self::BookTopics {
                library_id,
                book_id,
            } => vec![
                "book-topics".to_owned(),
                library_id.to_string(),
                book_id.to_string(),
            ],
        }
    }

    pub fn describe(self) -> String {
        format!("/{}", self.path_segments().join("/"))
    }
}

/// Human header for a backend column name.
pub fn column_label(column: &str) -> String {
    let known = match column {
        "library_id" => "Library #",
        "book_id" => "Book #",
        "reader_id" => "Reader #",
        "genre_id" => "Genre #",
        "topic_id" => "Topic #",
        "name" | "title" => "Name",
        "library_name" => "Library",
        "book_title" => "Book",
        "reader_name" => "Reader",
        "full_name" => "Full name",
        "genre_name" => "Genre",
        "topic_names" => "Topics",
        "author" | "book_author" => "Author",
        "publisher" => "Publisher",
        "publication_place" => "Published in",
        "publication_year" => "Year",
        "quantity" => "Quantity",
        "issue_date" => "Issued",
        "due_date" => "Due",
        "return_date" => "Returned",
        "deposit" => "Deposit",
        "book_count" => "Books",
        "total_books" => "Total books",
        "available_quantity" => "Available",
        "total_quantity" => "Total",
        "current_loans_count" => "Active loans",
        "borrowed_books" => "Borrowed",
        "address" | "reader_address" => "Address",
        "phone" | "reader_phone" => "Phone",
        _ => "",
    };
    if !known.is_empty() {
        return known.to_owned();
    }

    let mut label = column.replace(['_', '-'], " ");
    if let Some(first) = label.get(..1) {
        let upper = first.to_uppercase();
        label.replace_range(..1, &upper);
    }
    label
}
