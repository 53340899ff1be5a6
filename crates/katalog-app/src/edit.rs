// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::{Map, Value};
use thiserror::Error as ThisError;

use crate::grid::parse_number;
use crate::request::{WriteMethod, WriteRequest};
use crate::{DatasetKind, Record, Scalar};

pub const IDENTIFIER_WARNING: &str = "identifier columns cannot be edited";

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum EditError {
    #[error("{0} is a derived view and cannot be edited -- switch to its base table")]
    ReadOnlyTable(&'static str),
    #[error("{0} is an identifier column -- {IDENTIFIER_WARNING}")]
    IdentifierColumn(String),
    #[error("row is missing its {0} key -- reload the table and retry")]
    MissingKey(String),
    #[error("unknown column {0}")]
    UnknownColumn(String),
}

/// Identifier-bearing columns are immutable through inline editing.
pub fn is_identifier_column(column: &str) -> bool {
    column.to_lowercase().contains("_id")
}

/// Key columns that locate one row server-side, or `None` for read-only
/// datasets.
pub const fn key_columns(table: DatasetKind) -> Option<&'static [&'static str]> {
    match table {
        DatasetKind::Books => Some(&["library_id", "book_id"]),
        DatasetKind::Readers => Some(&["reader_id"]),
        DatasetKind::Libraries => Some(&["library_id"]),
        DatasetKind::Loans => Some(&["library_id", "book_id", "reader_id"]),
        DatasetKind::Genres => Some(&["genre_id"]),
        DatasetKind::Topics => Some(&["topic_id"]),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub table: DatasetKind,
    pub column: String,
    pub value: Scalar,
    pub row_key: Record,
}

impl EditRequest {
    pub fn to_write(&self) -> WriteRequest {
        let row_data: Map<String, Value> = self
            .row_key
            .columns()
            .zip(self.row_key.values())
            .map(|(column, value)| (column.to_owned(), value.to_json()))
            .collect();
        let mut body = Map::new();
        body.insert("column".to_owned(), Value::String(self.column.clone()));
        body.insert("value".to_owned(), self.value.to_json());
        body.insert("rowData".to_owned(), Value::Object(row_data));
        WriteRequest::new(
            WriteMethod::Put,
            &["edit", self.table.as_str()],
            Some(Value::Object(body)),
        )
    }
}

/// Single-cell editor, pre-filled with the cell's current value.
#[derive(Debug, Clone, PartialEq)]
pub struct EditDraft {
    table: DatasetKind,
    column: String,
    original: Scalar,
    row: Record,
    input: String,
    pub error: Option<String>,
}

impl EditDraft {
    pub fn open(table: DatasetKind, row: &Record, column: &str) -> Result<Self, EditError> {
        if key_columns(table).is_none() {
            return Err(EditError::ReadOnlyTable(table.label()));
        }
        let original = row
            .get(column)
            .cloned()
            .ok_or_else(|| EditError::UnknownColumn(column.to_owned()))?;
        Ok(Self {
            table,
            column: column.to_owned(),
            input: original.display(),
            original,
            row: row.clone(),
            error: None,
        })
    }

    pub const fn table(&self) -> DatasetKind {
        self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_locked(&self) -> bool {
        is_identifier_column(&self.column)
    }

    /// Standing warning shown for as long as a locked editor is open.
    pub fn warning(&self) -> Option<&'static str> {
        self.is_locked().then_some(IDENTIFIER_WARNING)
    }

    /// Replaces the input. Locked editors ignore input.
    pub fn set_input(&mut self, input: &str) -> bool {
        if self.is_locked() {
            return false;
        }
        input.clone_into(&mut self.input);
        true
    }

    pub fn request(&self) -> Result<EditRequest, EditError> {
        if self.is_locked() {
            return Err(EditError::IdentifierColumn(self.column.clone()));
        }
        let mut row_key = Record::new();
        for key in key_columns(self.table).unwrap_or(&[]) {
            match self.row.get(key) {
                Some(value) if !value.is_blank() => row_key.insert(key, value.clone()),
                _ => return Err(EditError::MissingKey((*key).to_owned())),
            }
        }
        Ok(EditRequest {
            table: self.table,
            column: self.column.clone(),
            value: self.typed_input(),
            row_key,
        })
    }

    // Numeric cells stay numeric when the new text still parses.
    fn typed_input(&self) -> Scalar {
        let text = self.input.trim();
        match self.original {
            Scalar::Integer(_) | Scalar::Float(_) => {
                if let Ok(integer) = text.parse::<i64>() {
                    Scalar::Integer(integer)
                } else if let Some(number) = parse_number(text) {
                    Scalar::Float(number)
                } else {
                    Scalar::Text(self.input.clone())
                }
            }
            _ => Scalar::Text(self.input.clone()),
        }
    }
}
