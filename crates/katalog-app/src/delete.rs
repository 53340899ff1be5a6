// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::catalog::{BOOK, Catalog, Catalogs, LIBRARY, Projection, READER, SelectOption};
use crate::error::{FormInputError, LocalValidationError};
use crate::request::{LookupRequest, LookupResult, Ticket, TicketSeq, WriteMethod, WriteRequest};
use crate::{BookId, LibraryId, ReaderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteKind {
    Book,
    Reader,
    ReaderByName,
    Library,
    Genre,
    Topic,
    Loan,
}

/// How a deletion identifies its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteShape {
    ById,
    Composite,
    NaturalKey,
}

impl DeleteKind {
    pub const ALL: [Self; 7] = [
        Self::Book,
        Self::Reader,
        Self::ReaderByName,
        Self::Library,
        Self::Genre,
        Self::Topic,
        Self::Loan,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Reader => "reader",
            Self::ReaderByName => "reader by name",
            Self::Library => "library",
            Self::Genre => "genre",
            Self::Topic => "topic",
            Self::Loan => "loan",
        }
    }

    pub const fn shape(self) -> DeleteShape {
        match self {
            Self::Reader | Self::Library | Self::Genre | Self::Topic => DeleteShape::ById,
            Self::Book | Self::Loan => DeleteShape::Composite,
            Self::ReaderByName => DeleteShape::NaturalKey,
        }
    }

    pub const fn fields(self) -> &'static [DeleteField] {
        match self {
            Self::Reader => &[READER_ID],
            Self::Library => &[LIBRARY_ID],
            Self::Genre => &[GENRE_ID],
            Self::Topic => &[TOPIC_ID],
            Self::Book => &[LIBRARY_ID_PART, BOOK_ID_PART],
            Self::ReaderByName => &[FULL_NAME],
            Self::Loan => LOAN_FIELDS,
        }
    }

    // Path segment of the single-id delete endpoint.
    const fn entity(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Reader | Self::ReaderByName => "reader",
            Self::Library => "library",
            Self::Genre => "genre",
            Self::Topic => "topic",
            Self::Loan => "loan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteInput {
    Number,
    Text,
    Select(Catalog, Projection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteField {
    pub name: &'static str,
    pub label: &'static str,
    pub input: DeleteInput,
    pub requires: Option<&'static str>,
}

impl DeleteField {
    const fn number(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            input: DeleteInput::Number,
            requires: None,
        }
    }
}

const READER_ID: DeleteField = DeleteField::number("id", "Reader ID");
const LIBRARY_ID: DeleteField = DeleteField::number("id", "Library ID");
const GENRE_ID: DeleteField = DeleteField::number("id", "Genre ID");
const TOPIC_ID: DeleteField = DeleteField::number("id", "Topic ID");
const LIBRARY_ID_PART: DeleteField = DeleteField::number("library_id", "Library ID");
const BOOK_ID_PART: DeleteField = DeleteField::number("book_id", "Book ID");
const FULL_NAME: DeleteField = DeleteField {
    name: "full_name",
    label: "Full name",
    input: DeleteInput::Text,
    requires: None,
};

// Library, then book within it, then reader. Strict order.
const LOAN_FIELDS: &[DeleteField] = &[
    DeleteField {
        name: "library_id",
        label: "Library",
        input: DeleteInput::Select(Catalog::Libraries, LIBRARY),
        requires: None,
    },
    DeleteField {
        name: "book_id",
        label: "Book",
        input: DeleteInput::Select(Catalog::Books, BOOK),
        requires: Some("library_id"),
    },
    DeleteField {
        name: "reader_id",
        label: "Reader",
        input: DeleteInput::Select(Catalog::Readers, READER),
        requires: Some("book_id"),
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteRequest {
    ById {
        kind: DeleteKind,
        id: i64,
    },
    Book {
        library_id: LibraryId,
        book_id: BookId,
    },
    Loan {
        library_id: LibraryId,
        book_id: BookId,
        reader_id: ReaderId,
    },
    ReaderByName {
        full_name: String,
    },
}

impl DeleteRequest {
    pub fn shape(&self) -> DeleteShape {
        match self {
            Self::ById { .. } => DeleteShape::ById,
            Self::Book { .. } | Self::Loan { .. } => DeleteShape::Composite,
            Self::ReaderByName { .. } => DeleteShape::NaturalKey,
        }
    }

    pub fn to_write(&self) -> WriteRequest {
        match self {
            Self::ById { kind, id } => WriteRequest::new(
                WriteMethod::Delete,
                &["delete", kind.entity(), &id.to_string()],
                None,
            ),
            Self::Book {
                library_id,
                book_id,
            } => WriteRequest::new(
                WriteMethod::Delete,
                &[
                    "delete",
                    "book",
                    &library_id.to_string(),
                    &book_id.to_string(),
                ],
                None,
            ),
            Self::Loan {
                library_id,
                book_id,
                reader_id,
            } => {
                let mut body = Map::new();
                body.insert("library_id".to_owned(), Value::from(library_id.get()));
                body.insert("book_id".to_owned(), Value::from(book_id.get()));
                body.insert("reader_id".to_owned(), Value::from(reader_id.get()));
                WriteRequest::new(
                    WriteMethod::Delete,
                    &["delete", "loan"],
                    Some(Value::Object(body)),
                )
            }
            Self::ReaderByName { full_name } => WriteRequest::new(
                WriteMethod::Delete,
                &["delete", "reader", "by-name", full_name],
                None,
            ),
        }
    }

    /// Restates the literal identifying values.
    pub fn describe(&self) -> String {
        match self {
            Self::ById { kind, id } => format!("{} {id}", kind.label()),
            Self::Book {
                library_id,
                book_id,
            } => format!("book {book_id} in library {library_id}"),
            Self::Loan {
                library_id,
                book_id,
                reader_id,
            } => format!("loan of book {book_id} in library {library_id} to reader {reader_id}"),
            Self::ReaderByName { full_name } => format!("reader named \"{full_name}\""),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStage {
    Editing,
    Confirming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDeleteField {
    pub field: DeleteField,
    pub enabled: bool,
    pub value: String,
    pub options: Vec<SelectOption>,
}

/// One deletion dialog. Confirm only ever fires from the confirming
/// stage, which restates what is about to be deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteDraft {
    kind: DeleteKind,
    stage: DeleteStage,
    tickets: TicketSeq,
    catalogs: Catalogs,
    values: BTreeMap<&'static str, String>,
    pending: Option<DeleteRequest>,
    pub error: Option<String>,
}

impl DeleteDraft {
    pub fn open(kind: DeleteKind, session: u32) -> (Self, Vec<LookupRequest>) {
        let mut draft = Self {
            kind,
            stage: DeleteStage::Editing,
            tickets: TicketSeq::new(session),
            catalogs: Catalogs::default(),
            values: kind
                .fields()
                .iter()
                .map(|field| (field.name, String::new()))
                .collect(),
            pending: None,
            error: None,
        };
        let mut requests = Vec::new();
        for field in kind.fields() {
            if let DeleteInput::Select(catalog, _) = field.input
                && let Some(lookup) = catalog.fixed_lookup()
            {
                requests.push(draft.catalogs.request(catalog, lookup, &mut draft.tickets));
            }
        }
        (draft, requests)
    }

    pub const fn kind(&self) -> DeleteKind {
        self.kind
    }

    pub const fn stage(&self) -> DeleteStage {
        self.stage
    }

    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn fields(&self) -> Vec<ResolvedDeleteField> {
        let mut resolved: Vec<ResolvedDeleteField> = Vec::new();
        for field in self.kind.fields() {
            let prerequisite = field.requires.is_none_or(|name| {
                resolved.iter().any(|other| {
                    other.field.name == name && other.enabled && !other.value.is_empty()
                })
            });
            let (enabled, options) = match field.input {
                DeleteInput::Select(catalog, projection) => {
                    let enabled = prerequisite && self.catalogs.is_loaded(catalog);
                    let options = if enabled {
                        self.options(catalog, projection)
                    } else {
                        Vec::new()
                    };
                    (enabled, options)
                }
                DeleteInput::Number | DeleteInput::Text => (prerequisite, Vec::new()),
            };
            resolved.push(ResolvedDeleteField {
                field: *field,
                enabled,
                value: self.value(field.name).to_owned(),
                options,
            });
        }
        resolved
    }

    fn options(&self, catalog: Catalog, projection: Projection) -> Vec<SelectOption> {
        let library = self.value("library_id");
        self.catalogs
            .records(catalog)
            .iter()
            .filter(|record| catalog != Catalog::Books || record.text("library_id") == library)
            .filter_map(|record| projection.project(record))
            .collect()
    }

    pub fn note(&self, name: &str) -> Option<String> {
        let field = self.kind.fields().iter().find(|field| field.name == name)?;
        if let DeleteInput::Select(catalog, _) = field.input
            && let Some(message) = self.catalogs.get(catalog).failure()
        {
            return Some(format!("{} unavailable: {message}", catalog.label()));
        }
        let fields = self.fields();
        let current = fields.iter().find(|resolved| resolved.field.name == name)?;
        if current.enabled {
            return None;
        }
        match field.requires {
            Some(required) => {
                let label = self
                    .kind
                    .fields()
                    .iter()
                    .find(|other| other.name == required)
                    .map_or(required, |other| other.label);
                Some(format!("choose {label} first"))
            }
            None => Some("loading…".to_owned()),
        }
    }

    /// Edits a field. Later loan selects are cleared when an earlier one
    /// changes.
    pub fn set_value(&mut self, name: &str, value: &str) -> Result<(), FormInputError> {
        if self.stage == DeleteStage::Confirming {
            self.back();
        }
        let fields = self.fields();
        let Some(resolved) = fields.iter().find(|resolved| resolved.field.name == name) else {
            return Err(FormInputError::UnknownField(name.to_owned()));
        };
        if !resolved.enabled {
            return Err(FormInputError::Disabled(resolved.field.label.to_owned()));
        }
        if matches!(resolved.field.input, DeleteInput::Select(..))
            && !value.is_empty()
            && !resolved.options.iter().any(|option| option.value == value)
        {
            return Err(FormInputError::NotAnOption {
                field: resolved.field.label.to_owned(),
                value: value.to_owned(),
            });
        }
        let field = resolved.field;
        let changed = self.value(field.name) != value;
        self.values.insert(field.name, value.to_owned());
        if changed && matches!(field.input, DeleteInput::Select(..)) {
            let mut cleared = field.name;
            for later in self.kind.fields() {
                if later.requires == Some(cleared) {
                    self.values.insert(later.name, String::new());
                    cleared = later.name;
                }
            }
        }
        Ok(())
    }

    pub fn request(&self) -> Result<DeleteRequest, LocalValidationError> {
        let mut problems = LocalValidationError::default();
        for field in self.kind.fields() {
            let value = self.value(field.name).trim();
            if value.is_empty() {
                problems.missing.push(field.label.to_owned());
            } else if !matches!(field.input, DeleteInput::Text)
                && value.parse::<i64>().map_or(true, |id| id <= 0)
            {
                problems.invalid.push(field.label.to_owned());
            }
        }
        if !problems.is_empty() {
            return Err(problems);
        }

        let id = |name: &str| self.value(name).trim().parse::<i64>().unwrap_or_default();
        Ok(match self.kind {
            DeleteKind::Reader | DeleteKind::Library | DeleteKind::Genre | DeleteKind::Topic => {
                DeleteRequest::ById {
                    kind: self.kind,
                    id: id("id"),
                }
            }
            DeleteKind::Book => DeleteRequest::Book {
                library_id: LibraryId::new(id("library_id")),
                book_id: BookId::new(id("book_id")),
            },
            DeleteKind::Loan => DeleteRequest::Loan {
                library_id: LibraryId::new(id("library_id")),
                book_id: BookId::new(id("book_id")),
                reader_id: ReaderId::new(id("reader_id")),
            },
            DeleteKind::ReaderByName => DeleteRequest::ReaderByName {
                full_name: self.value("full_name").to_owned(),
            },
        })
    }

    /// Moves to the confirming stage once every field is populated.
    pub fn begin_confirm(&mut self) -> Result<(), LocalValidationError> {
        let request = self.request()?;
        self.pending = Some(request);
        self.stage = DeleteStage::Confirming;
        self.error = None;
        Ok(())
    }

    pub fn back(&mut self) {
        self.stage = DeleteStage::Editing;
        self.pending = None;
    }

    pub fn confirmation_text(&self) -> Option<String> {
        if self.stage != DeleteStage::Confirming {
            return None;
        }
        let request = self.pending.as_ref()?;
        Some(format!("Delete {}? This cannot be undone.", request.describe()))
    }

    pub fn confirm(&self) -> Option<DeleteRequest> {
        match self.stage {
            DeleteStage::Confirming => self.pending.clone(),
            DeleteStage::Editing => None,
        }
    }

    /// The server refused; inputs stay so the user can adjust and retry.
    pub fn fail(&mut self, message: &str) {
        self.back();
        self.error = Some(message.to_owned());
    }

    pub fn awaits(&self, ticket: Ticket) -> bool {
        self.catalogs.awaits(ticket)
    }

    pub fn apply_lookup(&mut self, ticket: Ticket, result: LookupResult) -> bool {
        self.catalogs.settle(ticket, result).is_some()
    }
}
