// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::Date;
use time::macros::format_description;

use crate::catalog::{
    AUTHOR, BOOK, Catalog, Catalogs, GENRE, LIBRARY, Projection, READER, SelectOption, TOPIC,
    author_index,
};
use crate::error::{FormInputError, LocalValidationError, SubmitError};
use crate::grid::parse_number;
use crate::request::{
    LookupRequest, LookupResult, Ticket, TicketSeq, WriteMethod, WriteRequest,
};
use crate::{BookId, LibraryId, LookupKind, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormKind {
    Book,
    Reader,
    Library,
    Genre,
    Topic,
    Loan,
    ReaderWithLoan,
    BookTopic,
    DeleteBookTopic,
}

impl FormKind {
    pub const ALL: [Self; 9] = [
        Self::Book,
        Self::Reader,
        Self::Library,
        Self::Genre,
        Self::Topic,
        Self::Loan,
        Self::ReaderWithLoan,
        Self::BookTopic,
        Self::DeleteBookTopic,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Reader => "reader",
            Self::Library => "library",
            Self::Genre => "genre",
            Self::Topic => "topic",
            Self::Loan => "loan",
            Self::ReaderWithLoan => "reader-with-loan",
            Self::BookTopic => "book-topic",
            Self::DeleteBookTopic => "delete-book-topic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::Book => "Add book",
            Self::Reader => "Add reader",
            Self::Library => "Add library",
            Self::Genre => "Add genre",
            Self::Topic => "Add topic",
            Self::Loan => "Add loan",
            Self::ReaderWithLoan => "Add reader with loan",
            Self::BookTopic => "Assign topics to book",
            Self::DeleteBookTopic => "Remove topics from book",
        }
    }

    pub const fn method(self) -> WriteMethod {
        match self {
            Self::DeleteBookTopic => WriteMethod::Delete,
            _ => WriteMethod::Post,
        }
    }

    pub fn endpoint(self) -> Vec<String> {
        match self {
            Self::DeleteBookTopic => vec!["delete".to_owned(), "book-topic".to_owned()],
            other => vec!["add".to_owned(), other.as_str().to_owned()],
        }
    }

    /// Loan-creating forms gate submission on the chosen book having a
    /// free copy.
    pub const fn checks_availability(self) -> bool {
        matches!(self, Self::Loan | Self::ReaderWithLoan)
    }

    pub const fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Book => BOOK_FIELDS,
            Self::Reader => READER_FIELDS,
            Self::Library => LIBRARY_FIELDS,
            Self::Genre | Self::Topic => NAME_FIELDS,
            Self::Loan => LOAN_FIELDS,
            Self::ReaderWithLoan => READER_WITH_LOAN_FIELDS,
            Self::BookTopic => BOOK_TOPIC_FIELDS,
            Self::DeleteBookTopic => DELETE_BOOK_TOPIC_FIELDS,
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Select,
    /// One row per chosen value; each value becomes its own write carrying
    /// `each` as the key.
    MultiSelect { each: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSource {
    Libraries,
    LibrariesWithTopics,
    Books,
    BooksWithTopics,
    Readers,
    Genres,
    Topics,
    BookTopics,
    Authors,
}

impl OptionSource {
    pub const fn catalogs(self) -> &'static [Catalog] {
        match self {
            Self::Libraries => &[Catalog::Libraries],
            Self::LibrariesWithTopics => &[Catalog::Libraries, Catalog::BooksWithTopics],
            Self::Books | Self::Authors => &[Catalog::Books],
            Self::BooksWithTopics => &[Catalog::BooksWithTopics],
            Self::Readers => &[Catalog::Readers],
            Self::Genres => &[Catalog::Genres],
            Self::Topics => &[Catalog::Topics],
            Self::BookTopics => &[Catalog::BookTopics],
        }
    }

    pub const fn projection(self) -> Projection {
        match self {
            Self::Libraries | Self::LibrariesWithTopics => LIBRARY,
            Self::Books | Self::BooksWithTopics => BOOK,
            Self::Readers => READER,
            Self::Genres => GENRE,
            Self::Topics | Self::BookTopics => TOPIC,
            Self::Authors => AUTHOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Local-only fields (such as the author filter) never reach the wire.
    pub submitted: bool,
    pub source: Option<OptionSource>,
    /// Fields that must hold a value before this one is enabled.
    pub requires: &'static [&'static str],
    /// Fields whose change clears this one.
    pub scoped_by: &'static [&'static str],
    /// Offers inline creation of a new option.
    pub creatable: bool,
}

impl FieldSpec {
    const fn base(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: true,
            submitted: true,
            source: None,
            requires: &[],
            scoped_by: &[],
            creatable: false,
        }
    }

    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self::base(name, label, FieldKind::Text)
    }

    pub const fn number(name: &'static str, label: &'static str) -> Self {
        Self::base(name, label, FieldKind::Number)
    }

    pub const fn date(name: &'static str, label: &'static str) -> Self {
        Self::base(name, label, FieldKind::Date)
    }

    pub const fn select(name: &'static str, label: &'static str, source: OptionSource) -> Self {
        Self {
            source: Some(source),
            ..Self::base(name, label, FieldKind::Select)
        }
    }

    pub const fn multi(
        name: &'static str,
        label: &'static str,
        each: &'static str,
        source: OptionSource,
    ) -> Self {
        Self {
            source: Some(source),
            ..Self::base(name, label, FieldKind::MultiSelect { each })
        }
    }

    pub const fn optional(self) -> Self {
        Self {
            required: false,
            ..self
        }
    }

    pub const fn local(self) -> Self {
        Self {
            submitted: false,
            ..self
        }
    }

    pub const fn requires(self, fields: &'static [&'static str]) -> Self {
        Self {
            requires: fields,
            ..self
        }
    }

    pub const fn scoped_by(self, fields: &'static [&'static str]) -> Self {
        Self {
            scoped_by: fields,
            ..self
        }
    }

    pub const fn creatable(self) -> Self {
        Self {
            creatable: true,
            ..self
        }
    }

    pub const fn is_multi(&self) -> bool {
        matches!(self.kind, FieldKind::MultiSelect { .. })
    }
}

const BOOK_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("title", "Title"),
    FieldSpec::text("author", "Author"),
    FieldSpec::select("genre_id", "Genre", OptionSource::Genres).creatable(),
    FieldSpec::select("library_id", "Library", OptionSource::Libraries),
    FieldSpec::text("publication_place", "Published in"),
    FieldSpec::number("publication_year", "Year"),
    FieldSpec::text("publisher", "Publisher"),
    FieldSpec::number("quantity", "Quantity"),
];

const READER_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("full_name", "Full name"),
    FieldSpec::text("phone", "Phone"),
    FieldSpec::text("address", "Address"),
];

const LIBRARY_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("name", "Name"),
    FieldSpec::text("address", "Address"),
];

const NAME_FIELDS: &[FieldSpec] = &[FieldSpec::text("name", "Name")];

const LIBRARY_SELECT: FieldSpec = FieldSpec::select("library_id", "Library", OptionSource::Libraries);
const AUTHOR_FILTER: FieldSpec = FieldSpec::select("author", "Author", OptionSource::Authors)
    .optional()
    .local();
const SCOPED_BOOK_SELECT: FieldSpec = FieldSpec::select("book_id", "Book", OptionSource::Books)
    .requires(&["library_id"])
    .scoped_by(&["library_id", "author"]);

const LOAN_FIELDS: &[FieldSpec] = &[
    LIBRARY_SELECT,
    AUTHOR_FILTER,
    SCOPED_BOOK_SELECT,
    FieldSpec::select("reader_id", "Reader", OptionSource::Readers),
    FieldSpec::date("issue_date", "Issued"),
    FieldSpec::date("due_date", "Due"),
    FieldSpec::number("deposit", "Deposit"),
];

const READER_WITH_LOAN_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("full_name", "Full name"),
    FieldSpec::text("phone", "Phone"),
    FieldSpec::text("address", "Address"),
    LIBRARY_SELECT,
    AUTHOR_FILTER,
    SCOPED_BOOK_SELECT,
    FieldSpec::date("issue_date", "Issued"),
    FieldSpec::date("due_date", "Due"),
    FieldSpec::number("deposit", "Deposit"),
];

const BOOK_TOPIC_FIELDS: &[FieldSpec] = &[
    LIBRARY_SELECT,
    AUTHOR_FILTER,
    SCOPED_BOOK_SELECT,
    FieldSpec::multi("topic_ids", "Topics", "topic_id", OptionSource::Topics),
];

const DELETE_BOOK_TOPIC_FIELDS: &[FieldSpec] = &[
    FieldSpec::select("library_id", "Library", OptionSource::LibrariesWithTopics),
    FieldSpec::select("book_id", "Book", OptionSource::BooksWithTopics)
        .requires(&["library_id"])
        .scoped_by(&["library_id"]),
    FieldSpec::multi(
        "topic_ids",
        "Topics to remove",
        "topic_id",
        OptionSource::BookTopics,
    )
    .requires(&["library_id", "book_id"])
    .scoped_by(&["library_id", "book_id"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Single(String),
    /// Chosen rows in order. Only the last row may be empty.
    Multi(Vec<Option<String>>),
}

impl FieldValue {
    fn blank(spec: &FieldSpec) -> Self {
        if spec.is_multi() {
            Self::Multi(vec![None])
        } else {
            Self::Single(String::new())
        }
    }

    pub fn is_filled(&self) -> bool {
        match self {
            Self::Single(value) => !value.trim().is_empty(),
            Self::Multi(rows) => rows.iter().any(Option::is_some),
        }
    }
}

pub type FormValues = BTreeMap<&'static str, FieldValue>;

/// Free copies of the chosen book in the chosen library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unknown,
    Pending(Ticket),
    Resolved(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRow {
    pub value: Option<String>,
    pub options: Vec<SelectOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub spec: FieldSpec,
    pub enabled: bool,
    pub value: String,
    pub options: Vec<SelectOption>,
    pub rows: Vec<ResolvedRow>,
    pub can_append: bool,
    pub note: Option<String>,
}

impl ResolvedField {
    pub fn selected_label(&self) -> Option<&str> {
        self.options
            .iter()
            .find(|option| option.value == self.value)
            .map(|option| option.label.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormConfig {
    pub kind: FormKind,
    pub title: &'static str,
    pub method: WriteMethod,
    pub endpoint: Vec<String>,
    pub fields: Vec<ResolvedField>,
}

impl FormConfig {
    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|field| field.spec.name == name)
    }
}

/// Resolves the field list for one snapshot of selections and catalogs.
/// Pure: the same inputs always give the same config.
pub fn build_form_config(
    kind: FormKind,
    catalogs: &Catalogs,
    values: &FormValues,
    availability: Availability,
) -> FormConfig {
    let mut enabled_by_name: BTreeMap<&str, bool> = BTreeMap::new();
    let mut fields = Vec::with_capacity(kind.fields().len());

    for spec in kind.fields() {
        let prerequisites_met = spec.requires.iter().all(|name| {
            enabled_by_name.get(name).copied().unwrap_or(false)
                && values.get(name).is_some_and(FieldValue::is_filled)
        });
        let failed = spec
            .source
            .into_iter()
            .flat_map(|source| source.catalogs().iter())
            .find_map(|catalog| {
                catalogs
                    .get(*catalog)
                    .failure()
                    .map(|message| format!("{} unavailable: {message}", catalog.label()))
            });
        let loaded = spec.source.is_none_or(|source| {
            source
                .catalogs()
                .iter()
                .all(|catalog| catalogs.is_loaded(*catalog))
        });
        let enabled = prerequisites_met && loaded && failed.is_none();
        enabled_by_name.insert(spec.name, enabled);

        let options = match spec.source {
            Some(source) if enabled => options_for(source, catalogs, values),
            _ => Vec::new(),
        };
        let (value, rows, can_append) = match values.get(spec.name) {
            Some(FieldValue::Multi(chosen)) => {
                let rows = chosen
                    .iter()
                    .enumerate()
                    .map(|(index, value)| ResolvedRow {
                        value: value.clone(),
                        options: row_options(&options, chosen, index),
                    })
                    .collect();
                let can_append = enabled && chosen.last().is_some_and(Option::is_some);
                (String::new(), rows, can_append)
            }
            Some(FieldValue::Single(value)) => (value.clone(), Vec::new(), false),
            None => (String::new(), Vec::new(), false),
        };

        let note = if let Some(message) = failed {
            Some(message)
        } else if !prerequisites_met {
            let waiting: Vec<&str> = spec
                .requires
                .iter()
                .filter_map(|name| kind.field(name).map(|field| field.label))
                .collect();
            Some(format!("choose {} first", waiting.join(" and ")))
        } else if !loaded {
            Some("loading…".to_owned())
        } else if spec.name == "book_id" && kind.checks_availability() {
            availability_note(availability)
        } else {
            None
        };

        fields.push(ResolvedField {
            spec: *spec,
            enabled,
            value,
            options,
            rows,
            can_append,
            note,
        });
    }

    FormConfig {
        kind,
        title: kind.title(),
        method: kind.method(),
        endpoint: kind.endpoint(),
        fields,
    }
}

fn availability_note(availability: Availability) -> Option<String> {
    match availability {
        Availability::Unknown => None,
        Availability::Pending(_) => Some("checking availability…".to_owned()),
        Availability::Resolved(count) => Some(format!("available copies: {count}")),
    }
}

fn single<'a>(values: &'a FormValues, name: &str) -> &'a str {
    match values.get(name) {
        Some(FieldValue::Single(value)) => value.trim(),
        _ => "",
    }
}

fn options_for(source: OptionSource, catalogs: &Catalogs, values: &FormValues) -> Vec<SelectOption> {
    let projection = source.projection();
    let library = single(values, "library_id");
    let author = single(values, "author");
    let project_all = |records: &[Record]| -> Vec<SelectOption> {
        records
            .iter()
            .filter_map(|record| projection.project(record))
            .collect()
    };

    match source {
        OptionSource::Libraries
        | OptionSource::Readers
        | OptionSource::Genres
        | OptionSource::Topics
        | OptionSource::BookTopics => {
            project_all(catalogs.records(source.catalogs()[0]))
        }
        OptionSource::LibrariesWithTopics => {
            let with_topics: BTreeSet<String> = catalogs
                .records(Catalog::BooksWithTopics)
                .iter()
                .map(|book| book.text("library_id"))
                .collect();
            catalogs
                .records(Catalog::Libraries)
                .iter()
                .filter(|library| with_topics.contains(&library.text("library_id")))
                .filter_map(|library| projection.project(library))
                .collect()
        }
        OptionSource::Books | OptionSource::BooksWithTopics => catalogs
            .records(source.catalogs()[0])
            .iter()
            .filter(|book| book.text("library_id") == library)
            .filter(|book| author.is_empty() || book.text("author") == author)
            .filter_map(|book| projection.project(book))
            .collect(),
        OptionSource::Authors => author_index(catalogs.records(Catalog::Books))
            .into_iter()
            .map(|author| SelectOption {
                value: author.clone(),
                label: author,
            })
            .collect(),
    }
}

// A row never offers what another row of the same list already holds.
fn row_options(options: &[SelectOption], chosen: &[Option<String>], index: usize) -> Vec<SelectOption> {
    options
        .iter()
        .filter(|option| {
            !chosen.iter().enumerate().any(|(other, value)| {
                other != index && value.as_deref() == Some(option.value.as_str())
            })
        })
        .cloned()
        .collect()
}

fn is_calendar_date(value: &str) -> bool {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).is_ok()
}

/// One open mutation form. Created on open, discarded on close.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSession {
    kind: FormKind,
    tickets: TicketSeq,
    catalogs: Catalogs,
    values: FormValues,
    availability: Availability,
    genre_draft: Option<String>,
    pub error: Option<String>,
}

impl FormSession {
    /// Opens a blank form and returns the catalog fetches it needs.
    pub fn open(kind: FormKind, session: u32) -> (Self, Vec<LookupRequest>) {
        let mut form = Self {
            kind,
            tickets: TicketSeq::new(session),
            catalogs: Catalogs::default(),
            values: kind
                .fields()
                .iter()
                .map(|spec| (spec.name, FieldValue::blank(spec)))
                .collect(),
            availability: Availability::Unknown,
            genre_draft: None,
            error: None,
        };

        let mut wanted: Vec<Catalog> = Vec::new();
        for source in kind.fields().iter().filter_map(|spec| spec.source) {
            for catalog in source.catalogs() {
                if catalog.fixed_lookup().is_some() && !wanted.contains(catalog) {
                    wanted.push(*catalog);
                }
            }
        }
        let requests = wanted
            .into_iter()
            .filter_map(|catalog| {
                let lookup = catalog.fixed_lookup()?;
                Some(form.catalogs.request(catalog, lookup, &mut form.tickets))
            })
            .collect();
        (form, requests)
    }

    pub const fn kind(&self) -> FormKind {
        self.kind
    }

    pub const fn session(&self) -> u32 {
        self.tickets.session()
    }

    pub const fn availability(&self) -> Availability {
        self.availability
    }

    pub fn catalogs(&self) -> &Catalogs {
        &self.catalogs
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn value(&self, name: &str) -> &str {
        single(&self.values, name)
    }

    pub fn rows(&self, name: &str) -> &[Option<String>] {
        match self.values.get(name) {
            Some(FieldValue::Multi(rows)) => rows,
            _ => &[],
        }
    }

    pub fn config(&self) -> FormConfig {
        build_form_config(self.kind, &self.catalogs, &self.values, self.availability)
    }

    pub fn authors(&self) -> Vec<String> {
        author_index(self.catalogs.records(Catalog::Books))
    }

    fn resolved(&self, name: &str) -> Result<ResolvedField, FormInputError> {
        self.config()
            .fields
            .into_iter()
            .find(|field| field.spec.name == name)
            .ok_or_else(|| FormInputError::UnknownField(name.to_owned()))
    }

    /// Sets a single-valued field, clears its dependents and returns any
    /// lookups the new selection triggers.
    pub fn set_value(
        &mut self,
        name: &str,
        value: &str,
    ) -> Result<Vec<LookupRequest>, FormInputError> {
        let field = self.resolved(name)?;
        let spec = field.spec;
        if spec.is_multi() {
            return Err(FormInputError::MultiValued(spec.label.to_owned()));
        }
        if !field.enabled {
            return Err(FormInputError::Disabled(spec.label.to_owned()));
        }
        if spec.kind == FieldKind::Select
            && !value.is_empty()
            && !field.options.iter().any(|option| option.value == value)
        {
            return Err(FormInputError::NotAnOption {
                field: spec.label.to_owned(),
                value: value.to_owned(),
            });
        }
        if self.value(spec.name) == value && spec.kind == FieldKind::Select {
            return Ok(Vec::new());
        }

        self.values
            .insert(spec.name, FieldValue::Single(value.to_owned()));
        if spec.kind != FieldKind::Select {
            return Ok(Vec::new());
        }
        let changed = self.clear_dependents(spec.name);
        Ok(self.follow_up_lookups(&changed))
    }

    /// Resets every field scoped by a changed field, top-down, and returns
    /// the full set of changed names.
    fn clear_dependents(&mut self, name: &'static str) -> BTreeSet<&'static str> {
        let mut changed = BTreeSet::from([name]);
        for spec in self.kind.fields() {
            if spec.scoped_by.iter().any(|scope| changed.contains(scope)) {
                self.values.insert(spec.name, FieldValue::blank(spec));
                changed.insert(spec.name);
            }
        }
        if changed.contains("book_id") {
            self.availability = Availability::Unknown;
            self.catalogs.reset(Catalog::BookTopics);
        }
        changed
    }

    fn follow_up_lookups(&mut self, changed: &BTreeSet<&'static str>) -> Vec<LookupRequest> {
        let mut requests = Vec::new();
        if !changed.contains("book_id") {
            return requests;
        }
        let library_id = LibraryId::parse(self.value("library_id"));
        let book_id = BookId::parse(self.value("book_id"));
        let (Some(library_id), Some(book_id)) = (library_id, book_id) else {
            return requests;
        };

        if self.kind.checks_availability() {
            let ticket = self.tickets.issue();
            self.availability = Availability::Pending(ticket);
            requests.push(LookupRequest {
                ticket,
                kind: LookupKind::AvailableBooks,
            });
        }
        if self
            .kind
            .fields()
            .iter()
            .any(|spec| spec.source == Some(OptionSource::BookTopics))
        {
            requests.push(self.catalogs.request(
                Catalog::BookTopics,
                LookupKind::BookTopics {
                    library_id,
                    book_id,
                },
                &mut self.tickets,
            ));
        }
        requests
    }

    fn multi_rows(&self, name: &str) -> Result<(FieldSpec, Vec<Option<String>>), FormInputError> {
        let field = self.resolved(name)?;
        if !field.spec.is_multi() {
            return Err(FormInputError::NotMultiValued(field.spec.label.to_owned()));
        }
        if !field.enabled {
            return Err(FormInputError::Disabled(field.spec.label.to_owned()));
        }
        Ok((field.spec, self.rows(name).to_vec()))
    }

    /// Chooses a value in one row of an incremental list. Values chosen in
    /// other rows are refused.
    pub fn set_row(&mut self, name: &str, index: usize, value: &str) -> Result<(), FormInputError> {
        let (spec, mut rows) = self.multi_rows(name)?;
        if index >= rows.len() {
            return Err(FormInputError::RowOutOfRange {
                field: spec.label.to_owned(),
                index,
            });
        }
        let config = self.config();
        let row = config
            .field(spec.name)
            .and_then(|field| field.rows.get(index))
            .ok_or_else(|| FormInputError::RowOutOfRange {
                field: spec.label.to_owned(),
                index,
            })?;
        if !row.options.iter().any(|option| option.value == value) {
            let duplicate = rows
                .iter()
                .any(|chosen| chosen.as_deref() == Some(value));
            return Err(if duplicate {
                FormInputError::DuplicateChoice {
                    field: spec.label.to_owned(),
                    value: value.to_owned(),
                }
            } else {
                FormInputError::NotAnOption {
                    field: spec.label.to_owned(),
                    value: value.to_owned(),
                }
            });
        }
        rows[index] = Some(value.to_owned());
        self.values.insert(spec.name, FieldValue::Multi(rows));
        Ok(())
    }

    /// Adds a trailing empty row once the current last row holds a value.
    pub fn append_row(&mut self, name: &str) -> Result<usize, FormInputError> {
        let (spec, mut rows) = self.multi_rows(name)?;
        if rows.last().is_some_and(Option::is_none) {
            return Err(FormInputError::TrailingRowEmpty(spec.label.to_owned()));
        }
        rows.push(None);
        let index = rows.len() - 1;
        self.values.insert(spec.name, FieldValue::Multi(rows));
        Ok(index)
    }

    /// Drops a row. The list always keeps at least one row.
    pub fn remove_row(&mut self, name: &str, index: usize) -> Result<(), FormInputError> {
        let (spec, mut rows) = self.multi_rows(name)?;
        if index >= rows.len() {
            return Err(FormInputError::RowOutOfRange {
                field: spec.label.to_owned(),
                index,
            });
        }
        rows.remove(index);
        if rows.is_empty() {
            rows.push(None);
        }
        self.values.insert(spec.name, FieldValue::Multi(rows));
        Ok(())
    }

    pub fn awaits(&self, ticket: Ticket) -> bool {
        self.catalogs.awaits(ticket) || self.availability == Availability::Pending(ticket)
    }

    /// Applies a lookup response. Returns false and changes nothing when
    /// the ticket is no longer pending.
    pub fn apply_lookup(&mut self, ticket: Ticket, result: LookupResult) -> bool {
        if self.catalogs.settle(ticket, result.clone()).is_some() {
            return true;
        }
        if self.availability != Availability::Pending(ticket) {
            log::debug!("discarding stale lookup {ticket} for {} form", self.kind.as_str());
            return false;
        }
        let count = match result {
            Ok(records) => self.match_availability(&records),
            Err(message) => {
                log::warn!("availability lookup failed, treating as zero: {message}");
                0
            }
        };
        self.availability = Availability::Resolved(count);
        true
    }

    // Matches by title and library name, the way the availability view is
    // keyed.
    fn match_availability(&self, available: &[Record]) -> i64 {
        let library_id = self.value("library_id");
        let book_id = self.value("book_id");
        let title = self
            .catalogs
            .records(Catalog::Books)
            .iter()
            .find(|book| book.text("library_id") == library_id && book.text("book_id") == book_id)
            .map(|book| book.text("title"));
        let library_name = self
            .catalogs
            .records(Catalog::Libraries)
            .iter()
            .find(|library| library.text("library_id") == library_id)
            .map(|library| library.text("name"));
        let (Some(title), Some(library_name)) = (title, library_name) else {
            return 0;
        };
        available
            .iter()
            .find(|row| row.text("book_title") == title && row.text("library_name") == library_name)
            .and_then(|row| parse_number(&row.text("available_quantity")))
            .map(|count| count as i64)
            .unwrap_or(0)
    }

    /// Validation gate plus serialization. Returns the writes to issue in
    /// order; nothing here touches the network.
    pub fn submission(&self) -> Result<Vec<WriteRequest>, SubmitError> {
        let config = self.config();

        for field in config.fields.iter().filter(|field| field.spec.required) {
            for catalog in field
                .spec
                .source
                .into_iter()
                .flat_map(|source| source.catalogs().iter())
            {
                if let Some(message) = self.catalogs.get(*catalog).failure() {
                    return Err(SubmitError::Incomplete(format!(
                        "{} ({message})",
                        catalog.label()
                    )));
                }
            }
        }

        let mut problems = LocalValidationError::default();
        for field in &config.fields {
            let Some(value) = self.values.get(field.spec.name) else {
                continue;
            };
            if !value.is_filled() {
                if field.spec.required {
                    problems.missing.push(field.spec.label.to_owned());
                }
                continue;
            }
            let text = self.value(field.spec.name);
            let valid = match field.spec.kind {
                FieldKind::Number => parse_number(text).is_some_and(|number| number >= 0.0),
                FieldKind::Date => is_calendar_date(text),
                _ => true,
            };
            if !valid {
                problems.invalid.push(field.spec.label.to_owned());
            }
        }
        if !problems.is_empty() {
            return Err(problems.into());
        }

        if self.kind.checks_availability() {
            match self.availability {
                Availability::Resolved(count) if count > 0 => {}
                Availability::Resolved(_) => return Err(SubmitError::NoAvailableCopies),
                Availability::Pending(_) | Availability::Unknown => {
                    return Err(SubmitError::AvailabilityPending);
                }
            }
        }

        let mut body = Map::new();
        let mut expansion: Option<(&'static str, Vec<String>)> = None;
        for spec in self.kind.fields().iter().filter(|spec| spec.submitted) {
            match (spec.kind, self.values.get(spec.name)) {
                (FieldKind::MultiSelect { each }, Some(FieldValue::Multi(rows))) => {
                    expansion = Some((each, rows.iter().flatten().cloned().collect()));
                }
                (kind, Some(FieldValue::Single(value))) if !value.trim().is_empty() => {
                    body.insert(spec.name.to_owned(), wire_value(kind, value.trim()));
                }
                _ => {}
            }
        }

        let method = self.kind.method();
        let path = self.kind.endpoint();
        let writes = match expansion {
            None => vec![WriteRequest {
                method,
                path,
                body: Some(Value::Object(body)),
            }],
            Some((each, chosen)) => chosen
                .into_iter()
                .map(|value| {
                    let mut body = body.clone();
                    body.insert(each.to_owned(), wire_value(FieldKind::Select, &value));
                    WriteRequest {
                        method,
                        path: path.clone(),
                        body: Some(Value::Object(body)),
                    }
                })
                .collect(),
        };
        Ok(writes)
    }

    /// Forgets the first `applied` chosen values of the expanded list after a
    /// batch stopped part way, so a resubmit sends only the rest. Topics
    /// sourced from the book are refetched since the server side changed.
    pub fn drop_applied(&mut self, applied: usize) -> Vec<LookupRequest> {
        let Some(spec) = self
            .kind
            .fields()
            .iter()
            .find(|spec| spec.submitted && spec.is_multi())
        else {
            return Vec::new();
        };
        let mut remaining: Vec<Option<String>> = self
            .rows(spec.name)
            .iter()
            .flatten()
            .skip(applied)
            .cloned()
            .map(Some)
            .collect();
        if remaining.is_empty() {
            remaining.push(None);
        }
        log::debug!(
            "{} form keeps {} unsent value(s) after {applied} applied",
            self.kind.as_str(),
            remaining.iter().flatten().count()
        );
        self.values.insert(spec.name, FieldValue::Multi(remaining));

        if spec.source != Some(OptionSource::BookTopics) {
            return Vec::new();
        }
        let library_id = LibraryId::parse(self.value("library_id"));
        let book_id = BookId::parse(self.value("book_id"));
        let (Some(library_id), Some(book_id)) = (library_id, book_id) else {
            return Vec::new();
        };
        vec![self.catalogs.request(
            Catalog::BookTopics,
            LookupKind::BookTopics {
                library_id,
                book_id,
            },
            &mut self.tickets,
        )]
    }

    pub fn can_create_option(&self) -> bool {
        self.kind.fields().iter().any(|spec| spec.creatable)
    }

    pub fn genre_draft(&self) -> Option<&str> {
        self.genre_draft.as_deref()
    }

    /// Opens the inline genre side-flow. The form underneath stays intact.
    pub fn begin_genre_draft(&mut self) -> bool {
        if !self.can_create_option() {
            return false;
        }
        self.genre_draft.get_or_insert_with(String::new);
        true
    }

    pub fn set_genre_draft(&mut self, name: &str) {
        if let Some(draft) = self.genre_draft.as_mut() {
            name.clone_into(draft);
        }
    }

    pub fn cancel_genre_draft(&mut self) {
        self.genre_draft = None;
    }

    pub fn genre_request(&self) -> Result<WriteRequest, LocalValidationError> {
        let name = self.genre_draft.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(LocalValidationError {
                missing: vec!["Genre name".to_owned()],
                invalid: Vec::new(),
            });
        }
        let mut body = Map::new();
        body.insert("name".to_owned(), Value::String(name.to_owned()));
        Ok(WriteRequest::new(
            WriteMethod::Post,
            &["add", "genre"],
            Some(Value::Object(body)),
        ))
    }

    /// The new genre exists server-side: close the side-flow and refetch
    /// genres. The genre field keeps its current value.
    pub fn genre_created(&mut self) -> Vec<LookupRequest> {
        self.genre_draft = None;
        vec![
            self.catalogs
                .request(Catalog::Genres, LookupKind::Genres, &mut self.tickets),
        ]
    }
}

fn wire_value(kind: FieldKind, value: &str) -> Value {
    match kind {
        FieldKind::Select | FieldKind::MultiSelect { .. } | FieldKind::Number => {
            if let Ok(integer) = value.parse::<i64>() {
                return Value::from(integer);
            }
            match parse_number(value).and_then(serde_json::Number::from_f64) {
                Some(number) if kind == FieldKind::Number => Value::Number(number),
                _ => Value::String(value.to_owned()),
            }
        }
        FieldKind::Text | FieldKind::Date => Value::String(value.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        Availability, FieldKind, FormKind, FormSession, LookupRequest, build_form_config,
        wire_value,
    };
    use crate::catalog::{Catalog, Catalogs};
    use crate::error::{FormInputError, SubmitError};
    use crate::request::{Lookup, WriteMethod};
    use crate::{LookupKind, Record};

    fn libraries() -> Vec<Record> {
        vec![
            Record::new().with("library_id", 1).with("name", "Central"),
            Record::new().with("library_id", 2).with("name", "North"),
        ]
    }

    fn books() -> Vec<Record> {
        vec![
            Record::new()
                .with("library_id", 1)
                .with("book_id", 5)
                .with("title", "Война и мир")
                .with("author", "Толстой"),
            Record::new()
                .with("library_id", 1)
                .with("book_id", 6)
                .with("title", "Отцы и дети")
                .with("author", "Тургенев"),
            Record::new()
                .with("library_id", 2)
                .with("book_id", 1)
                .with("title", "Анна Каренина")
                .with("author", "Толстой"),
        ]
    }

    fn readers() -> Vec<Record> {
        vec![Record::new().with("reader_id", 3).with("full_name", "Иванов И.И.")]
    }

    fn topics() -> Vec<Record> {
        vec![
            Record::new().with("topic_id", 1).with("name", "History"),
            Record::new().with("topic_id", 2).with("name", "War"),
            Record::new().with("topic_id", 3).with("name", "Family"),
        ]
    }

    fn respond(form: &mut FormSession, requests: &[LookupRequest]) {
        for request in requests {
            let records = match request.kind {
                LookupKind::Libraries => libraries(),
                LookupKind::Books => books(),
                LookupKind::Readers => readers(),
                LookupKind::Topics => topics(),
                LookupKind::Genres => vec![Record::new().with("genre_id", 1).with("name", "Novel")],
                LookupKind::BooksWithTopics => vec![books()[0].clone()],
                LookupKind::BookTopics { .. } => vec![topics()[0].clone(), topics()[1].clone()],
                LookupKind::AvailableBooks => vec![
                    Record::new()
                        .with("book_title", "Война и мир")
                        .with("library_name", "Central")
                        .with("available_quantity", 2),
                ],
            };
            assert!(form.apply_lookup(request.ticket, Ok(records)));
        }
    }

    fn loaded(kind: FormKind) -> FormSession {
        let (mut form, requests) = FormSession::open(kind, 1);
        respond(&mut form, &requests);
        form
    }

    fn fill_loan(form: &mut FormSession) {
        let requests = form.set_value("library_id", "1").expect("library");
        assert!(requests.is_empty());
        let requests = form.set_value("book_id", "5").expect("book");
        respond(form, &requests);
        form.set_value("reader_id", "3").expect("reader");
        form.set_value("issue_date", "2024-01-10").expect("issued");
        form.set_value("due_date", "2024-02-10").expect("due");
        form.set_value("deposit", "150").expect("deposit");
    }

    #[test]
    fn opening_requests_every_fixed_catalog_once() {
        let (_, requests) = FormSession::open(FormKind::Loan, 7);
        let kinds: Vec<LookupKind> = requests.iter().map(|request| request.kind).collect();
        assert_eq!(
            kinds,
            vec![LookupKind::Libraries, LookupKind::Books, LookupKind::Readers]
        );
        assert!(requests.iter().all(|request| request.ticket.session == 7));
    }

    #[test]
    fn required_fields_block_submission_locally() {
        let form = loaded(FormKind::Reader);
        let Err(SubmitError::Validation(error)) = form.submission() else {
            panic!("empty reader form must be rejected");
        };
        assert_eq!(error.missing, vec!["Full name", "Phone", "Address"]);
    }

    #[test]
    fn optional_fields_do_not_block() {
        let mut form = loaded(FormKind::Loan);
        fill_loan(&mut form);
        assert_eq!(form.value("author"), "");
        let writes = form.submission().expect("loan should submit");
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].method, WriteMethod::Post);
        assert_eq!(writes[0].path, vec!["add", "loan"]);
        assert_eq!(
            writes[0].body,
            Some(json!({
                "library_id": 1,
                "book_id": 5,
                "reader_id": 3,
                "issue_date": "2024-01-10",
                "due_date": "2024-02-10",
                "deposit": 150,
            }))
        );
    }

    #[test]
    fn book_is_disabled_until_library_is_chosen() {
        let mut form = loaded(FormKind::Loan);
        let config = form.config();
        let book = config.field("book_id").expect("book field");
        assert!(!book.enabled);
        assert!(book.options.is_empty());
        assert_eq!(book.note.as_deref(), Some("choose Library first"));
        assert_eq!(
            form.set_value("book_id", "5"),
            Err(FormInputError::Disabled("Book".to_owned()))
        );

        form.set_value("library_id", "2").expect("library");
        let config = form.config();
        let options: Vec<&str> = config
            .field("book_id")
            .expect("book field")
            .options
            .iter()
            .map(|option| option.label.as_str())
            .collect();
        assert_eq!(options, vec!["Анна Каренина"]);
    }

    #[test]
    fn library_change_clears_book_and_availability() {
        let mut form = loaded(FormKind::Loan);
        fill_loan(&mut form);
        assert_eq!(form.availability(), Availability::Resolved(2));

        form.set_value("library_id", "2").expect("library");
        assert_eq!(form.value("book_id"), "");
        assert_eq!(form.availability(), Availability::Unknown);
        assert!(matches!(
            form.submission(),
            Err(SubmitError::Validation(error)) if error.missing == vec!["Book".to_owned()]
        ));
    }

    #[test]
    fn author_filter_narrows_books_and_clears_selection() {
        let mut form = loaded(FormKind::Loan);
        form.set_value("library_id", "1").expect("library");
        form.set_value("book_id", "6").expect("book");
        form.set_value("author", "Толстой").expect("author");
        assert_eq!(form.value("book_id"), "");

        let config = form.config();
        let labels: Vec<&str> = config
            .field("book_id")
            .expect("book field")
            .options
            .iter()
            .map(|option| option.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Война и мир"]);
        assert_eq!(
            config.field("author").expect("author").options.len(),
            2
        );
    }

    #[test]
    fn unmatched_availability_counts_as_zero_and_blocks() {
        let mut form = loaded(FormKind::Loan);
        form.set_value("library_id", "1").expect("library");
        let requests = form.set_value("book_id", "6").expect("book");
        respond(&mut form, &requests);
        assert_eq!(form.availability(), Availability::Resolved(0));

        form.set_value("reader_id", "3").expect("reader");
        form.set_value("issue_date", "2024-01-10").expect("issued");
        form.set_value("due_date", "2024-02-10").expect("due");
        form.set_value("deposit", "0").expect("deposit");
        assert_eq!(form.submission(), Err(SubmitError::NoAvailableCopies));
    }

    #[test]
    fn failed_availability_lookup_counts_as_zero() {
        let mut form = loaded(FormKind::ReaderWithLoan);
        form.set_value("library_id", "1").expect("library");
        let requests = form.set_value("book_id", "5").expect("book");
        assert!(matches!(form.availability(), Availability::Pending(_)));
        assert!(form.apply_lookup(requests[0].ticket, Err("timeout".to_owned())));
        assert_eq!(form.availability(), Availability::Resolved(0));
    }

    #[test]
    fn stale_availability_response_is_discarded() {
        let mut form = loaded(FormKind::Loan);
        form.set_value("library_id", "1").expect("library");
        let first = form.set_value("book_id", "6").expect("first book");
        let second = form.set_value("book_id", "5").expect("second book");

        let stale = vec![Record::new()
            .with("book_title", "Отцы и дети")
            .with("library_name", "Central")
            .with("available_quantity", 9)];
        assert!(!form.apply_lookup(first[0].ticket, Ok(stale)));
        assert!(matches!(form.availability(), Availability::Pending(_)));

        respond(&mut form, &second);
        assert_eq!(form.availability(), Availability::Resolved(2));
    }

    #[test]
    fn failed_catalog_disables_dependent_fields() {
        let (mut form, requests) = FormSession::open(FormKind::Loan, 1);
        for request in &requests {
            let result = match request.kind {
                LookupKind::Libraries => Err("libraries down".to_owned()),
                LookupKind::Books => Ok(books()),
                _ => Ok(readers()),
            };
            form.apply_lookup(request.ticket, result);
        }
        let config = form.config();
        let library = config.field("library_id").expect("library");
        assert!(!library.enabled);
        assert_eq!(
            library.note.as_deref(),
            Some("libraries unavailable: libraries down")
        );
        assert!(!config.field("book_id").expect("book").enabled);
        assert!(config.field("reader_id").expect("reader").enabled);
        assert!(matches!(form.submission(), Err(SubmitError::Incomplete(_))));
    }

    #[test]
    fn select_refuses_values_outside_its_options() {
        let mut form = loaded(FormKind::Loan);
        assert!(matches!(
            form.set_value("library_id", "99"),
            Err(FormInputError::NotAnOption { .. })
        ));
    }

    #[test]
    fn incremental_rows_exclude_chosen_values_and_gate_append() {
        let mut form = loaded(FormKind::BookTopic);
        form.set_value("library_id", "1").expect("library");
        form.set_value("book_id", "5").expect("book");

        assert!(matches!(
            form.append_row("topic_ids"),
            Err(FormInputError::TrailingRowEmpty(_))
        ));
        form.set_row("topic_ids", 0, "1").expect("first topic");
        assert_eq!(form.append_row("topic_ids"), Ok(1));
        assert_eq!(form.rows("topic_ids"), &[Some("1".to_owned()), None]);

        let config = form.config();
        let field = config.field("topic_ids").expect("topics");
        let second_row: Vec<&str> = field.rows[1]
            .options
            .iter()
            .map(|option| option.value.as_str())
            .collect();
        assert_eq!(second_row, vec!["2", "3"]);
        assert!(!field.can_append);

        assert!(matches!(
            form.set_row("topic_ids", 1, "1"),
            Err(FormInputError::DuplicateChoice { .. })
        ));
        form.set_row("topic_ids", 1, "3").expect("second topic");

        let writes = form.submission().expect("assignment should submit");
        let bodies: Vec<_> = writes.iter().filter_map(|write| write.body.clone()).collect();
        assert_eq!(
            bodies,
            vec![
                json!({"library_id": 1, "book_id": 5, "topic_id": 1}),
                json!({"library_id": 1, "book_id": 5, "topic_id": 3}),
            ]
        );
    }

    #[test]
    fn removing_the_only_row_leaves_an_empty_row() {
        let mut form = loaded(FormKind::BookTopic);
        form.set_row("topic_ids", 0, "2").expect("topic");
        form.remove_row("topic_ids", 0).expect("remove");
        assert_eq!(form.rows("topic_ids"), &[None]);
    }

    #[test]
    fn applied_topics_leave_the_form_after_a_partial_batch() {
        let mut form = loaded(FormKind::DeleteBookTopic);
        form.set_value("library_id", "1").expect("library");
        let requests = form.set_value("book_id", "5").expect("book");
        respond(&mut form, &requests);
        form.set_row("topic_ids", 0, "1").expect("first topic");
        form.append_row("topic_ids").expect("second row");
        form.set_row("topic_ids", 1, "2").expect("second topic");
        assert_eq!(form.submission().expect("removal").len(), 2);

        let requests = form.drop_applied(1);
        assert_eq!(form.rows("topic_ids"), &[Some("2".to_owned())]);
        assert_eq!(
            requests.iter().map(|request| request.kind).collect::<Vec<_>>(),
            vec![LookupKind::BookTopics {
                library_id: crate::LibraryId::new(1),
                book_id: crate::BookId::new(5),
            }]
        );
        respond(&mut form, &requests);

        let writes = form.submission().expect("resubmit");
        let bodies: Vec<_> = writes.iter().filter_map(|write| write.body.clone()).collect();
        assert_eq!(bodies, vec![json!({"library_id": 1, "book_id": 5, "topic_id": 2})]);

        assert!(form.drop_applied(1).len() == 1);
        assert_eq!(form.rows("topic_ids"), &[None]);
    }

    #[test]
    fn dropping_applied_values_is_a_no_op_without_a_list() {
        let mut form = loaded(FormKind::Reader);
        assert!(form.drop_applied(1).is_empty());
    }

    #[test]
    fn topic_removal_sources_topics_from_the_selected_book() {
        let mut form = loaded(FormKind::DeleteBookTopic);
        let config = form.config();
        let libraries: Vec<&str> = config
            .field("library_id")
            .expect("library")
            .options
            .iter()
            .map(|option| option.label.as_str())
            .collect();
        assert_eq!(libraries, vec!["Central"]);
        assert!(!config.field("topic_ids").expect("topics").enabled);

        form.set_value("library_id", "1").expect("library");
        let requests = form.set_value("book_id", "5").expect("book");
        assert_eq!(
            requests.iter().map(|request| request.kind).collect::<Vec<_>>(),
            vec![LookupKind::BookTopics {
                library_id: crate::LibraryId::new(1),
                book_id: crate::BookId::new(5),
            }]
        );
        respond(&mut form, &requests);

        let config = form.config();
        let topics = config.field("topic_ids").expect("topics");
        assert!(topics.enabled);
        assert_eq!(topics.rows[0].options.len(), 2);

        form.set_row("topic_ids", 0, "2").expect("topic");
        let writes = form.submission().expect("removal should submit");
        assert_eq!(writes[0].method, WriteMethod::Delete);
        assert_eq!(writes[0].path, vec!["delete", "book-topic"]);

        form.set_value("library_id", "").expect("clear library");
        assert_eq!(form.rows("topic_ids"), &[None]);
        assert_eq!(form.catalogs().get(Catalog::BookTopics), &Lookup::Idle);
    }

    #[test]
    fn number_fields_must_be_non_negative() {
        let mut form = loaded(FormKind::Book);
        for (name, value) in [
            ("title", "Дар"),
            ("author", "Набоков"),
            ("publication_place", "Berlin"),
            ("publication_year", "1938"),
            ("publisher", "Sovremennye zapiski"),
            ("quantity", "-2"),
        ] {
            form.set_value(name, value).expect("text field");
        }
        form.set_value("genre_id", "1").expect("genre");
        form.set_value("library_id", "1").expect("library");
        let Err(SubmitError::Validation(error)) = form.submission() else {
            panic!("negative quantity must be rejected");
        };
        assert!(error.missing.is_empty());
        assert_eq!(error.invalid, vec!["Quantity"]);
    }

    #[test]
    fn inline_genre_creation_refetches_without_selecting() {
        let mut form = loaded(FormKind::Book);
        assert!(form.begin_genre_draft());
        assert!(form.genre_request().is_err());

        form.set_genre_draft("  Поэзия ");
        let request = form.genre_request().expect("genre request");
        assert_eq!(request.path, vec!["add", "genre"]);
        assert_eq!(request.body, Some(json!({"name": "Поэзия"})));

        let refetch = form.genre_created();
        assert_eq!(form.genre_draft(), None);
        assert_eq!(refetch[0].kind, LookupKind::Genres);
        respond(&mut form, &refetch);
        assert_eq!(form.value("genre_id"), "");
    }

    #[test]
    fn forms_without_creatable_fields_refuse_the_side_flow() {
        let mut form = loaded(FormKind::Reader);
        assert!(!form.begin_genre_draft());
        assert_eq!(form.genre_draft(), None);
    }

    #[test]
    fn config_is_a_pure_function_of_its_inputs() {
        let mut catalogs = Catalogs::default();
        catalogs.insert(Catalog::Libraries, Lookup::Loaded(libraries()));
        let form = loaded(FormKind::Library);
        let first = build_form_config(
            FormKind::Loan,
            &catalogs,
            form.values(),
            Availability::Unknown,
        );
        let second = build_form_config(
            FormKind::Loan,
            &catalogs,
            form.values(),
            Availability::Unknown,
        );
        assert_eq!(first, second);
        assert!(first.field("library_id").expect("library").enabled);
        assert_eq!(
            first.field("reader_id").expect("reader").note.as_deref(),
            Some("loading…")
        );
    }

    #[test]
    fn wire_values_keep_numbers_numeric() {
        assert_eq!(wire_value(FieldKind::Number, "2.5"), json!(2.5));
        assert_eq!(wire_value(FieldKind::Select, "7"), json!(7));
        assert_eq!(wire_value(FieldKind::Text, "7"), json!("7"));
        assert_eq!(
            wire_value(FieldKind::Select, "Толстой"),
            json!("Толстой")
        );
    }
}
