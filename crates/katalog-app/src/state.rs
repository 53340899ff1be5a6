// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::delete::{DeleteDraft, DeleteKind, DeleteStage};
use crate::edit::EditDraft;
use crate::forms::{FormKind, FormSession};
use crate::grid::{CandidateIndex, FilterSpec, SortSpec, visible_rows};
use crate::layout::ColumnLayout;
use crate::request::{FetchRequest, LookupRequest, LookupResult, Ticket, WriteBatch, WriteRequest};
use crate::{Dataset, DatasetKind, Record, WriteFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Nav,
    Edit,
}

impl AppMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nav => "nav",
            Self::Edit => "edit",
        }
    }
}

/// Modal surface layered over the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Form(FormKind),
    Genre,
    Editor,
    Delete(DeleteKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub mode: AppMode,
    pub active: DatasetKind,
    pub dataset: Option<Dataset>,
    pub load: LoadState,
    pub sort: SortSpec,
    pub filter: FilterSpec,
    pub candidates: CandidateIndex,
    pub layout: ColumnLayout,
    pub search: String,
    pub form: Option<FormSession>,
    pub editor: Option<EditDraft>,
    pub deletion: Option<DeleteDraft>,
    pub status_line: Option<String>,
    view: Vec<usize>,
    pending_fetch: Option<FetchRequest>,
    in_flight: Option<InFlight>,
    next_seq: u64,
    next_session: u32,
}

/// The write batch a surface is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    surface: Surface,
    seq: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DatasetKind::Books, ColumnLayout::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    NextTable,
    PrevTable,
    SelectTable(DatasetKind),
    Reload,
    DatasetLoaded {
        request: FetchRequest,
        records: Vec<Record>,
    },
    DatasetFailed {
        request: FetchRequest,
        message: String,
    },
    ActivateSort {
        column: String,
        accumulate: bool,
    },
    ClearSort,
    ToggleFilterValue {
        column: String,
        value: String,
    },
    ToggleSelectAll(String),
    ClearColumnFilter(String),
    ClearFilters,
    SetSearch(String),
    ToggleEditMode,
    OpenForm(FormKind),
    SubmitForm,
    CloseForm,
    BeginGenre,
    SubmitGenre,
    CancelGenre,
    OpenEditor {
        row: usize,
        column: String,
    },
    SubmitEdit,
    CloseEditor,
    OpenDelete(DeleteKind),
    ReviewDelete,
    ConfirmDelete,
    CloseDelete,
    LookupResolved {
        ticket: Ticket,
        result: LookupResult,
    },
    MutationSucceeded {
        seq: u64,
    },
    MutationFailed {
        seq: u64,
        failure: WriteFailure,
    },
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    TableChanged(DatasetKind),
    FetchRequested(FetchRequest),
    DatasetReplaced { kind: DatasetKind, rows: usize },
    ViewChanged,
    SurfaceOpened(Surface),
    SurfaceClosed(Surface),
    LookupsRequested(Vec<LookupRequest>),
    /// Issue in order; stop at the first failure.
    WritesRequested(WriteBatch),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn new(active: DatasetKind, layout: ColumnLayout) -> Self {
        Self {
            mode: AppMode::Nav,
            active,
            dataset: None,
            load: LoadState::Idle,
            sort: SortSpec::default(),
            filter: FilterSpec::default(),
            candidates: CandidateIndex::default(),
            layout,
            search: String::new(),
            form: None,
            editor: None,
            deletion: None,
            status_line: None,
            view: Vec::new(),
            pending_fetch: None,
            in_flight: None,
            next_seq: 1,
            next_session: 1,
        }
    }

    /// Rows to render, as indices into the active dataset. Rebuilt only
    /// when the data, sort, filters or search change.
    pub fn visible_rows(&self) -> &[usize] {
        &self.view
    }

    fn refresh_view(&mut self) {
        self.view = match &self.dataset {
            Some(dataset) => visible_rows(
                dataset,
                &self.sort,
                &self.filter,
                &self.candidates,
                &self.search,
            ),
            None => Vec::new(),
        };
    }

    /// The dataset fetch whose response will be applied, if any.
    pub fn pending_fetch(&self) -> Option<FetchRequest> {
        self.pending_fetch
    }

    /// Sequence number of the write batch awaiting its outcome.
    pub fn pending_write(&self) -> Option<u64> {
        self.in_flight.map(|in_flight| in_flight.seq)
    }

    pub fn columns(&self) -> &[String] {
        self.dataset
            .as_ref()
            .map(|dataset| dataset.columns.as_slice())
            .unwrap_or(&[])
    }

    pub fn surface(&self) -> Option<Surface> {
        if let Some(form) = &self.form {
            if form.genre_draft().is_some() {
                return Some(Surface::Genre);
            }
            return Some(Surface::Form(form.kind()));
        }
        if self.editor.is_some() {
            return Some(Surface::Editor);
        }
        self.deletion
            .as_ref()
            .map(|deletion| Surface::Delete(deletion.kind()))
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextTable => self.rotate_table(1),
            AppCommand::PrevTable => self.rotate_table(-1),
            AppCommand::SelectTable(kind) => self.select_table(kind),
            AppCommand::Reload => self.reload(),
            AppCommand::DatasetLoaded { request, records } => self.dataset_loaded(request, records),
            AppCommand::DatasetFailed { request, message } => {
                self.dataset_failed(request, &message)
            }
            AppCommand::ActivateSort { column, accumulate } => {
                if !self.columns().iter().any(|name| *name == column) {
                    return Vec::new();
                }
                if accumulate {
                    self.sort.activate_accumulating(&column);
                } else {
                    self.sort.activate(&column);
                }
                self.refresh_view();
                vec![AppEvent::ViewChanged]
            }
            AppCommand::ClearSort => {
                self.sort.clear();
                self.refresh_view();
                vec![AppEvent::ViewChanged, self.set_status("sort cleared")]
            }
            AppCommand::ToggleFilterValue { column, value } => {
                self.filter.toggle_value(&column, &value);
                self.view_changed()
            }
            AppCommand::ToggleSelectAll(column) => {
                self.filter.toggle_select_all(&column, &self.candidates);
                self.view_changed()
            }
            AppCommand::ClearColumnFilter(column) => {
                self.filter.clear_column(&column);
                self.view_changed()
            }
            AppCommand::ClearFilters => {
                self.filter.clear();
                self.refresh_view();
                vec![AppEvent::ViewChanged, self.set_status("filters cleared")]
            }
            AppCommand::SetSearch(query) => {
                self.search = query;
                self.view_changed()
            }
            AppCommand::ToggleEditMode => {
                self.mode = match self.mode {
                    AppMode::Nav => AppMode::Edit,
                    AppMode::Edit => AppMode::Nav,
                };
                let label = self.mode.as_str();
                vec![AppEvent::ModeChanged(self.mode), self.set_status(label)]
            }
            AppCommand::OpenForm(kind) => self.open_form(kind),
            AppCommand::SubmitForm => self.submit_form(),
            AppCommand::CloseForm => self.close_form(),
            AppCommand::BeginGenre => {
                let Some(form) = self.form.as_mut() else {
                    return Vec::new();
                };
                if form.begin_genre_draft() {
                    vec![AppEvent::SurfaceOpened(Surface::Genre)]
                } else {
                    Vec::new()
                }
            }
            AppCommand::SubmitGenre => self.submit_genre(),
            AppCommand::CancelGenre => {
                let Some(form) = self.form.as_mut() else {
                    return Vec::new();
                };
                form.cancel_genre_draft();
                vec![AppEvent::SurfaceClosed(Surface::Genre)]
            }
            AppCommand::OpenEditor { row, column } => self.open_editor(row, &column),
            AppCommand::SubmitEdit => self.submit_edit(),
            AppCommand::CloseEditor => {
                if self.editor.take().is_none() {
                    return Vec::new();
                }
                self.in_flight = None;
                vec![AppEvent::SurfaceClosed(Surface::Editor)]
            }
            AppCommand::OpenDelete(kind) => self.open_delete(kind),
            AppCommand::ReviewDelete => self.review_delete(),
            AppCommand::ConfirmDelete => self.confirm_delete(),
            AppCommand::CloseDelete => {
                let Some(deletion) = self.deletion.take() else {
                    return Vec::new();
                };
                self.in_flight = None;
                vec![AppEvent::SurfaceClosed(Surface::Delete(deletion.kind()))]
            }
            AppCommand::LookupResolved { ticket, result } => self.lookup_resolved(ticket, result),
            AppCommand::MutationSucceeded { seq } => self.mutation_succeeded(seq),
            AppCommand::MutationFailed { seq, failure } => self.mutation_failed(seq, &failure),
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn rotate_table(&mut self, delta: isize) -> Vec<AppEvent> {
        let tables = DatasetKind::ALL;
        let current = tables
            .iter()
            .position(|table| *table == self.active)
            .unwrap_or(0) as isize;
        let len = tables.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.select_table(tables[next])
    }

    // Sort, filters and widths belong to one dataset. Search text stays.
    fn select_table(&mut self, kind: DatasetKind) -> Vec<AppEvent> {
        if kind == self.active && self.dataset.is_some() {
            return Vec::new();
        }
        self.layout.reset();
        self.sort.clear();
        self.filter.clear();
        self.candidates = CandidateIndex::default();
        self.dataset = None;
        self.view.clear();
        self.active = kind;
        let mut events = Vec::new();
        if self.editor.take().is_some() {
            events.push(AppEvent::SurfaceClosed(Surface::Editor));
        }
        events.push(AppEvent::TableChanged(kind));
        events.extend(self.reload());
        events
    }

    fn issue_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    // A newer request supersedes any fetch still in flight.
    fn reload(&mut self) -> Vec<AppEvent> {
        let request = FetchRequest {
            kind: self.active,
            seq: self.issue_seq(),
        };
        self.pending_fetch = Some(request);
        self.load = LoadState::Loading;
        log::debug!("fetch {} requested as #{}", self.active.as_str(), request.seq);
        vec![AppEvent::FetchRequested(request)]
    }

    fn settle_fetch(&mut self, request: FetchRequest) -> bool {
        if self.pending_fetch != Some(request) {
            log::debug!(
                "discarding response #{} for {}; active table is {}",
                request.seq,
                request.kind.as_str(),
                self.active.as_str()
            );
            return false;
        }
        self.pending_fetch = None;
        true
    }

    fn dataset_loaded(&mut self, request: FetchRequest, records: Vec<Record>) -> Vec<AppEvent> {
        if !self.settle_fetch(request) {
            return Vec::new();
        }
        let kind = request.kind;
        let dataset = Dataset::new(kind, records);
        let rows = dataset.len();
        self.candidates = CandidateIndex::build(&dataset);
        if self.sort.retain_columns(&dataset.columns) {
            log::debug!("dropped sort keys for columns missing from {}", kind.as_str());
        }
        self.filter.retain_columns(&dataset.columns);
        if self.filter.retain_candidates(&self.candidates) {
            log::debug!("dropped filter values missing from {}", kind.as_str());
        }
        self.dataset = Some(dataset);
        self.refresh_view();
        self.load = LoadState::Loaded;
        log::info!("loaded {rows} rows of {}", kind.as_str());

        let mut events = vec![AppEvent::DatasetReplaced { kind, rows }];
        if !self.search.trim().is_empty() {
            let status = self.match_summary();
            events.push(self.set_status(&status));
        }
        events
    }

    // The grid keeps whatever it showed last.
    fn dataset_failed(&mut self, request: FetchRequest, message: &str) -> Vec<AppEvent> {
        if !self.settle_fetch(request) {
            return Vec::new();
        }
        let kind = request.kind;
        log::warn!("load {} failed: {message}", kind.as_str());
        self.load = LoadState::Failed(message.to_owned());
        vec![self.set_status(&format!("load {} failed: {message}", kind.label()))]
    }

    fn view_changed(&mut self) -> Vec<AppEvent> {
        self.refresh_view();
        let mut events = vec![AppEvent::ViewChanged];
        if !self.search.trim().is_empty() {
            let status = self.match_summary();
            events.push(self.set_status(&status));
        } else if self.status_line.is_some() {
            self.status_line = None;
            events.push(AppEvent::StatusCleared);
        }
        events
    }

    fn match_summary(&self) -> String {
        let total = self.dataset.as_ref().map_or(0, Dataset::len);
        format!("{} of {total} rows match", self.visible_rows().len())
    }

    fn issue_session(&mut self) -> u32 {
        let session = self.next_session;
        self.next_session = self.next_session.wrapping_add(1);
        session
    }

    fn open_form(&mut self, kind: FormKind) -> Vec<AppEvent> {
        if let Some(surface) = self.surface() {
            return vec![self.set_status(&format!("close the {} first", surface_name(surface)))];
        }
        self.layout.abort_resize();
        let session = self.issue_session();
        let (form, lookups) = FormSession::open(kind, session);
        self.form = Some(form);
        let mut events = vec![AppEvent::SurfaceOpened(Surface::Form(kind))];
        if !lookups.is_empty() {
            events.push(AppEvent::LookupsRequested(lookups));
        }
        events
    }

    fn submit_form(&mut self) -> Vec<AppEvent> {
        if self.in_flight.is_some() {
            return Vec::new();
        }
        let Some(form) = self.form.as_mut() else {
            return Vec::new();
        };
        match form.submission() {
            Ok(writes) => {
                form.error = None;
                let surface = Surface::Form(form.kind());
                vec![self.begin_writes(surface, writes)]
            }
            Err(error) => {
                let message = error.to_string();
                form.error = Some(message.clone());
                vec![self.set_status(&message)]
            }
        }
    }

    fn close_form(&mut self) -> Vec<AppEvent> {
        let Some(form) = self.form.take() else {
            return Vec::new();
        };
        self.in_flight = None;
        vec![AppEvent::SurfaceClosed(Surface::Form(form.kind()))]
    }

    fn submit_genre(&mut self) -> Vec<AppEvent> {
        if self.in_flight.is_some() {
            return Vec::new();
        }
        let Some(form) = self.form.as_mut() else {
            return Vec::new();
        };
        match form.genre_request() {
            Ok(write) => vec![self.begin_writes(Surface::Genre, vec![write])],
            Err(error) => {
                let message = error.to_string();
                form.error = Some(message.clone());
                vec![self.set_status(&message)]
            }
        }
    }

    fn open_editor(&mut self, row: usize, column: &str) -> Vec<AppEvent> {
        if self.mode != AppMode::Edit {
            return vec![self.set_status("press e to enter edit mode first")];
        }
        if self.surface().is_some() {
            return Vec::new();
        }
        let Some(record) = self
            .dataset
            .as_ref()
            .and_then(|dataset| dataset.records.get(row))
        else {
            return Vec::new();
        };
        match EditDraft::open(self.active, record, column) {
            Ok(draft) => {
                let warning = draft.warning();
                self.layout.abort_resize();
                self.editor = Some(draft);
                let mut events = vec![AppEvent::SurfaceOpened(Surface::Editor)];
                if let Some(warning) = warning {
                    events.push(self.set_status(warning));
                }
                events
            }
            Err(error) => vec![self.set_status(&error.to_string())],
        }
    }

    fn submit_edit(&mut self) -> Vec<AppEvent> {
        if self.in_flight.is_some() {
            return Vec::new();
        }
        let Some(editor) = self.editor.as_mut() else {
            return Vec::new();
        };
        match editor.request() {
            Ok(request) => {
                editor.error = None;
                let write = request.to_write();
                vec![self.begin_writes(Surface::Editor, vec![write])]
            }
            Err(error) => {
                let message = error.to_string();
                editor.error = Some(message.clone());
                vec![self.set_status(&message)]
            }
        }
    }

    fn open_delete(&mut self, kind: DeleteKind) -> Vec<AppEvent> {
        if let Some(surface) = self.surface() {
            return vec![self.set_status(&format!("close the {} first", surface_name(surface)))];
        }
        self.layout.abort_resize();
        let session = self.issue_session();
        let (draft, lookups) = DeleteDraft::open(kind, session);
        self.deletion = Some(draft);
        let mut events = vec![AppEvent::SurfaceOpened(Surface::Delete(kind))];
        if !lookups.is_empty() {
            events.push(AppEvent::LookupsRequested(lookups));
        }
        events
    }

    fn review_delete(&mut self) -> Vec<AppEvent> {
        let Some(deletion) = self.deletion.as_mut() else {
            return Vec::new();
        };
        if let Err(error) = deletion.begin_confirm() {
            let message = error.to_string();
            deletion.error = Some(message.clone());
            return vec![self.set_status(&message)];
        }
        Vec::new()
    }

    fn confirm_delete(&mut self) -> Vec<AppEvent> {
        if self.in_flight.is_some() {
            return Vec::new();
        }
        let Some(deletion) = self.deletion.as_ref() else {
            return Vec::new();
        };
        if deletion.stage() != DeleteStage::Confirming {
            return Vec::new();
        }
        let Some(request) = deletion.confirm() else {
            return Vec::new();
        };
        let surface = Surface::Delete(deletion.kind());
        log::info!("deleting {}", request.describe());
        let write = request.to_write();
        vec![self.begin_writes(surface, vec![write])]
    }

    fn begin_writes(&mut self, surface: Surface, writes: Vec<WriteRequest>) -> AppEvent {
        let seq = self.issue_seq();
        self.in_flight = Some(InFlight { surface, seq });
        AppEvent::WritesRequested(WriteBatch { seq, writes })
    }

    // An outcome nobody waits for still changed server data when anything
    // was applied, so the grid reloads.
    fn settle_write(&mut self, seq: u64, applied: bool) -> Result<Surface, Vec<AppEvent>> {
        match self.in_flight {
            Some(in_flight) if in_flight.seq == seq => {
                self.in_flight = None;
                Ok(in_flight.surface)
            }
            _ => {
                log::debug!("write batch #{seq} finished after its surface closed");
                Err(if applied { self.reload() } else { Vec::new() })
            }
        }
    }

    fn lookup_resolved(&mut self, ticket: Ticket, result: LookupResult) -> Vec<AppEvent> {
        if let Some(form) = self.form.as_mut()
            && form.awaits(ticket)
        {
            form.apply_lookup(ticket, result);
            return vec![AppEvent::ViewChanged];
        }
        if let Some(deletion) = self.deletion.as_mut()
            && deletion.awaits(ticket)
        {
            deletion.apply_lookup(ticket, result);
            return vec![AppEvent::ViewChanged];
        }
        log::debug!("discarding stale lookup {ticket}");
        Vec::new()
    }

    // Every successful write closes its surface and reloads the grid.
    fn mutation_succeeded(&mut self, seq: u64) -> Vec<AppEvent> {
        let surface = match self.settle_write(seq, true) {
            Ok(surface) => surface,
            Err(events) => return events,
        };
        let mut events = Vec::new();
        match surface {
            Surface::Form(kind) => {
                self.form = None;
                events.push(AppEvent::SurfaceClosed(surface));
                events.push(self.set_status(&format!("{} saved", kind.title())));
            }
            Surface::Genre => {
                if let Some(form) = self.form.as_mut() {
                    let lookups = form.genre_created();
                    events.push(AppEvent::SurfaceClosed(surface));
                    events.push(AppEvent::LookupsRequested(lookups));
                }
                events.push(self.set_status("genre created"));
            }
            Surface::Editor => {
                self.editor = None;
                events.push(AppEvent::SurfaceClosed(surface));
                events.push(self.set_status("cell updated"));
            }
            Surface::Delete(kind) => {
                self.deletion = None;
                events.push(AppEvent::SurfaceClosed(surface));
                events.push(self.set_status(&format!("{} deleted", kind.label())));
            }
        }
        events.extend(self.reload());
        events
    }

    // The surface stays open with its input; the grid keeps its rows.
    // When part of the batch went through, the applied values leave the
    // form and the grid reloads so a resubmit sends only the rest.
    fn mutation_failed(&mut self, seq: u64, failure: &WriteFailure) -> Vec<AppEvent> {
        let surface = match self.settle_write(seq, failure.applied > 0) {
            Ok(surface) => surface,
            Err(events) => return events,
        };
        let message = if failure.applied > 0 {
            format!("{} ({} saved before the failure)", failure.error, failure.applied)
        } else {
            failure.error.to_string()
        };
        let message = message.as_str();
        log::warn!("{} write failed: {message}", surface_name(surface));
        let mut events = Vec::new();
        match surface {
            Surface::Form(_) => {
                if let Some(form) = self.form.as_mut() {
                    form.error = Some(message.to_owned());
                    if failure.applied > 0 {
                        let lookups = form.drop_applied(failure.applied);
                        if !lookups.is_empty() {
                            events.push(AppEvent::LookupsRequested(lookups));
                        }
                    }
                }
            }
            Surface::Genre => {
                if let Some(form) = self.form.as_mut() {
                    form.error = Some(message.to_owned());
                }
            }
            Surface::Editor => {
                if let Some(editor) = self.editor.as_mut() {
                    editor.error = Some(message.to_owned());
                }
            }
            Surface::Delete(_) => {
                if let Some(deletion) = self.deletion.as_mut() {
                    deletion.fail(message);
                }
            }
        }
        events.push(self.set_status(message));
        if failure.applied > 0 {
            events.extend(self.reload());
        }
        events
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}

fn surface_name(surface: Surface) -> &'static str {
    match surface {
        Surface::Form(_) => "form",
        Surface::Genre => "genre dialog",
        Surface::Editor => "cell editor",
        Surface::Delete(_) => "delete dialog",
    }
}
