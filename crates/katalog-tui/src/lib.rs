// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture, Event,
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use katalog_app::{
    AppCommand, AppEvent, AppMode, AppState, COLUMN_SPACING, DatasetKind, DeleteDraft,
    DeleteInput, DeleteKind, DeleteStage, EditDraft, FetchRequest, FieldKind, FormConfig,
    FormInputError, FormKind, FormSession, HeaderHit, IDENTIFIER_WARNING, LoadState, LookupKind,
    LookupRequest, LookupResult, Record, RemoteError, SelectOption, Surface, Ticket, WriteBatch,
    WriteFailure, WriteRequest, column_label,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs, Wrap};

const PAGE_ROWS: isize = 10;
const NUDGE_STEP: i16 = 2;
const STATUS_TTL: Duration = Duration::from_secs(4);
const FILTER_MARK_ACTIVE: &str = "▼";
const EMPTY_CHOICE: &str = "—";

/// Backend access the interaction loop needs. The blocking calls may run
/// inline; the `spawn_*` hooks let an implementation push them off-thread
/// and report back through the channel, carrying the request's ticket.
pub trait AppRuntime {
    fn load_dataset(&mut self, kind: DatasetKind) -> Result<Vec<Record>, RemoteError>;
    fn load_lookup(&mut self, kind: LookupKind) -> Result<Vec<Record>, RemoteError>;
    /// Issues writes in order, stopping at the first failure.
    fn write(&mut self, writes: &[WriteRequest]) -> Result<usize, WriteFailure>;

    fn spawn_fetch(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self
            .load_dataset(request.kind)
            .map_err(|error| error.to_string());
        tx.send(InternalEvent::Fetched { request, result })
            .map_err(|_| anyhow::anyhow!("fetch event channel closed"))?;
        Ok(())
    }

    fn spawn_writes(&mut self, batch: WriteBatch, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.write(&batch.writes);
        tx.send(InternalEvent::Written {
            seq: batch.seq,
            result,
        })
        .map_err(|_| anyhow::anyhow!("write event channel closed"))?;
        Ok(())
    }

    fn spawn_lookup(&mut self, request: LookupRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let result: LookupResult = self
            .load_lookup(request.kind)
            .map_err(|error| error.to_string());
        tx.send(InternalEvent::Lookup {
            ticket: request.ticket,
            result,
        })
        .map_err(|_| anyhow::anyhow!("lookup event channel closed"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    Lookup {
        ticket: Ticket,
        result: LookupResult,
    },
    Fetched {
        request: FetchRequest,
        result: Result<Vec<Record>, String>,
    },
    Written {
        seq: u64,
        result: Result<usize, WriteFailure>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuKind {
    Add,
    Delete,
}

impl MenuKind {
    fn title(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
        }
    }

    fn labels(self) -> Vec<&'static str> {
        match self {
            Self::Add => FormKind::ALL.iter().map(|kind| kind.title()).collect(),
            Self::Delete => DeleteKind::ALL.iter().map(|kind| kind.label()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MenuUiState {
    kind: MenuKind,
    cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FilterPickerUiState {
    column: String,
    cursor: usize,
}

/// One focusable line of a form: a single-valued field or one row of an
/// incremental list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormSlot {
    Field(usize),
    Row(usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewData {
    screen: Rect,
    cursor_row: usize,
    cursor_col: usize,
    col_offset: usize,
    search_input: Option<String>,
    picker: Option<FilterPickerUiState>,
    menu: Option<MenuUiState>,
    form_slot: usize,
    delete_field: usize,
    status_token: u64,
}

impl Default for ViewData {
    fn default() -> Self {
        Self {
            screen: Rect::new(0, 0, 80, 24),
            cursor_row: 0,
            cursor_col: 0,
            col_offset: 0,
            search_input: None,
            picker: None,
            menu: None,
            form_slot: 0,
            delete_field: 0,
            status_token: 0,
        }
    }
}

impl ViewData {
    fn reset_grid(&mut self) {
        self.cursor_row = 0;
        self.cursor_col = 0;
        self.col_offset = 0;
        self.picker = None;
    }

    fn has_overlay(&self) -> bool {
        self.search_input.is_some() || self.picker.is_some() || self.menu.is_some()
    }
}

/// Screen positions of the grid, derived from the terminal size the same
/// way `render` lays it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableGeometry {
    origin_x: u16,
    header_y: u16,
    body_y: u16,
    inner_width: u16,
    body_height: usize,
}

impl TableGeometry {
    fn new(screen: Rect) -> Self {
        let area = screen_layout(screen)[1];
        Self {
            origin_x: area.x.saturating_add(1),
            header_y: area.y.saturating_add(1),
            body_y: area.y.saturating_add(2),
            inner_width: area.width.saturating_sub(2),
            body_height: usize::from(area.height.saturating_sub(3)),
        }
    }
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        let guard = Self;
        execute!(
            io::stdout(),
            terminal::EnterAlternateScreen,
            EnableMouseCapture,
            EnableFocusChange
        )
        .context("enter alternate screen")?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(
            io::stdout(),
            DisableFocusChange,
            DisableMouseCapture,
            terminal::LeaveAlternateScreen
        );
        let _ = disable_raw_mode();
    }
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    let guard = TerminalGuard::enter()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    if let Ok((width, height)) = terminal::size() {
        view_data.screen = Rect::new(0, 0, width, height);
    }
    let (internal_tx, internal_rx) = mpsc::channel();

    let events = state.dispatch(AppCommand::Reload);
    apply_events(state, runtime, &mut view_data, &internal_tx, events);

    let result = event_loop(
        &mut terminal,
        state,
        runtime,
        &mut view_data,
        &internal_tx,
        &internal_rx,
    );

    if state.layout.abort_resize() {
        log::debug!("column resize aborted on exit");
    }
    drop(guard);
    result
}

fn event_loop<R: AppRuntime>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    internal_rx: &Receiver<InternalEvent>,
) -> Result<()> {
    loop {
        process_internal_events(state, runtime, view_data, internal_tx, internal_rx);

        terminal
            .draw(|frame| render(frame, state, view_data))
            .context("draw frame")?;

        if !event::poll(Duration::from_millis(120)).context("poll event")? {
            continue;
        }
        match event::read().context("read event")? {
            Event::Key(key) => {
                if handle_key_event(state, runtime, view_data, internal_tx, key) {
                    return Ok(());
                }
            }
            Event::Mouse(mouse) => {
                let events = handle_mouse_event(state, view_data, mouse);
                apply_events(state, runtime, view_data, internal_tx, events);
            }
            Event::Resize(width, height) => {
                view_data.screen = Rect::new(0, 0, width, height);
                clamp_cursor(state, view_data);
            }
            Event::FocusLost => {
                if state.layout.abort_resize() {
                    log::debug!("column resize aborted on focus loss");
                }
            }
            _ => {}
        }
    }
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Lookup { ticket, result } => {
                let events = state.dispatch(AppCommand::LookupResolved { ticket, result });
                apply_events(state, runtime, view_data, tx, events);
            }
            InternalEvent::Fetched { request, result } => {
                let command = match result {
                    Ok(records) => AppCommand::DatasetLoaded { request, records },
                    Err(message) => AppCommand::DatasetFailed { request, message },
                };
                let events = state.dispatch(command);
                apply_events(state, runtime, view_data, tx, events);
            }
            InternalEvent::Written { seq, result } => {
                let command = match result {
                    Ok(sent) => {
                        log::debug!("{sent} writes applied");
                        AppCommand::MutationSucceeded { seq }
                    }
                    Err(failure) => AppCommand::MutationFailed { seq, failure },
                };
                let events = state.dispatch(command);
                apply_events(state, runtime, view_data, tx, events);
            }
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_TTL);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

/// Carries out the side effects `dispatch` asked for, feeding outcomes
/// back in until nothing is left to do.
fn apply_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    events: Vec<AppEvent>,
) {
    let mut queue = VecDeque::from(events);
    while let Some(event) = queue.pop_front() {
        let follow_up = match event {
            AppEvent::FetchRequested(request) => {
                match runtime.spawn_fetch(request, internal_tx.clone()) {
                    Ok(()) => Vec::new(),
                    Err(error) => state.dispatch(AppCommand::DatasetFailed {
                        request,
                        message: format!("{error:#}"),
                    }),
                }
            }
            AppEvent::LookupsRequested(requests) => {
                for request in requests {
                    let described = request.kind.describe();
                    if let Err(error) = runtime.spawn_lookup(request, internal_tx.clone()) {
                        log::warn!("lookup {described} not started: {error:#}");
                    }
                }
                Vec::new()
            }
            AppEvent::WritesRequested(batch) => {
                let seq = batch.seq;
                match runtime.spawn_writes(batch, internal_tx.clone()) {
                    Ok(()) => Vec::new(),
                    Err(error) => state.dispatch(AppCommand::MutationFailed {
                        seq,
                        failure: WriteFailure::new(0, RemoteError::transport(format!("{error:#}"))),
                    }),
                }
            }
            AppEvent::StatusUpdated(_) => {
                view_data.status_token = view_data.status_token.saturating_add(1);
                schedule_status_clear(internal_tx, view_data.status_token);
                Vec::new()
            }
            AppEvent::TableChanged(_) => {
                view_data.reset_grid();
                Vec::new()
            }
            AppEvent::SurfaceOpened(surface) => {
                match surface {
                    Surface::Form(_) => view_data.form_slot = 0,
                    Surface::Delete(_) => view_data.delete_field = 0,
                    Surface::Genre | Surface::Editor => {}
                }
                view_data.menu = None;
                view_data.picker = None;
                Vec::new()
            }
            AppEvent::ModeChanged(_)
            | AppEvent::DatasetReplaced { .. }
            | AppEvent::ViewChanged
            | AppEvent::SurfaceClosed(_)
            | AppEvent::StatusCleared => Vec::new(),
        };
        queue.extend(follow_up);
    }
    clamp_cursor(state, view_data);
}

fn has_control(key: KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
}

/// Returns true when the app should quit.
fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.kind == KeyEventKind::Release {
        return false;
    }
    if has_control(key) && key.code == KeyCode::Char('q') {
        return true;
    }

    let events = match state.surface() {
        Some(Surface::Genre) => handle_genre_key(state, key),
        Some(Surface::Form(_)) => handle_form_key(state, view_data, key),
        Some(Surface::Editor) => handle_editor_key(state, key),
        Some(Surface::Delete(_)) => handle_delete_key(state, view_data, key),
        None if view_data.search_input.is_some() => handle_search_key(state, view_data, key),
        None if view_data.picker.is_some() => handle_picker_key(state, view_data, key),
        None if view_data.menu.is_some() => handle_menu_key(state, view_data, key),
        None => handle_grid_key(state, view_data, key),
    };
    apply_events(state, runtime, view_data, internal_tx, events);
    false
}

/// Single-line text editing shared by every input.
fn edited(current: &str, key: KeyEvent) -> Option<String> {
    match key.code {
        KeyCode::Backspace => {
            let mut next = current.to_owned();
            next.pop()?;
            Some(next)
        }
        KeyCode::Char(ch) if !has_control(key) => Some(format!("{current}{ch}")),
        _ => None,
    }
}

fn cycle<'a>(options: &'a [SelectOption], current: &str, step: isize) -> Option<&'a SelectOption> {
    if options.is_empty() {
        return None;
    }
    let len = options.len() as isize;
    let next = match options.iter().position(|option| option.value == current) {
        Some(position) => (position as isize + step).rem_euclid(len),
        None if step < 0 => len - 1,
        None => 0,
    };
    options.get(next as usize)
}

fn option_label<'a>(options: &'a [SelectOption], value: &'a str) -> &'a str {
    options
        .iter()
        .find(|option| option.value == value)
        .map_or(value, |option| option.label.as_str())
}

fn step_for(code: KeyCode) -> isize {
    if code == KeyCode::Left { -1 } else { 1 }
}

fn handle_grid_key(state: &mut AppState, view_data: &mut ViewData, key: KeyEvent) -> Vec<AppEvent> {
    let control = has_control(key);
    match key.code {
        KeyCode::Tab => state.dispatch(AppCommand::NextTable),
        KeyCode::BackTab => state.dispatch(AppCommand::PrevTable),
        KeyCode::Char('d') if control => move_row(state, view_data, PAGE_ROWS),
        KeyCode::Char('u') if control => move_row(state, view_data, -PAGE_ROWS),
        KeyCode::PageDown => move_row(state, view_data, PAGE_ROWS),
        KeyCode::PageUp => move_row(state, view_data, -PAGE_ROWS),
        KeyCode::Down | KeyCode::Char('j') => move_row(state, view_data, 1),
        KeyCode::Up | KeyCode::Char('k') => move_row(state, view_data, -1),
        KeyCode::Char('g') => move_row(state, view_data, isize::MIN),
        KeyCode::Char('G') => move_row(state, view_data, isize::MAX),
        KeyCode::Left | KeyCode::Char('h') => move_col(state, view_data, -1),
        KeyCode::Right | KeyCode::Char('l') => move_col(state, view_data, 1),
        KeyCode::Char('s') => sort_current(state, view_data, false),
        KeyCode::Char('S') => sort_current(state, view_data, true),
        KeyCode::Char('c') => state.dispatch(AppCommand::ClearSort),
        KeyCode::Char('f') => open_picker(state, view_data),
        KeyCode::Char('F') => state.dispatch(AppCommand::ClearFilters),
        KeyCode::Char('/') => {
            view_data.search_input = Some(state.search.clone());
            Vec::new()
        }
        KeyCode::Char('<') => nudge_current(state, view_data, -NUDGE_STEP),
        KeyCode::Char('>') => nudge_current(state, view_data, NUDGE_STEP),
        KeyCode::Char('e') => state.dispatch(AppCommand::ToggleEditMode),
        KeyCode::Enter => open_editor(state, view_data),
        KeyCode::Char('a') => open_menu(view_data, MenuKind::Add),
        KeyCode::Char('d') => open_menu(view_data, MenuKind::Delete),
        KeyCode::Char('r') => state.dispatch(AppCommand::Reload),
        KeyCode::Esc if !state.search.is_empty() => {
            state.dispatch(AppCommand::SetSearch(String::new()))
        }
        _ => Vec::new(),
    }
}

fn move_row(state: &AppState, view_data: &mut ViewData, delta: isize) -> Vec<AppEvent> {
    let last = state.visible_rows().len().saturating_sub(1);
    let next = (view_data.cursor_row as isize).saturating_add(delta);
    view_data.cursor_row = next.clamp(0, last as isize) as usize;
    Vec::new()
}

fn move_col(state: &AppState, view_data: &mut ViewData, delta: isize) -> Vec<AppEvent> {
    let last = state.columns().len().saturating_sub(1);
    let next = (view_data.cursor_col as isize).saturating_add(delta);
    view_data.cursor_col = next.clamp(0, last as isize) as usize;
    ensure_column_visible(state, view_data);
    Vec::new()
}

fn current_column(state: &AppState, view_data: &ViewData) -> Option<String> {
    state.columns().get(view_data.cursor_col).cloned()
}

fn sort_current(state: &mut AppState, view_data: &ViewData, accumulate: bool) -> Vec<AppEvent> {
    let Some(column) = current_column(state, view_data) else {
        return Vec::new();
    };
    state.dispatch(AppCommand::ActivateSort { column, accumulate })
}

fn nudge_current(state: &mut AppState, view_data: &mut ViewData, delta: i16) -> Vec<AppEvent> {
    let Some(column) = current_column(state, view_data) else {
        return Vec::new();
    };
    let width = state.layout.nudge(&column, delta);
    log::debug!("column {column} width {width}");
    ensure_column_visible(state, view_data);
    vec![AppEvent::ViewChanged]
}

fn open_picker(state: &mut AppState, view_data: &mut ViewData) -> Vec<AppEvent> {
    let Some(column) = current_column(state, view_data) else {
        return Vec::new();
    };
    if state.candidates.values(&column).is_empty() {
        return state.dispatch(AppCommand::SetStatus(format!(
            "{} has no values to filter",
            column_label(&column)
        )));
    }
    view_data.picker = Some(FilterPickerUiState { column, cursor: 0 });
    Vec::new()
}

fn open_editor(state: &mut AppState, view_data: &ViewData) -> Vec<AppEvent> {
    let Some(row) = state.visible_rows().get(view_data.cursor_row).copied() else {
        return Vec::new();
    };
    let Some(column) = current_column(state, view_data) else {
        return Vec::new();
    };
    state.dispatch(AppCommand::OpenEditor { row, column })
}

fn open_menu(view_data: &mut ViewData, kind: MenuKind) -> Vec<AppEvent> {
    view_data.menu = Some(MenuUiState { kind, cursor: 0 });
    Vec::new()
}

fn handle_search_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    key: KeyEvent,
) -> Vec<AppEvent> {
    let Some(query) = view_data.search_input.as_mut() else {
        return Vec::new();
    };
    match key.code {
        KeyCode::Enter => {
            view_data.search_input = None;
            Vec::new()
        }
        KeyCode::Esc => {
            view_data.search_input = None;
            state.dispatch(AppCommand::SetSearch(String::new()))
        }
        _ => match edited(query, key) {
            Some(next) => {
                next.clone_into(query);
                view_data.cursor_row = 0;
                state.dispatch(AppCommand::SetSearch(next))
            }
            None => Vec::new(),
        },
    }
}

fn handle_picker_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    key: KeyEvent,
) -> Vec<AppEvent> {
    let Some(picker) = view_data.picker.as_mut() else {
        return Vec::new();
    };
    let count = state.candidates.values(&picker.column).len();
    match key.code {
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('f') | KeyCode::Char('q') => {
            view_data.picker = None;
            Vec::new()
        }
        KeyCode::Down | KeyCode::Char('j') => {
            picker.cursor = (picker.cursor + 1).min(count.saturating_sub(1));
            Vec::new()
        }
        KeyCode::Up | KeyCode::Char('k') => {
            picker.cursor = picker.cursor.saturating_sub(1);
            Vec::new()
        }
        KeyCode::Char(' ') => {
            let column = picker.column.clone();
            let Some(value) = state.candidates.values(&column).get(picker.cursor).cloned()
            else {
                return Vec::new();
            };
            state.dispatch(AppCommand::ToggleFilterValue { column, value })
        }
        KeyCode::Char('a') => {
            let column = picker.column.clone();
            state.dispatch(AppCommand::ToggleSelectAll(column))
        }
        KeyCode::Char('x') => {
            let column = picker.column.clone();
            state.dispatch(AppCommand::ClearColumnFilter(column))
        }
        _ => Vec::new(),
    }
}

fn handle_menu_key(state: &mut AppState, view_data: &mut ViewData, key: KeyEvent) -> Vec<AppEvent> {
    let Some(menu) = view_data.menu.as_mut() else {
        return Vec::new();
    };
    let count = menu.kind.labels().len();
    let choice = match key.code {
        KeyCode::Esc | KeyCode::Char('q') => {
            view_data.menu = None;
            return Vec::new();
        }
        KeyCode::Down | KeyCode::Char('j') => {
            menu.cursor = (menu.cursor + 1).min(count.saturating_sub(1));
            return Vec::new();
        }
        KeyCode::Up | KeyCode::Char('k') => {
            menu.cursor = menu.cursor.saturating_sub(1);
            return Vec::new();
        }
        KeyCode::Enter => menu.cursor,
        KeyCode::Char(ch) => match ch.to_digit(10) {
            Some(digit) if digit >= 1 && (digit as usize) <= count => digit as usize - 1,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    let kind = menu.kind;
    view_data.menu = None;
    match kind {
        MenuKind::Add => match FormKind::ALL.get(choice) {
            Some(form) => state.dispatch(AppCommand::OpenForm(*form)),
            None => Vec::new(),
        },
        MenuKind::Delete => match DeleteKind::ALL.get(choice) {
            Some(deletion) => state.dispatch(AppCommand::OpenDelete(*deletion)),
            None => Vec::new(),
        },
    }
}

fn form_slots(config: &FormConfig) -> Vec<FormSlot> {
    let mut slots = Vec::new();
    for (index, field) in config.fields.iter().enumerate() {
        if field.spec.is_multi() {
            slots.extend((0..field.rows.len()).map(|row| FormSlot::Row(index, row)));
        } else {
            slots.push(FormSlot::Field(index));
        }
    }
    slots
}

fn handle_form_key(state: &mut AppState, view_data: &mut ViewData, key: KeyEvent) -> Vec<AppEvent> {
    let control = has_control(key);
    match key.code {
        KeyCode::Esc => return state.dispatch(AppCommand::CloseForm),
        KeyCode::Enter => return state.dispatch(AppCommand::SubmitForm),
        KeyCode::Char('s') if control => return state.dispatch(AppCommand::SubmitForm),
        KeyCode::Char('g') if control => return state.dispatch(AppCommand::BeginGenre),
        _ => {}
    }

    let Some(form) = state.form.as_mut() else {
        return Vec::new();
    };
    let config = form.config();
    let slots = form_slots(&config);
    let Some(last) = slots.len().checked_sub(1) else {
        return Vec::new();
    };
    let current = view_data.form_slot.min(last);
    let slot = slots[current];

    let outcome = match (key.code, slot) {
        (KeyCode::Down | KeyCode::Tab, _) => {
            view_data.form_slot = (current + 1).min(last);
            return Vec::new();
        }
        (KeyCode::Up | KeyCode::BackTab, _) => {
            view_data.form_slot = current.saturating_sub(1);
            return Vec::new();
        }
        (KeyCode::Left | KeyCode::Right, slot) => {
            cycle_form_slot(form, &config, slot, step_for(key.code))
        }
        (KeyCode::Char('n'), FormSlot::Row(field, row)) if control => {
            form.append_row(config.fields[field].spec.name).map(|index| {
                view_data.form_slot = current + index.saturating_sub(row);
                Vec::new()
            })
        }
        (KeyCode::Delete, FormSlot::Row(field, row)) => form
            .remove_row(config.fields[field].spec.name, row)
            .map(|()| Vec::new()),
        (_, FormSlot::Field(index)) => {
            let field = &config.fields[index];
            if matches!(field.spec.kind, FieldKind::Select) {
                return Vec::new();
            }
            match edited(&field.value, key) {
                Some(next) => form.set_value(field.spec.name, &next),
                None => return Vec::new(),
            }
        }
        (_, FormSlot::Row(..)) => return Vec::new(),
    };
    match outcome {
        Ok(lookups) => {
            form.error = None;
            if lookups.is_empty() {
                vec![AppEvent::ViewChanged]
            } else {
                vec![AppEvent::LookupsRequested(lookups)]
            }
        }
        Err(error) => {
            let message = error.to_string();
            form.error = Some(message.clone());
            state.dispatch(AppCommand::SetStatus(message))
        }
    }
}

fn cycle_form_slot(
    form: &mut FormSession,
    config: &FormConfig,
    slot: FormSlot,
    step: isize,
) -> Result<Vec<LookupRequest>, FormInputError> {
    match slot {
        FormSlot::Field(index) => {
            let field = &config.fields[index];
            if field.spec.kind != FieldKind::Select {
                return Ok(Vec::new());
            }
            if !field.enabled {
                return Err(FormInputError::Disabled(field.spec.label.to_owned()));
            }
            match cycle(&field.options, &field.value, step) {
                Some(next) => form.set_value(field.spec.name, &next.value),
                None => Ok(Vec::new()),
            }
        }
        FormSlot::Row(index, row) => {
            let field = &config.fields[index];
            let Some(resolved) = field.rows.get(row) else {
                return Ok(Vec::new());
            };
            let current = resolved.value.as_deref().unwrap_or_default();
            match cycle(&resolved.options, current, step) {
                Some(next) => form
                    .set_row(field.spec.name, row, &next.value)
                    .map(|()| Vec::new()),
                None => Ok(Vec::new()),
            }
        }
    }
}

fn handle_genre_key(state: &mut AppState, key: KeyEvent) -> Vec<AppEvent> {
    match key.code {
        KeyCode::Esc => state.dispatch(AppCommand::CancelGenre),
        KeyCode::Enter => state.dispatch(AppCommand::SubmitGenre),
        _ => {
            if let Some(form) = state.form.as_mut()
                && let Some(next) = form.genre_draft().and_then(|draft| edited(draft, key))
            {
                form.set_genre_draft(&next);
                form.error = None;
            }
            Vec::new()
        }
    }
}

fn handle_editor_key(state: &mut AppState, key: KeyEvent) -> Vec<AppEvent> {
    match key.code {
        KeyCode::Esc => state.dispatch(AppCommand::CloseEditor),
        KeyCode::Enter => state.dispatch(AppCommand::SubmitEdit),
        _ => {
            let Some(editor) = state.editor.as_mut() else {
                return Vec::new();
            };
            let Some(next) = edited(editor.input(), key) else {
                return Vec::new();
            };
            if editor.set_input(&next) {
                editor.error = None;
                Vec::new()
            } else {
                state.dispatch(AppCommand::SetStatus(IDENTIFIER_WARNING.to_owned()))
            }
        }
    }
}

fn handle_delete_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    key: KeyEvent,
) -> Vec<AppEvent> {
    let Some(deletion) = state.deletion.as_mut() else {
        return Vec::new();
    };
    if deletion.stage() == DeleteStage::Confirming {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Enter => state.dispatch(AppCommand::ConfirmDelete),
            KeyCode::Char('n') | KeyCode::Esc => {
                deletion.back();
                vec![AppEvent::ViewChanged]
            }
            _ => Vec::new(),
        };
    }

    match key.code {
        KeyCode::Esc => return state.dispatch(AppCommand::CloseDelete),
        KeyCode::Enter => return state.dispatch(AppCommand::ReviewDelete),
        _ => {}
    }
    let fields = deletion.fields();
    let Some(last) = fields.len().checked_sub(1) else {
        return Vec::new();
    };
    let current = view_data.delete_field.min(last);
    let field = &fields[current];

    let outcome = match key.code {
        KeyCode::Down | KeyCode::Tab => {
            view_data.delete_field = (current + 1).min(last);
            return Vec::new();
        }
        KeyCode::Up | KeyCode::BackTab => {
            view_data.delete_field = current.saturating_sub(1);
            return Vec::new();
        }
        KeyCode::Left | KeyCode::Right => {
            if !matches!(field.field.input, DeleteInput::Select(..)) {
                return Vec::new();
            }
            if field.enabled {
                match cycle(&field.options, &field.value, step_for(key.code)) {
                    Some(next) => deletion.set_value(field.field.name, &next.value),
                    None => return Vec::new(),
                }
            } else {
                Err(FormInputError::Disabled(field.field.label.to_owned()))
            }
        }
        KeyCode::Char(ch)
            if field.field.input == DeleteInput::Number && !ch.is_ascii_digit() =>
        {
            return Vec::new();
        }
        _ => {
            if matches!(field.field.input, DeleteInput::Select(..)) {
                return Vec::new();
            }
            match edited(&field.value, key) {
                Some(next) => deletion.set_value(field.field.name, &next),
                None => return Vec::new(),
            }
        }
    };
    match outcome {
        Ok(()) => {
            deletion.error = None;
            vec![AppEvent::ViewChanged]
        }
        Err(error) => {
            let message = error.to_string();
            deletion.error = Some(message.clone());
            state.dispatch(AppCommand::SetStatus(message))
        }
    }
}

fn handle_mouse_event(
    state: &mut AppState,
    view_data: &mut ViewData,
    mouse: MouseEvent,
) -> Vec<AppEvent> {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if state.surface().is_some() || view_data.has_overlay() {
                return Vec::new();
            }
            press_grid(state, view_data, mouse)
        }
        MouseEventKind::Drag(MouseButton::Left) => match state.layout.drag_to(mouse.column) {
            Some(_) => {
                ensure_column_visible(state, view_data);
                vec![AppEvent::ViewChanged]
            }
            None => Vec::new(),
        },
        MouseEventKind::Up(MouseButton::Left) => {
            if let Some(column) = state.layout.end_resize() {
                log::debug!("column {column} resized to {}", state.layout.width(&column));
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn press_grid(state: &mut AppState, view_data: &mut ViewData, mouse: MouseEvent) -> Vec<AppEvent> {
    let geometry = TableGeometry::new(view_data.screen);
    if mouse.column < geometry.origin_x {
        return Vec::new();
    }
    let offset = view_data.col_offset;
    let rendered: Vec<String> = state.columns().get(offset..).unwrap_or_default().to_vec();
    let hit = state
        .layout
        .hit_test(&rendered, mouse.column - geometry.origin_x);

    if mouse.row == geometry.header_y {
        return match hit {
            HeaderHit::Label(index) => {
                view_data.cursor_col = offset + index;
                state.dispatch(AppCommand::ActivateSort {
                    column: rendered[index].clone(),
                    accumulate: mouse.modifiers.contains(KeyModifiers::SHIFT),
                })
            }
            // The handle swallows the press so no sort fires.
            HeaderHit::Separator(index) => {
                state.layout.begin_resize(&rendered[index], mouse.column);
                log::debug!("resize of {} started", rendered[index]);
                Vec::new()
            }
            HeaderHit::Outside => Vec::new(),
        };
    }

    if mouse.row >= geometry.body_y {
        let start = row_window_start(view_data.cursor_row, geometry.body_height);
        let row = start + usize::from(mouse.row - geometry.body_y);
        if row < state.visible_rows().len() {
            view_data.cursor_row = row;
        }
        if let HeaderHit::Label(index) = hit {
            view_data.cursor_col = offset + index;
        }
    }
    Vec::new()
}

fn row_window_start(cursor: usize, height: usize) -> usize {
    match height {
        0 => cursor,
        _ => cursor.saturating_sub(height - 1),
    }
}

/// End (exclusive) of the run of columns from `start` that fits `width`.
/// At least one column is always rendered.
fn fitted_columns(state: &AppState, start: usize, width: u16) -> usize {
    let columns = state.columns();
    let mut used: u32 = 0;
    let mut end = start;
    for column in columns.iter().skip(start) {
        let column_width = u32::from(state.layout.width(column));
        let needed = if end == start {
            column_width
        } else {
            used + u32::from(COLUMN_SPACING) + column_width
        };
        if end > start && needed > u32::from(width) {
            break;
        }
        used = needed;
        end += 1;
    }
    end
}

fn ensure_column_visible(state: &AppState, view_data: &mut ViewData) {
    let width = TableGeometry::new(view_data.screen).inner_width;
    if view_data.cursor_col < view_data.col_offset {
        view_data.col_offset = view_data.cursor_col;
    }
    while view_data.col_offset < view_data.cursor_col
        && view_data.cursor_col >= fitted_columns(state, view_data.col_offset, width)
    {
        view_data.col_offset += 1;
    }
}

fn clamp_cursor(state: &AppState, view_data: &mut ViewData) {
    let rows = state.visible_rows().len();
    view_data.cursor_row = view_data.cursor_row.min(rows.saturating_sub(1));
    let columns = state.columns().len();
    view_data.cursor_col = view_data.cursor_col.min(columns.saturating_sub(1));
    view_data.col_offset = view_data.col_offset.min(view_data.cursor_col);
    ensure_column_visible(state, view_data);
}

fn screen_layout(area: Rect) -> Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(area)
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = screen_layout(frame.area());

    let selected = DatasetKind::ALL
        .iter()
        .position(|kind| *kind == state.active)
        .unwrap_or(0);
    let titles = DatasetKind::ALL
        .iter()
        .map(|kind| kind.label())
        .collect::<Vec<_>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("katalog").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    render_table(frame, layout[1], state, view_data);

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    match state.surface() {
        Some(Surface::Form(kind)) => {
            if let Some(form) = &state.form {
                let text = render_form_overlay_text(form, view_data.form_slot);
                render_overlay(frame, kind.title(), text, 70, 80);
            }
        }
        Some(Surface::Genre) => {
            if let Some(form) = &state.form {
                render_overlay(frame, "new genre", render_genre_overlay_text(form), 50, 30);
            }
        }
        Some(Surface::Editor) => {
            if let Some(editor) = &state.editor {
                render_overlay(frame, "edit cell", render_editor_overlay_text(editor), 60, 35);
            }
        }
        Some(Surface::Delete(kind)) => {
            if let Some(deletion) = &state.deletion {
                let text = render_delete_overlay_text(deletion, view_data.delete_field);
                render_overlay(frame, &format!("delete {}", kind.label()), text, 60, 50);
            }
        }
        None => {}
    }

    if let Some(menu) = view_data.menu {
        render_overlay(frame, menu.kind.title(), render_menu_overlay_text(menu), 40, 50);
    }
    if let Some(picker) = &view_data.picker {
        let title = format!("filter {}", column_label(&picker.column));
        render_overlay(frame, &title, render_picker_overlay_text(state, picker), 50, 70);
    }
}

fn render_overlay(
    frame: &mut ratatui::Frame<'_>,
    title: &str,
    body: String,
    percent_x: u16,
    percent_y: u16,
) {
    let area = centered_rect(percent_x, percent_y, frame.area());
    frame.render_widget(Clear, area);
    let widget = Paragraph::new(body)
        .wrap(Wrap { trim: false })
        .block(Block::default().title(title.to_owned()).borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let block = Block::default()
        .title(table_title(state))
        .borders(Borders::ALL);
    let Some(dataset) = &state.dataset else {
        let message = match &state.load {
            LoadState::Failed(message) => format!("load failed: {message} -- press r to retry"),
            LoadState::Loading => "loading…".to_owned(),
            LoadState::Idle | LoadState::Loaded => String::new(),
        };
        frame.render_widget(Paragraph::new(message).block(block), area);
        return;
    };

    let start_col = view_data.col_offset.min(dataset.columns.len());
    let end_col = fitted_columns(state, start_col, area.width.saturating_sub(2));
    let columns = &dataset.columns[start_col..end_col];
    let widths = columns
        .iter()
        .map(|column| Constraint::Length(state.layout.width(column)))
        .collect::<Vec<_>>();

    let header = Row::new(columns.iter().map(|column| {
        Cell::from(header_label(state, column)).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let visible = state.visible_rows();
    let body_height = usize::from(area.height.saturating_sub(3));
    let start_row = row_window_start(view_data.cursor_row, body_height);
    let rows = visible
        .iter()
        .enumerate()
        .skip(start_row)
        .take(body_height)
        .filter_map(|(position, index)| {
            let record = dataset.records.get(*index)?;
            let selected_row = position == view_data.cursor_row;
            let cells = columns
                .iter()
                .enumerate()
                .map(|(offset, column)| {
                    let mut style = Style::default();
                    if selected_row {
                        style = style.bg(Color::DarkGray);
                    }
                    if selected_row && start_col + offset == view_data.cursor_col {
                        style = Style::default()
                            .fg(Color::Black)
                            .bg(match state.mode {
                                AppMode::Nav => Color::Cyan,
                                AppMode::Edit => Color::Yellow,
                            })
                            .add_modifier(Modifier::BOLD);
                    }
                    Cell::from(record.text(column)).style(style)
                })
                .collect::<Vec<_>>();
            Some(Row::new(cells))
        });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(COLUMN_SPACING)
        .block(block);
    frame.render_widget(table, area);
}

fn header_label(state: &AppState, column: &str) -> String {
    let mut label = column_label(column);
    if let Some(indicator) = state.sort.indicator(column) {
        label.push(' ');
        label.push_str(&indicator);
    }
    if state.filter.is_active(column, &state.candidates) {
        label.push(' ');
        label.push_str(FILTER_MARK_ACTIVE);
    }
    label
}

fn table_title(state: &AppState) -> String {
    let label = state.active.label();
    let Some(dataset) = &state.dataset else {
        return label.to_owned();
    };
    let mut title = format!(
        "{label} · {}/{} rows",
        state.visible_rows().len(),
        dataset.len()
    );
    let filters = state.filter.active_count(&state.candidates);
    if filters > 0 {
        title.push_str(&format!(" · {filters} filtered"));
    }
    match &state.load {
        LoadState::Loading => title.push_str(" · reloading"),
        LoadState::Failed(_) => title.push_str(" · stale"),
        LoadState::Idle | LoadState::Loaded => {}
    }
    title
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if let Some(query) = &view_data.search_input {
        let summary = state.status_line.as_deref().unwrap_or_default();
        return format!("/{query}▏ {summary} | enter keep | esc clear");
    }
    let mode = match state.mode {
        AppMode::Nav => "NAV",
        AppMode::Edit => "EDIT",
    };
    let hints = match state.surface() {
        Some(Surface::Form(_)) => {
            "↑/↓ field | ←/→ choose | ctrl+n add row | del drop row | ctrl+g new genre | enter save | esc cancel"
        }
        Some(Surface::Genre) => "enter create | esc back to form",
        Some(Surface::Editor) => "enter save | esc cancel",
        Some(Surface::Delete(_)) => "↑/↓ field | ←/→ choose | enter review | esc cancel",
        None if view_data.picker.is_some() => "space toggle | a all | x clear | esc close",
        None if view_data.menu.is_some() => "↑/↓ | enter open | 1-9 pick | esc close",
        None => {
            "tab table | hjkl move | s/S sort c clear | f filter F clear | / search | </> width | e edit | a add d delete | r reload | ctrl+q"
        }
    };
    let mode = if state.is_busy() {
        format!("{mode} · saving…")
    } else {
        mode.to_owned()
    };
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn render_form_overlay_text(form: &FormSession, form_slot: usize) -> String {
    let config = form.config();
    let slots = form_slots(&config);
    let focused = slots.get(form_slot.min(slots.len().saturating_sub(1))).copied();
    let marker = |slot: FormSlot| if focused == Some(slot) { ">" } else { " " };

    let mut lines = Vec::new();
    for (index, field) in config.fields.iter().enumerate() {
        let required = if field.spec.required { "*" } else { "" };
        if field.spec.is_multi() {
            lines.push(format!("  {}{required}", field.spec.label));
            for (row_index, row) in field.rows.iter().enumerate() {
                let shown = row
                    .value
                    .as_deref()
                    .map_or(EMPTY_CHOICE, |value| option_label(&row.options, value));
                lines.push(format!(
                    "{}   {}. {shown}",
                    marker(FormSlot::Row(index, row_index)),
                    row_index + 1
                ));
            }
            if field.can_append {
                lines.push("    ctrl+n adds another".to_owned());
            }
        } else {
            let shown = match field.spec.kind {
                FieldKind::Select if field.value.is_empty() => EMPTY_CHOICE.to_owned(),
                FieldKind::Select => field
                    .selected_label()
                    .unwrap_or(field.value.as_str())
                    .to_owned(),
                _ => field.value.clone(),
            };
            let locked = if field.enabled { "" } else { " (locked)" };
            lines.push(format!(
                "{} {}{required}: {shown}{locked}",
                marker(FormSlot::Field(index)),
                field.spec.label
            ));
        }
        if let Some(note) = &field.note {
            lines.push(format!("    {note}"));
        }
    }
    if form.can_create_option() {
        lines.push(String::new());
        lines.push("ctrl+g creates a genre without leaving the form".to_owned());
    }
    if let Some(error) = &form.error {
        lines.push(String::new());
        lines.push(format!("! {error}"));
    }
    lines.join("\n")
}

fn render_genre_overlay_text(form: &FormSession) -> String {
    let mut text = format!("Name: {}", form.genre_draft().unwrap_or_default());
    if let Some(error) = &form.error {
        text.push_str(&format!("\n\n! {error}"));
    }
    text
}

fn render_editor_overlay_text(editor: &EditDraft) -> String {
    let mut lines = vec![
        format!("{} · {}", editor.table().label(), column_label(editor.column())),
        format!("> {}", editor.input()),
    ];
    if let Some(warning) = editor.warning() {
        lines.push(String::new());
        lines.push(format!("! {warning}"));
    }
    if let Some(error) = &editor.error {
        lines.push(String::new());
        lines.push(format!("! {error}"));
    }
    lines.join("\n")
}

fn render_delete_overlay_text(deletion: &DeleteDraft, delete_field: usize) -> String {
    if let Some(question) = deletion.confirmation_text() {
        return format!("{question}\n\ny confirm | n back");
    }
    let fields = deletion.fields();
    let focused = delete_field.min(fields.len().saturating_sub(1));
    let mut lines = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let marker = if index == focused { ">" } else { " " };
        let shown = match field.field.input {
            DeleteInput::Select(..) if field.value.is_empty() => EMPTY_CHOICE,
            DeleteInput::Select(..) => option_label(&field.options, &field.value),
            DeleteInput::Number | DeleteInput::Text => field.value.as_str(),
        };
        lines.push(format!("{marker} {}: {shown}", field.field.label));
        if let Some(note) = deletion.note(field.field.name) {
            lines.push(format!("    {note}"));
        }
    }
    if let Some(error) = &deletion.error {
        lines.push(String::new());
        lines.push(format!("! {error}"));
    }
    lines.join("\n")
}

fn render_menu_overlay_text(menu: MenuUiState) -> String {
    menu.kind
        .labels()
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let marker = if index == menu.cursor { ">" } else { " " };
            format!("{marker} {}. {label}", index + 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_picker_overlay_text(state: &AppState, picker: &FilterPickerUiState) -> String {
    let selected = state.filter.selected(&picker.column);
    let summary = match selected {
        Some(values) if state.filter.is_active(&picker.column, &state.candidates) => {
            format!("{} selected", values.len())
        }
        _ => "all rows".to_owned(),
    };
    let mut lines = vec![summary, String::new()];
    for (index, value) in state.candidates.values(&picker.column).iter().enumerate() {
        let marker = if index == picker.cursor { ">" } else { " " };
        let checked = if selected.is_some_and(|values| values.contains(value)) {
            "[x]"
        } else {
            "[ ]"
        };
        lines.push(format!("{marker} {checked} {value}"));
    }
    lines.join("\n")
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, FILTER_MARK_ACTIVE, InternalEvent, MenuKind, TableGeometry, ViewData,
        fitted_columns, handle_key_event, handle_mouse_event, header_label,
        process_internal_events, render_delete_overlay_text, render_form_overlay_text,
        render_picker_overlay_text, row_window_start, status_text, table_title,
    };
    use crossterm::event::{
        KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    };
    use katalog_app::{
        AppCommand, AppMode, AppState, DatasetKind, DeleteKind, DeleteStage, FetchRequest,
        FormKind, LoadState, LookupKind, Record, RemoteError, Surface, WriteFailure, WriteMethod,
        WriteRequest,
    };
    use katalog_testkit::{
        sample_available_books, sample_books, sample_libraries, sample_readers,
    };
    use ratatui::layout::Rect;
    use serde_json::json;
    use std::sync::mpsc;

    #[derive(Debug, Default)]
    struct TestRuntime {
        loads: Vec<DatasetKind>,
        writes: Vec<WriteRequest>,
        write_error: Option<String>,
        load_error: Option<String>,
    }

    impl AppRuntime for TestRuntime {
        fn load_dataset(&mut self, kind: DatasetKind) -> Result<Vec<Record>, RemoteError> {
            self.loads.push(kind);
            if let Some(message) = &self.load_error {
                return Err(RemoteError::transport(message.clone()));
            }
            Ok(match kind {
                DatasetKind::Books => sample_books(),
                DatasetKind::Libraries => sample_libraries(),
                DatasetKind::Readers => sample_readers(),
                _ => Vec::new(),
            })
        }

        fn load_lookup(&mut self, kind: LookupKind) -> Result<Vec<Record>, RemoteError> {
            Ok(match kind {
                LookupKind::Libraries => sample_libraries(),
                LookupKind::Books => sample_books(),
                LookupKind::Readers => sample_readers(),
                LookupKind::AvailableBooks => sample_available_books(),
                _ => Vec::new(),
            })
        }

        fn write(&mut self, writes: &[WriteRequest]) -> Result<usize, WriteFailure> {
            if let Some(message) = &self.write_error {
                return Err(WriteFailure::new(
                    0,
                    RemoteError::new(Some(400), message.clone()),
                ));
            }
            self.writes.extend_from_slice(writes);
            Ok(writes.len())
        }
    }

    fn view_data_for_test() -> ViewData {
        ViewData {
            screen: Rect::new(0, 0, 120, 40),
            ..ViewData::default()
        }
    }

    fn internal_channel() -> (
        mpsc::Sender<InternalEvent>,
        mpsc::Receiver<InternalEvent>,
    ) {
        mpsc::channel()
    }

    fn press(
        state: &mut AppState,
        runtime: &mut TestRuntime,
        view_data: &mut ViewData,
        tx: &mpsc::Sender<InternalEvent>,
        code: KeyCode,
    ) -> bool {
        handle_key_event(
            state,
            runtime,
            view_data,
            tx,
            KeyEvent::new(code, KeyModifiers::NONE),
        )
    }

    fn type_text(
        state: &mut AppState,
        runtime: &mut TestRuntime,
        view_data: &mut ViewData,
        tx: &mpsc::Sender<InternalEvent>,
        text: &str,
    ) {
        for ch in text.chars() {
            press(state, runtime, view_data, tx, KeyCode::Char(ch));
        }
    }

    fn loaded_books(runtime: &mut TestRuntime) -> AppState {
        let mut state = AppState::default();
        state.dispatch(AppCommand::Reload);
        let request: FetchRequest = state.pending_fetch().expect("fetch pending");
        let records = runtime
            .load_dataset(request.kind)
            .expect("books should load");
        state.dispatch(AppCommand::DatasetLoaded { request, records });
        state
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16, modifiers: KeyModifiers) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers,
        }
    }

    #[test]
    fn ctrl_q_quits_from_any_surface() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, _rx) = internal_channel();
        state.dispatch(AppCommand::OpenForm(FormKind::Reader));

        let quit = handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL),
        );
        assert!(quit);
    }

    #[test]
    fn tab_switches_table_and_fetches_it() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, _rx) = internal_channel();
        view_data.cursor_row = 1;

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Tab);
        assert_eq!(state.active, DatasetKind::Genres);
        assert_eq!(runtime.loads.last(), Some(&DatasetKind::Genres));
        assert_eq!(view_data.cursor_row, 0);

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::BackTab);
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::BackTab);
        assert_eq!(state.active, DatasetKind::BookTopicsDetailed);
    }

    #[test]
    fn sort_keys_act_on_the_cursor_column() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, _rx) = internal_channel();

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('l'));
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('s'));
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('s'));
        assert_eq!(header_label(&state, "author"), "Author ↓");

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('h'));
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('S'));
        assert_eq!(state.sort.keys().len(), 2);
        assert_eq!(header_label(&state, "title"), "Name ↑₂");

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('c'));
        assert!(state.sort.is_empty());
    }

    #[test]
    fn filter_picker_toggles_values_and_marks_header() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, _rx) = internal_channel();

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('l'));
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('f'));
        assert!(view_data.picker.is_some());
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char(' '));
        assert_eq!(state.visible_rows().len(), 1);
        assert!(header_label(&state, "author").ends_with(FILTER_MARK_ACTIVE));

        let picker = view_data.picker.clone().expect("picker stays open");
        let text = render_picker_overlay_text(&state, &picker);
        assert!(text.starts_with("1 selected"));
        assert!(text.contains("[x] Иванов"));

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('a'));
        assert!(!state.filter.is_active("author", &state.candidates));
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Esc);
        assert!(view_data.picker.is_none());
        assert_eq!(state.visible_rows().len(), 2);
    }

    #[test]
    fn search_prompt_filters_live_and_escape_clears() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, _rx) = internal_channel();

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('/'));
        type_text(&mut state, &mut runtime, &mut view_data, &tx, "сид");
        assert_eq!(state.visible_rows().len(), 1);
        assert!(status_text(&state, &view_data).contains("1 of 2 rows match"));
        assert_eq!(table_title(&state), "books · 1/2 rows");

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Esc);
        assert!(view_data.search_input.is_none());
        assert_eq!(state.search, "");
        assert_eq!(state.visible_rows().len(), 2);
    }

    #[test]
    fn nudge_keys_resize_without_touching_sort() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, _rx) = internal_channel();

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('>'));
        assert_eq!(state.layout.width("title"), 20);
        for _ in 0..10 {
            press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('<'));
        }
        assert_eq!(state.layout.width("title"), state.layout.min_width());
        assert!(state.sort.is_empty());
    }

    #[test]
    fn header_click_sorts_and_shift_accumulates() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let geometry = TableGeometry::new(view_data.screen);

        handle_mouse_event(
            &mut state,
            &mut view_data,
            mouse(
                MouseEventKind::Down(MouseButton::Left),
                geometry.origin_x + 2,
                geometry.header_y,
                KeyModifiers::NONE,
            ),
        );
        handle_mouse_event(
            &mut state,
            &mut view_data,
            mouse(
                MouseEventKind::Down(MouseButton::Left),
                geometry.origin_x + 20,
                geometry.header_y,
                KeyModifiers::SHIFT,
            ),
        );
        let fields = state
            .sort
            .keys()
            .iter()
            .map(|key| key.field.as_str())
            .collect::<Vec<_>>();
        assert_eq!(fields, vec!["title", "author"]);
        assert_eq!(view_data.cursor_col, 1);
    }

    #[test]
    fn separator_drag_resizes_and_never_sorts() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let geometry = TableGeometry::new(view_data.screen);
        let handle_x = geometry.origin_x + 18;

        handle_mouse_event(
            &mut state,
            &mut view_data,
            mouse(
                MouseEventKind::Down(MouseButton::Left),
                handle_x,
                geometry.header_y,
                KeyModifiers::NONE,
            ),
        );
        assert!(state.sort.is_empty());
        assert!(state.layout.is_resizing());

        handle_mouse_event(
            &mut state,
            &mut view_data,
            mouse(
                MouseEventKind::Drag(MouseButton::Left),
                handle_x + 6,
                geometry.header_y,
                KeyModifiers::NONE,
            ),
        );
        handle_mouse_event(
            &mut state,
            &mut view_data,
            mouse(
                MouseEventKind::Up(MouseButton::Left),
                handle_x + 6,
                geometry.header_y,
                KeyModifiers::NONE,
            ),
        );
        assert_eq!(state.layout.width("title"), 24);
        assert!(!state.layout.is_resizing());

        handle_mouse_event(
            &mut state,
            &mut view_data,
            mouse(
                MouseEventKind::Drag(MouseButton::Left),
                handle_x + 30,
                geometry.header_y,
                KeyModifiers::NONE,
            ),
        );
        assert_eq!(state.layout.width("title"), 24);
    }

    #[test]
    fn body_click_moves_the_cursor() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let geometry = TableGeometry::new(view_data.screen);

        handle_mouse_event(
            &mut state,
            &mut view_data,
            mouse(
                MouseEventKind::Down(MouseButton::Left),
                geometry.origin_x + 20,
                geometry.body_y + 1,
                KeyModifiers::NONE,
            ),
        );
        assert_eq!(view_data.cursor_row, 1);
        assert_eq!(view_data.cursor_col, 1);
        assert!(state.sort.is_empty());
    }

    #[test]
    fn menu_opens_form_and_typing_fills_text_fields() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, rx) = internal_channel();

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('a'));
        assert_eq!(
            view_data.menu.map(|menu| menu.kind),
            Some(MenuKind::Add)
        );
        let reader_choice = FormKind::ALL
            .iter()
            .position(|kind| *kind == FormKind::Reader)
            .expect("reader form listed");
        for _ in 0..reader_choice {
            press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Down);
        }
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);
        assert_eq!(state.surface(), Some(Surface::Form(FormKind::Reader)));
        assert!(view_data.menu.is_none());

        type_text(&mut state, &mut runtime, &mut view_data, &tx, "Петров");
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Down);
        type_text(&mut state, &mut runtime, &mut view_data, &tx, "12");
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Down);
        type_text(&mut state, &mut runtime, &mut view_data, &tx, "Омск");
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Backspace);
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);
        assert!(status_text(&state, &view_data).starts_with("NAV · saving…"));
        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);

        assert_eq!(runtime.writes.len(), 1);
        assert_eq!(runtime.writes[0].method, WriteMethod::Post);
        assert_eq!(runtime.writes[0].describe(), "POST /add/reader");
        assert_eq!(
            runtime.writes[0].body,
            Some(json!({"full_name": "Петров", "phone": "12", "address": "Омс"}))
        );
        assert!(state.form.is_none());
        assert!(!state.is_busy());
        assert_eq!(runtime.loads.last(), Some(&DatasetKind::Books));
        assert_eq!(state.load, LoadState::Loaded);
    }

    #[test]
    fn rejected_write_keeps_form_input() {
        let mut runtime = TestRuntime {
            write_error: Some("Читатель уже существует".to_owned()),
            ..TestRuntime::default()
        };
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, rx) = internal_channel();
        state.dispatch(AppCommand::OpenForm(FormKind::Reader));

        for text in ["Петров", "12", "Омск"] {
            type_text(&mut state, &mut runtime, &mut view_data, &tx, text);
            press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Down);
        }
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);
        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);

        let form = state.form.as_ref().expect("form stays open");
        assert_eq!(form.value("full_name"), "Петров");
        assert_eq!(form.error.as_deref(), Some("Читатель уже существует"));
        let text = render_form_overlay_text(form, view_data.form_slot);
        assert!(text.contains("! Читатель уже существует"));
    }

    #[test]
    fn loan_form_selects_cascade_through_lookups() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, rx) = internal_channel();

        let events = state.dispatch(AppCommand::OpenForm(FormKind::Loan));
        super::apply_events(&mut state, &mut runtime, &mut view_data, &tx, events);
        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);

        let before = render_form_overlay_text(state.form.as_ref().expect("form"), 0);
        assert!(before.contains("choose Library first"));

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Right);
        let form = state.form.as_ref().expect("form");
        assert_eq!(form.value("library_id"), "1");
        let after = render_form_overlay_text(form, 0);
        assert!(after.contains("> Library*: Central"));
        assert!(!after.contains("choose Library first"));
    }

    #[test]
    fn delete_dialog_reviews_then_confirms() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, rx) = internal_channel();

        state.dispatch(AppCommand::OpenDelete(DeleteKind::Book));
        type_text(&mut state, &mut runtime, &mut view_data, &tx, "1x");
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Down);
        type_text(&mut state, &mut runtime, &mut view_data, &tx, "5");
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);

        let deletion = state.deletion.as_ref().expect("dialog");
        assert_eq!(deletion.stage(), DeleteStage::Confirming);
        let text = render_delete_overlay_text(deletion, view_data.delete_field);
        assert!(text.contains("This cannot be undone."));

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('n'));
        assert_eq!(
            state.deletion.as_ref().map(|deletion| deletion.stage()),
            Some(DeleteStage::Editing)
        );
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('y'));
        assert!(state.deletion.is_some());
        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);

        assert_eq!(runtime.writes.len(), 1);
        assert_eq!(runtime.writes[0].describe(), "DELETE /delete/book/1/5");
        assert!(state.deletion.is_none());
    }

    #[test]
    fn editor_opens_only_in_edit_mode_and_locks_identifiers() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, _rx) = internal_channel();

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);
        assert!(state.editor.is_none());

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('e'));
        assert_eq!(state.mode, AppMode::Edit);
        view_data.cursor_col = 2;
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);
        assert_eq!(state.surface(), Some(Surface::Editor));
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('9'));
        assert_eq!(state.editor.as_ref().map(|editor| editor.input()), Some("1"));
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);
        assert!(runtime.writes.is_empty());
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Esc);

        view_data.cursor_col = 0;
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Backspace);
        type_text(&mut state, &mut runtime, &mut view_data, &tx, "Z");
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Enter);
        assert_eq!(runtime.writes.len(), 1);
        assert_eq!(
            runtime.writes[0].body,
            Some(json!({"column": "title", "value": "Z", "rowData": {"library_id": 1, "book_id": 1}}))
        );
    }

    #[test]
    fn failed_reload_keeps_rows_and_marks_title() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, rx) = internal_channel();
        runtime.load_error = Some("cannot reach http://127.0.0.1:5000".to_owned());

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('r'));
        assert_eq!(table_title(&state), "books · 2/2 rows · reloading");
        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);
        assert_eq!(state.visible_rows().len(), 2);
        assert!(matches!(state.load, LoadState::Failed(_)));
        assert_eq!(table_title(&state), "books · 2/2 rows · stale");
    }

    #[test]
    fn fetch_for_a_table_switched_away_from_is_dropped() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, rx) = internal_channel();

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Tab);
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Tab);
        assert_eq!(
            runtime.loads,
            vec![DatasetKind::Books, DatasetKind::Genres, DatasetKind::Libraries]
        );
        assert!(state.dataset.is_none());

        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);
        assert_eq!(state.active, DatasetKind::Libraries);
        let dataset = state.dataset.as_ref().expect("libraries loaded");
        assert_eq!(dataset.kind, DatasetKind::Libraries);
        assert_eq!(dataset.len(), sample_libraries().len());
        assert_eq!(state.load, LoadState::Loaded);
    }

    #[test]
    fn stale_status_tokens_are_ignored() {
        let mut runtime = TestRuntime::default();
        let mut state = loaded_books(&mut runtime);
        let mut view_data = view_data_for_test();
        let (tx, rx) = internal_channel();

        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('c'));
        press(&mut state, &mut runtime, &mut view_data, &tx, KeyCode::Char('F'));
        assert_eq!(view_data.status_token, 2);

        tx.send(InternalEvent::ClearStatus { token: 1 })
            .expect("send should work");
        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);
        assert_eq!(state.status_line.as_deref(), Some("filters cleared"));

        tx.send(InternalEvent::ClearStatus { token: 2 })
            .expect("send should work");
        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);
        assert!(state.status_line.is_none());
    }

    #[test]
    fn columns_fit_the_available_width() {
        let mut runtime = TestRuntime::default();
        let state = loaded_books(&mut runtime);
        assert_eq!(fitted_columns(&state, 0, 37), 2);
        assert_eq!(fitted_columns(&state, 0, 36), 1);
        assert_eq!(fitted_columns(&state, 0, 4), 1);
        assert_eq!(row_window_start(15, 10), 6);
        assert_eq!(row_window_start(3, 10), 0);
    }
}
