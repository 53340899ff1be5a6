// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::collate::CollationKey;
use crate::{Dataset, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub const fn arrow(self) -> &'static str {
        match self {
            Self::Asc => "↑",
            Self::Desc => "↓",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_owned(),
            direction: SortDirection::Asc,
        }
    }
}

/// Ordered sort descriptors, primary first. Empty keeps input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Plain header activation: flips a lone descriptor on the same field,
    /// otherwise replaces everything with one ascending descriptor.
    pub fn activate(&mut self, field: &str) {
        if let [only] = self.keys.as_mut_slice()
            && only.field == field
        {
            only.direction = only.direction.toggled();
            return;
        }
        self.keys = vec![SortKey::asc(field)];
    }

    /// Accumulating activation: flips the field's descriptor in place or
    /// appends a new ascending one. Other descriptors are untouched.
    pub fn activate_accumulating(&mut self, field: &str) {
        match self.keys.iter_mut().find(|key| key.field == field) {
            Some(key) => key.direction = key.direction.toggled(),
            None => self.keys.push(SortKey::asc(field)),
        }
    }

    /// Drops descriptors for columns the dataset no longer has. Returns
    /// true when anything was removed.
    pub fn retain_columns(&mut self, columns: &[String]) -> bool {
        let before = self.keys.len();
        self.keys
            .retain(|key| columns.iter().any(|column| *column == key.field));
        self.keys.len() != before
    }

    /// Header marker for a column: arrow, plus a priority subscript when
    /// more than one descriptor is active.
    pub fn indicator(&self, field: &str) -> Option<String> {
        let position = self.keys.iter().position(|key| key.field == field)?;
        let arrow = self.keys[position].direction.arrow();
        if self.keys.len() == 1 {
            return Some(arrow.to_owned());
        }
        Some(format!("{arrow}{}", subscript(position + 1)))
    }

    /// Sort keys for one record, one per descriptor.
    fn cell_keys(&self, record: &Record) -> Vec<CellKey> {
        self.keys
            .iter()
            .map(|key| CellKey::new(&key.field, &record.text(&key.field)))
            .collect()
    }

    fn compare_keys(&self, left: &[CellKey], right: &[CellKey]) -> Ordering {
        for (key, (left, right)) in self.keys.iter().zip(left.iter().zip(right)) {
            let ordering = left.cmp(right);
            if ordering != Ordering::Equal {
                return key.direction.apply(ordering);
            }
        }
        Ordering::Equal
    }

}

fn subscript(value: usize) -> String {
    value
        .to_string()
        .chars()
        .map(|digit| match digit {
            '0' => '₀',
            '1' => '₁',
            '2' => '₂',
            '3' => '₃',
            '4' => '₄',
            '5' => '₅',
            '6' => '₆',
            '7' => '₇',
            '8' => '₈',
            _ => '₉',
        })
        .collect()
}

/// Sort key of one cell. Each cell is classified on its own, so a column
/// mixing numbers, dates and text still orders totally: empty cells first,
/// then numbers, then dates (date columns only), then collated text.
#[derive(Debug, Clone)]
pub enum CellKey {
    Empty,
    Number(f64),
    Date(OffsetDateTime),
    Text(CollationKey),
}

impl CellKey {
    pub fn new(field: &str, text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::Empty;
        }
        if let Some(number) = parse_number(text) {
            return Self::Number(number);
        }
        if is_date_field(field)
            && let Some(moment) = parse_date(text)
        {
            return Self::Date(moment);
        }
        Self::Text(CollationKey::new(text))
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Number(_) => 1,
            Self::Date(_) => 2,
            Self::Text(_) => 3,
        }
    }
}

impl Ord for CellKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(left), Self::Number(right)) => left.total_cmp(right),
            (Self::Date(left), Self::Date(right)) => left.cmp(right),
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for CellKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CellKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CellKey {}

/// Natural order of two cells of one column: numeric between numbers,
/// chronological between dates of a date column, collated between text.
pub fn compare_cells(field: &str, left: &str, right: &str) -> Ordering {
    CellKey::new(field, left).cmp(&CellKey::new(field, right))
}

pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

pub fn is_date_field(field: &str) -> bool {
    field.to_lowercase().contains("date")
}

pub fn parse_date(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if let Ok(date) = Date::parse(text, format_description!("[year]-[month]-[day]")) {
        return Some(date.midnight().assume_utc());
    }
    if let Ok(moment) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(moment);
    }
    // The backend's JSON encoder writes RFC 2822 with a "GMT" zone name.
    let normalized = match text.strip_suffix(" GMT") {
        Some(head) => format!("{head} +0000"),
        None => text.to_owned(),
    };
    OffsetDateTime::parse(&normalized, &Rfc2822).ok()
}

/// Stable sort of row indices by the active sort keys. Keys are built once
/// per row.
pub fn sort_rows(records: &[Record], spec: &SortSpec, rows: &mut [usize]) {
    if spec.is_empty() {
        return;
    }
    let mut keyed: Vec<(Vec<CellKey>, usize)> = rows
        .iter()
        .map(|row| (spec.cell_keys(&records[*row]), *row))
        .collect();
    keyed.sort_by(|(left, _), (right, _)| spec.compare_keys(left, right));
    for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
        *slot = row;
    }
}

pub fn sorted<'a>(records: &'a [Record], spec: &SortSpec) -> Vec<&'a Record> {
    let mut rows: Vec<usize> = (0..records.len()).collect();
    sort_rows(records, spec, &mut rows);
    rows.into_iter().map(|row| &records[row]).collect()
}

/// Distinct non-empty display values per column, taken from the full
/// unsorted dataset and ordered with the column comparator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateIndex {
    columns: BTreeMap<String, Vec<String>>,
}

impl CandidateIndex {
    pub fn build(dataset: &Dataset) -> Self {
        let columns = dataset
            .columns
            .iter()
            .map(|column| {
                let distinct: BTreeSet<String> = dataset
                    .records
                    .iter()
                    .map(|record| record.text(column))
                    .filter(|value| !value.is_empty())
                    .collect();
                let mut values: Vec<String> = distinct.into_iter().collect();
                values.sort_by_cached_key(|value| CellKey::new(column, value));
                (column.clone(), values)
            })
            .collect();
        Self { columns }
    }

    pub fn values(&self, column: &str) -> &[String] {
        self.columns.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when `selected` covers every candidate of the column.
    pub fn is_saturated(&self, column: &str, selected: &BTreeSet<String>) -> bool {
        let values = self.values(column);
        values.iter().all(|value| selected.contains(value))
    }
}

/// Per-column allowed values. An entry is never stored empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    selections: BTreeMap<String, BTreeSet<String>>,
}

impl FilterSpec {
    pub fn selected(&self, column: &str) -> Option<&BTreeSet<String>> {
        self.selections.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.selections.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// A filter covering every candidate restricts nothing.
    pub fn is_active(&self, column: &str, candidates: &CandidateIndex) -> bool {
        self.selections
            .get(column)
            .is_some_and(|selected| !candidates.is_saturated(column, selected))
    }

    pub fn active_count(&self, candidates: &CandidateIndex) -> usize {
        self.selections
            .keys()
            .filter(|column| self.is_active(column, candidates))
            .count()
    }

    pub fn toggle_value(&mut self, column: &str, value: &str) {
        let selected = self.selections.entry(column.to_owned()).or_default();
        if !selected.remove(value) {
            selected.insert(value.to_owned());
        }
        if selected.is_empty() {
            self.selections.remove(column);
        }
    }

    /// Switches between the full candidate set and no filter at all.
    pub fn toggle_select_all(&mut self, column: &str, candidates: &CandidateIndex) {
        let saturated = self
            .selections
            .get(column)
            .is_some_and(|selected| candidates.is_saturated(column, selected));
        let values = candidates.values(column);
        if saturated || values.is_empty() {
            self.selections.remove(column);
            return;
        }
        self.selections
            .insert(column.to_owned(), values.iter().cloned().collect());
    }

    pub fn clear_column(&mut self, column: &str) {
        self.selections.remove(column);
    }

    pub fn clear(&mut self) {
        self.selections.clear();
    }

    pub fn retain_columns(&mut self, columns: &[String]) {
        self.selections
            .retain(|name, _| columns.iter().any(|column| column == name));
    }

    /// Keeps only selected values that are still candidates. A column left
    /// with nothing selected stops filtering. Returns true when anything
    /// was removed.
    pub fn retain_candidates(&mut self, candidates: &CandidateIndex) -> bool {
        let mut changed = false;
        self.selections.retain(|column, selected| {
            let values = candidates.values(column);
            let before = selected.len();
            selected.retain(|value| values.contains(value));
            changed |= selected.len() != before;
            !selected.is_empty()
        });
        changed
    }

    pub fn matches(&self, record: &Record, candidates: &CandidateIndex) -> bool {
        self.selections.iter().all(|(column, selected)| {
            candidates.is_saturated(column, selected) || selected.contains(&record.text(column))
        })
    }
}

/// Case-insensitive substring match against every field of the record.
pub fn matches_search(record: &Record, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    record
        .values()
        .any(|value| value.display().to_lowercase().contains(&needle))
}

/// Indices of the rows to render, in display order. Never mutates the
/// dataset.
pub fn visible_rows(
    dataset: &Dataset,
    sort: &SortSpec,
    filter: &FilterSpec,
    candidates: &CandidateIndex,
    search: &str,
) -> Vec<usize> {
    let mut rows: Vec<usize> = dataset
        .records
        .iter()
        .enumerate()
        .filter(|(_, record)| matches_search(record, search) && filter.matches(record, candidates))
        .map(|(index, _)| index)
        .collect();
    sort_rows(&dataset.records, sort, &mut rows);
    rows
}
