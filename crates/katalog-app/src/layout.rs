// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;

pub const DEFAULT_COLUMN_WIDTH: u16 = 18;
pub const MIN_COLUMN_WIDTH: u16 = 8;
pub const COLUMN_SPACING: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeGesture {
    pub column: String,
    start_x: u16,
    start_width: u16,
}

/// Where a header press landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderHit {
    Label(usize),
    Separator(usize),
    Outside,
}

/// Per-column widths in terminal cells, plus at most one live resize
/// gesture. Independent of sorting and filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    default_width: u16,
    min_width: u16,
    widths: BTreeMap<String, u16>,
    gesture: Option<ResizeGesture>,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMN_WIDTH, MIN_COLUMN_WIDTH)
    }
}

impl ColumnLayout {
    pub fn new(default_width: u16, min_width: u16) -> Self {
        let min_width = min_width.max(1);
        Self {
            default_width: default_width.max(min_width),
            min_width,
            widths: BTreeMap::new(),
            gesture: None,
        }
    }

    pub const fn min_width(&self) -> u16 {
        self.min_width
    }

    pub fn width(&self, column: &str) -> u16 {
        self.widths
            .get(column)
            .copied()
            .unwrap_or(self.default_width)
    }

    pub fn set_width(&mut self, column: &str, width: u16) {
        self.widths
            .insert(column.to_owned(), width.max(self.min_width));
    }

    pub fn is_resizing(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn gesture(&self) -> Option<&ResizeGesture> {
        self.gesture.as_ref()
    }

    /// Starts a gesture at `pointer_x`. A gesture already in flight is
    /// dropped first.
    pub fn begin_resize(&mut self, column: &str, pointer_x: u16) {
        if self.gesture.is_some() {
            self.abort_resize();
        }
        let start_width = self.width(column).max(self.min_width);
        self.gesture = Some(ResizeGesture {
            column: column.to_owned(),
            start_x: pointer_x,
            start_width,
        });
    }

    /// Applies pointer movement. Returns the new width, or `None` when no
    /// gesture is live.
    pub fn drag_to(&mut self, pointer_x: u16) -> Option<u16> {
        let gesture = self.gesture.as_ref()?;
        let delta = i32::from(pointer_x) - i32::from(gesture.start_x);
        let width = (i32::from(gesture.start_width) + delta)
            .max(i32::from(self.min_width))
            .min(i32::from(u16::MAX));
        let width = u16::try_from(width).unwrap_or(u16::MAX);
        let column = gesture.column.clone();
        self.widths.insert(column, width);
        Some(width)
    }

    /// Finishes the gesture normally. Returns the column it resized.
    pub fn end_resize(&mut self) -> Option<String> {
        self.gesture.take().map(|gesture| gesture.column)
    }

    /// Tears the gesture down on an abnormal exit. Widths already applied
    /// stay. Returns true if a gesture was live.
    pub fn abort_resize(&mut self) -> bool {
        match self.gesture.take() {
            Some(gesture) => {
                log::debug!("resize of {} aborted", gesture.column);
                true
            }
            None => false,
        }
    }

    /// Keyboard resize: a one-step gesture so the same floor applies.
    pub fn nudge(&mut self, column: &str, delta: i16) -> u16 {
        let origin: u16 = 1 << 14;
        self.begin_resize(column, origin);
        let target = (i32::from(origin) + i32::from(delta)).max(0);
        let width = self.drag_to(u16::try_from(target).unwrap_or(0));
        self.end_resize();
        width.unwrap_or_else(|| self.width(column))
    }

    /// Forgets every width and any live gesture.
    pub fn reset(&mut self) {
        self.abort_resize();
        self.widths.clear();
    }

    /// Maps an x offset (relative to the first rendered column) onto the
    /// header. The spacing cell after each column is its resize handle.
    pub fn hit_test(&self, columns: &[String], x: u16) -> HeaderHit {
        let mut start: u32 = 0;
        let x = u32::from(x);
        for (index, column) in columns.iter().enumerate() {
            let end = start + u32::from(self.width(column));
            if x < end {
                return HeaderHit::Label(index);
            }
            if x < end + u32::from(COLUMN_SPACING) {
                return HeaderHit::Separator(index);
            }
            start = end + u32::from(COLUMN_SPACING);
        }
        HeaderHit::Outside
    }
}
