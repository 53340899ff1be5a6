// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error as ThisError;

/// Rejected before any request is built. Always recoverable by fixing the
/// listed fields and submitting again.
#[derive(Debug, Clone, Default, PartialEq, Eq, ThisError)]
#[error("{}", summarize(.missing, .invalid))]
pub struct LocalValidationError {
    pub missing: Vec<String>,
    pub invalid: Vec<String>,
}

impl LocalValidationError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

fn summarize(missing: &[String], invalid: &[String]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("fill in required fields: {}", missing.join(", ")));
    }
    if !invalid.is_empty() {
        parts.push(format!("fix invalid fields: {}", invalid.join(", ")));
    }
    parts.join("; ")
}

/// A non-2xx response or a transport failure. Displays the server's
/// message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

/// A write batch that stopped at a rejected request. The first `applied`
/// writes were accepted and are not rolled back.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{error}")]
pub struct WriteFailure {
    pub applied: usize,
    pub error: RemoteError,
}

impl WriteFailure {
    pub fn new(applied: usize, error: RemoteError) -> Self {
        Self { applied, error }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] LocalValidationError),
    #[error("availability check still running -- wait for it and retry")]
    AvailabilityPending,
    #[error("no copies of this book are available in the selected library")]
    NoAvailableCopies,
    #[error("{0} could not be loaded -- close the form and retry")]
    Incomplete(String),
}

/// Input a form or dialog refused to take.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum FormInputError {
    #[error("unknown field {0}")]
    UnknownField(String),
    #[error("{0} is disabled until its prerequisites are chosen")]
    Disabled(String),
    #[error("{value:?} is not an option for {field}")]
    NotAnOption { field: String, value: String },
    #[error("{value:?} is already chosen in another row of {field}")]
    DuplicateChoice { field: String, value: String },
    #[error("{field} has no row {index}")]
    RowOutOfRange { field: String, index: usize },
    #[error("choose a value in the last row of {0} before adding another")]
    TrailingRowEmpty(String),
    #[error("{0} takes a single value")]
    NotMultiValued(String),
    #[error("{0} takes one value per row")]
    MultiValued(String),
}
