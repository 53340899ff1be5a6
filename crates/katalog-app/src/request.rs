// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt;

use serde_json::Value;

use crate::{DatasetKind, LookupKind, Record};

/// Identifies one in-flight lookup. A response is applied only while its
/// ticket is still the one the owning surface is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket {
    pub session: u32,
    pub seq: u32,
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.session, self.seq)
    }
}

/// Hands out tickets for one form or dialog session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketSeq {
    session: u32,
    next: u32,
}

impl TicketSeq {
    pub const fn new(session: u32) -> Self {
        Self { session, next: 0 }
    }

    pub const fn session(&self) -> u32 {
        self.session
    }

    pub fn issue(&mut self) -> Ticket {
        let ticket = Ticket {
            session: self.session,
            seq: self.next,
        };
        self.next = self.next.wrapping_add(1);
        ticket
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupRequest {
    pub ticket: Ticket,
    pub kind: LookupKind,
}

pub type LookupResult = Result<Vec<Record>, String>;

/// Fetch state of one option catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Lookup {
    #[default]
    Idle,
    Loading(Ticket),
    Loaded(Vec<Record>),
    Failed(String),
}

impl Lookup {
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            Self::Loaded(records) => Some(records),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn awaits(&self, ticket: Ticket) -> bool {
        matches!(self, Self::Loading(pending) if *pending == ticket)
    }

    /// Settles a pending fetch. Returns false when the ticket is stale.
    pub fn settle(&mut self, ticket: Ticket, result: LookupResult) -> bool {
        if !self.awaits(ticket) {
            return false;
        }
        *self = match result {
            Ok(records) => Self::Loaded(records),
            Err(message) => Self::Failed(message),
        };
        true
    }
}

/// One wholesale dataset fetch. Only the latest request for the active
/// table is applied when it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub kind: DatasetKind,
    pub seq: u64,
}

/// The writes of one submission, issued in order until the first failure.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub seq: u64,
    pub writes: Vec<WriteRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
    Post,
    Put,
    Delete,
}

impl WriteMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// One mutating call against the backend. Path segments are raw; the
/// gateway percent-encodes each one.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub method: WriteMethod,
    pub path: Vec<String>,
    pub body: Option<Value>,
}

impl WriteRequest {
    pub fn new(method: WriteMethod, path: &[&str], body: Option<Value>) -> Self {
        Self {
            method,
            path: path.iter().map(|segment| (*segment).to_owned()).collect(),
            body,
        }
    }

    pub fn describe(&self) -> String {
        format!("{} /{}", self.method.as_str(), self.path.join("/"))
    }
}
