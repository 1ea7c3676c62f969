//! Core data model.
//!
//! A record is one line of input split into fields. A work item is a record
//! that has been assigned to a worker, plus whether it has been shipped yet.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One raw input record. The coordinator never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record(pub Vec<String>);

impl Record {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    /// Split a line on `delimiter` into a record.
    pub fn parse(line: &str, delimiter: char) -> Self {
        Self(line.split(delimiter).map(str::to_string).collect())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// First field, used as a short label in logs and results.
    pub fn key(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A record sitting in a worker's queue.
///
/// `working` flips to true when the item is shipped to its worker and never
/// flips back; a finished item is removed from the queue instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub record: Record,
    pub working: bool,
}

impl WorkItem {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            working: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.working
    }
}

// ---------------------------------------------------------------------------
// Worker identity
// ---------------------------------------------------------------------------

/// Opaque, stable identity of a worker. Holding one does not imply owning
/// any connection to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A message the coordinator hands to the transport for one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// One-time payload sent when a worker registers.
    Welcome { data: serde_json::Value },
    /// A bundle of records the worker should now process.
    Chunk { records: Vec<Record> },
}
