//! Immutable audit records of synchronization runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one synchronization run, appended to a configuration's history.
/// Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
    /// Number of rows fetched from the source; unset when the run aborted
    /// before fetching completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_records: Option<u64>,
    /// One entry per distinct `(kind, message)` class, not one per record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ExecutionError>,
    /// User who requested a manual run; absent for scheduled runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<Uuid>,
}

/// Aggregate run status derived from the final counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every record processed cleanly (`failed == 0`).
    Success,
    /// At least one record failed but the run processed the batch.
    Partial,
    /// The run aborted before processing any records.
    Error,
}

impl ExecutionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Partial => "partial",
            ExecutionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aggregated error class encountered during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    /// Number of records that hit this `(kind, message)` class.
    pub count: u64,
    /// Sample record identifiers, capped at a small fixed number.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// Uniform error taxonomy for run outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Target store rejected the record's shape or constraints.
    Validation,
    /// Uniqueness violation on insert.
    Duplicate,
    /// Mandatory key field absent before any store call.
    Required,
    /// Transformation or parsing failure.
    Processing,
    /// Connectivity or infrastructure failure, including fetch failures
    /// and timeouts.
    System,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Required => "required",
            ErrorKind::Processing => "processing",
            ErrorKind::System => "system",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
