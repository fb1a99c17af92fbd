//! Shared error surface for the sync engine.
//!
//! Row-level and field-level failures are always recovered locally and folded
//! into the aggregated error list of a run's [`ExecutionLog`]; the only error
//! a caller of `execute` ever sees is the per-configuration busy rejection.

use thiserror::Error;
use uuid::Uuid;

use crate::model::{ErrorKind, ExecutionError};

/// Default cap on sample record identifiers kept per error class.
pub const DEFAULT_ERROR_EXAMPLE_LIMIT: usize = 5;

/// Errors surfaced to direct callers of `SyncExecutor::execute`.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// A run for this configuration is already in flight; the trigger is
    /// skipped, not queued.
    #[error("a run for configuration {config_id} is already in progress")]
    AlreadyRunning { config_id: Uuid },
}

/// Groups run errors by `(kind, message)` with a running count and a bounded
/// list of example record identifiers, so large batches cannot blow up the
/// execution log.
#[derive(Debug)]
pub struct ErrorAggregator {
    example_limit: usize,
    groups: Vec<ExecutionError>,
}

impl ErrorAggregator {
    pub fn new(example_limit: usize) -> Self {
        Self {
            example_limit: example_limit.max(1),
            groups: Vec::new(),
        }
    }

    /// Record one failed record under the given class.
    ///
    /// Insertion order of first occurrence is preserved, which keeps example
    /// selection deterministic for a given batch order.
    pub fn record<M: Into<String>>(&mut self, kind: ErrorKind, message: M, example: Option<&str>) {
        let message = message.into();
        let group = match self
            .groups
            .iter_mut()
            .find(|g| g.kind == kind && g.message == message)
        {
            Some(existing) => existing,
            None => {
                self.groups.push(ExecutionError {
                    kind,
                    message,
                    count: 0,
                    examples: Vec::new(),
                });
                self.groups.last_mut().expect("group just pushed")
            }
        };

        group.count += 1;
        if let Some(example) = example
            && group.examples.len() < self.example_limit
        {
            group.examples.push(example.to_string());
        }
    }

    /// Total number of failed records recorded so far.
    pub fn total(&self) -> u64 {
        self.groups.iter().map(|g| g.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Consume the aggregator into the execution-log error list.
    pub fn into_errors(self) -> Vec<ExecutionError> {
        self.groups
    }
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_EXAMPLE_LIMIT)
    }
}
