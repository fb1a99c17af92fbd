//! Sync Execution Service
//!
//! Orchestrates one full run of a configuration: fetch source rows, resolve
//! mappings, reconcile against the target store, aggregate counts and
//! categorized errors, and append one execution log to the configuration's
//! history. Runs for the same configuration are mutually exclusive; runs for
//! different configurations proceed fully in parallel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncRunConfig;
use crate::error::{ErrorAggregator, ExecuteError};
use crate::mapping::{self, ResolvedRecord};
use crate::model::{
    ErrorKind, ExecutionError, ExecutionLog, ExecutionStatus, SyncConfiguration,
};
use crate::provider::{ConfigRepository, SourceProvider, SourceRow, TargetStore};
use crate::reconcile::{self, ReconcileParams};

/// Executes synchronization runs against the configured collaborators.
pub struct SyncExecutor {
    repo: Arc<dyn ConfigRepository>,
    source: Arc<dyn SourceProvider>,
    store: Arc<dyn TargetStore>,
    config: SyncRunConfig,
    /// Arena of per-configuration run locks; one entry per configuration id,
    /// so configurations never serialize against each other.
    run_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl SyncExecutor {
    pub fn new(
        repo: Arc<dyn ConfigRepository>,
        source: Arc<dyn SourceProvider>,
        store: Arc<dyn TargetStore>,
        config: SyncRunConfig,
    ) -> Self {
        Self {
            repo,
            source,
            store,
            config,
            run_locks: DashMap::new(),
        }
    }

    /// Execute one run for `config_id`.
    ///
    /// Always resolves to a complete [`ExecutionLog`]; the only caller-facing
    /// error is the busy rejection when a run for the same configuration is
    /// already in flight. Row-level and field-level failures are folded into
    /// the log's aggregated error list.
    #[instrument(skip(self), fields(config_id = %config_id, run_id = %Uuid::new_v4()))]
    pub async fn execute(
        &self,
        config_id: Uuid,
        triggered_by: Option<Uuid>,
    ) -> Result<ExecutionLog, ExecuteError> {
        let lock = self
            .run_locks
            .entry(config_id)
            .or_default()
            .value()
            .clone();
        // Scoped acquisition: the guard is dropped on every exit path below.
        let Ok(_run_guard) = lock.try_lock_owned() else {
            return Err(ExecuteError::AlreadyRunning { config_id });
        };

        let run_timer = std::time::Instant::now();
        let log = self.run(config_id, triggered_by).await;

        let labels = vec![("status", log.status.as_str().to_string())];
        counter!("sync_runs_total", &labels).increment(1);
        histogram!("sync_run_duration_ms").record(run_timer.elapsed().as_secs_f64() * 1_000.0);

        info!(
            status = %log.status,
            inserted = log.inserted,
            updated = log.updated,
            failed = log.failed,
            total_records = log.total_records,
            "Sync run finished"
        );

        Ok(log)
    }

    async fn run(&self, config_id: Uuid, triggered_by: Option<Uuid>) -> ExecutionLog {
        let started_at = Utc::now();

        // A configuration that cannot even be loaded produces an error log
        // for the caller but is never appended to history.
        let config = match self.repo.find(config_id).await {
            Ok(Some(config)) if config.active => config,
            Ok(Some(_)) => {
                warn!("Configuration is inactive; refusing to run");
                return aborted_log(started_at, triggered_by, "configuration is inactive");
            }
            Ok(None) => {
                warn!("Configuration not found");
                return aborted_log(started_at, triggered_by, "configuration not found");
            }
            Err(err) => {
                error!(error = %err, "Failed to load configuration");
                return aborted_log(started_at, triggered_by, err.to_string());
            }
        };

        debug!(name = %config.name, view = %config.source_view, phase = "fetching", "Starting sync run");
        let rows = match self.fetch_rows(&config).await {
            Ok(rows) => rows,
            Err(message) => {
                error!(error = %message, "Source fetch failed; aborting run");
                let log = aborted_log(started_at, triggered_by, message);
                self.persist(config.id, log.clone()).await;
                return log;
            }
        };

        counter!("sync_rows_fetched_total").increment(rows.len() as u64);
        debug!(rows = rows.len(), phase = "mapping", "Fetched source rows");
        let mut errors = ErrorAggregator::new(self.config.error_example_limit);
        let mut failed_rows: u64 = 0;
        let mut mapped: Vec<ResolvedRecord> = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let record = mapping::resolve(row, &config.mappings);
            if record.is_clean() {
                mapped.push(record);
                continue;
            }

            // A row with any field error is counted failed once; the partial
            // record is discarded, not written.
            failed_rows += 1;
            let example = row_identifier(row, &config.source_key_field, index);
            for field_error in &record.errors {
                errors.record(
                    ErrorKind::Processing,
                    field_error.message.clone(),
                    Some(&example),
                );
            }
        }

        debug!(records = mapped.len(), phase = "reconciling", "Resolved mappings");
        let params = ReconcileParams {
            collection: config.target_collection,
            key_field: config.target_key_field.clone(),
            op_timeout: Duration::from_secs(self.config.store_timeout_seconds),
        };
        let counts = reconcile::reconcile(self.store.as_ref(), &params, &mapped, &mut errors).await;

        let failed = failed_rows + counts.failed;
        let status = if failed == 0 {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Partial
        };

        let log = ExecutionLog {
            status,
            started_at,
            finished_at: Utc::now(),
            inserted: counts.inserted,
            updated: counts.updated,
            failed,
            total_records: Some(rows.len() as u64),
            errors: errors.into_errors(),
            triggered_by,
        };

        debug!(phase = "finalized", "Appending execution log");
        self.persist(config.id, log.clone()).await;
        log
    }

    async fn fetch_rows(&self, config: &SyncConfiguration) -> Result<Vec<SourceRow>, String> {
        let timeout = Duration::from_secs(self.config.fetch_timeout_seconds);
        match tokio::time::timeout(
            timeout,
            self.source
                .fetch_rows(&config.source_view, config.filter_clause.as_deref()),
        )
        .await
        {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "source fetch timed out after {}s",
                timeout.as_secs()
            )),
        }
    }

    async fn persist(&self, config_id: Uuid, log: ExecutionLog) {
        // History append failures are an operability problem, not a run
        // failure; the caller still receives the completed log.
        if let Err(err) = self.repo.append_history(config_id, log).await {
            error!(error = %err, "Failed to append execution log to history");
        }
    }
}

/// Log for a run that aborted before processing any records.
fn aborted_log<M: Into<String>>(
    started_at: chrono::DateTime<Utc>,
    triggered_by: Option<Uuid>,
    message: M,
) -> ExecutionLog {
    ExecutionLog {
        status: ExecutionStatus::Error,
        started_at,
        finished_at: Utc::now(),
        inserted: 0,
        updated: 0,
        failed: 0,
        total_records: None,
        errors: vec![ExecutionError {
            kind: ErrorKind::System,
            message: message.into(),
            count: 1,
            examples: Vec::new(),
        }],
        triggered_by,
    }
}

/// Best-effort identifier for error examples: the source business key when
/// present, otherwise the row's position in the batch.
fn row_identifier(row: &SourceRow, source_key_field: &str, index: usize) -> String {
    match row.get(source_key_field) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Null) | None => format!("row #{index}"),
        Some(other) => other.to_string(),
    }
}
