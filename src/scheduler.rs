//! Schedule Manager
//!
//! Owns the process-wide set of live sync triggers. Declarative schedule
//! configuration is translated to a cron expression, validated, and
//! registered as one spawned trigger task per active configuration. Ticks
//! for a configuration whose previous run has not finished are skipped, not
//! queued; the skip is visible only in logs and metrics, never in history.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Timelike, Utc};
use cron::Schedule;
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::ExecuteError;
use crate::executor::SyncExecutor;
use crate::model::{PresetSpec, ScheduleConfig};
use crate::provider::{ConfigRepository, RepositoryError};

/// Translate a declarative schedule into a standard 5-field cron expression.
///
/// Presets are pure sugar and compile deterministically; raw cron
/// expressions are validated against the cron grammar. Anything invalid is
/// logged and yields `None`, meaning the configuration is never scheduled.
pub fn translate(schedule: &ScheduleConfig) -> Option<String> {
    match schedule {
        ScheduleConfig::None => None,
        ScheduleConfig::Cron { expression } => {
            let expression = expression.trim();
            match parse_cron(expression) {
                Ok(_) => Some(expression.to_string()),
                Err(err) => {
                    warn!(expression, error = %err, "Invalid cron expression; not scheduling");
                    None
                }
            }
        }
        ScheduleConfig::Preset { preset } => translate_preset(preset),
    }
}

fn translate_preset(preset: &PresetSpec) -> Option<String> {
    match preset {
        PresetSpec::Daily { time_of_day } => {
            let time = parse_time_of_day(time_of_day)?;
            Some(format!("{} {} * * *", time.minute(), time.hour()))
        }
        PresetSpec::Weekly {
            day_of_week,
            time_of_day,
        } => {
            if *day_of_week > 6 {
                warn!(day_of_week, "Day of week out of range; not scheduling");
                return None;
            }
            let time = parse_time_of_day(time_of_day)?;
            Some(format!(
                "{} {} * * {}",
                time.minute(),
                time.hour(),
                day_of_week
            ))
        }
        PresetSpec::Interval { minutes } => {
            let minutes = (*minutes).clamp(1, 60);
            Some(format!("*/{minutes} * * * *"))
        }
    }
}

fn parse_time_of_day(time_of_day: &str) -> Option<NaiveTime> {
    match NaiveTime::parse_from_str(time_of_day.trim(), "%H:%M") {
        Ok(time) => Some(time),
        Err(err) => {
            warn!(time_of_day, error = %err, "Invalid time of day; not scheduling");
            None
        }
    }
}

/// Parse a stored 5-field cron expression.
///
/// The `cron` crate grammar carries a leading seconds field, so one is
/// prepended before parsing. It also numbers days of week 1-7 with
/// Sunday = 1, while stored expressions use the standard 0-6 with
/// Sunday = 0; numeric day-of-week tokens are rewritten to named days so
/// the registered schedule fires on the intended weekday.
fn parse_cron(expression: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(&format!("0 {}", rewrite_day_of_week(expression.trim())))
}

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

fn rewrite_day_of_week(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let [minute, hour, dom, month, dow] = fields[..] else {
        return expression.to_string();
    };
    format!(
        "{minute} {hour} {dom} {month} {}",
        rewrite_dow_field(dow)
    )
}

fn rewrite_dow_field(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            // A value after `/` is a step, not a day; leave it alone.
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let mapped = match range.split_once('-') {
                Some((lo, hi)) => format!("{}-{}", day_name(lo), day_name(hi)),
                None => day_name(range),
            };
            match step {
                Some(step) => format!("{mapped}/{step}"),
                None => mapped,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Map a standard numeric day (0-6, with 7 as a Sunday alias) to its name;
/// anything else passes through for the cron grammar to judge.
fn day_name(token: &str) -> String {
    match token.parse::<u32>() {
        Ok(n) if n <= 7 => DAY_NAMES[(n % 7) as usize].to_string(),
        _ => token.to_string(),
    }
}

struct TriggerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Process-wide registry of live sync triggers, with lifecycle tied to
/// application start and stop. Constructed and owned explicitly; no ambient
/// global state.
pub struct ScheduleManager {
    repo: Arc<dyn ConfigRepository>,
    executor: Arc<SyncExecutor>,
    root_token: CancellationToken,
    /// Guarded registry; the mutex also serializes overlapping rebuilds so
    /// the last completed rebuild wins.
    triggers: tokio::sync::Mutex<HashMap<Uuid, TriggerHandle>>,
}

impl ScheduleManager {
    pub fn new(repo: Arc<dyn ConfigRepository>, executor: Arc<SyncExecutor>) -> Self {
        Self {
            repo,
            executor,
            root_token: CancellationToken::new(),
            triggers: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Build the initial trigger set; called once at application start.
    pub async fn on_application_start(&self) -> Result<(), RepositoryError> {
        self.rebuild_all().await
    }

    /// Re-derive the trigger set after any configuration create/update/delete.
    pub async fn notify_config_changed(&self) -> Result<(), RepositoryError> {
        self.rebuild_all().await
    }

    /// Cancel every registered trigger, reload all active configurations,
    /// and register a fresh trigger for each schedulable one. Idempotent.
    #[instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<(), RepositoryError> {
        let mut triggers = self.triggers.lock().await;

        for (_, handle) in triggers.drain() {
            handle.token.cancel();
            handle.task.abort();
        }

        // Shutdown is terminal; a later rebuild must not register triggers
        // whose tokens are born cancelled.
        if self.root_token.is_cancelled() {
            warn!("Scheduler is stopped; not registering triggers");
            gauge!("sync_scheduler_registered_triggers").set(0.0);
            return Ok(());
        }

        let configs = self.repo.list_active().await?;
        for config in configs {
            let Some(expression) = translate(&config.schedule) else {
                continue;
            };
            let schedule = match parse_cron(&expression) {
                Ok(schedule) => schedule,
                Err(err) => {
                    warn!(config_id = %config.id, error = %err, "Translated expression failed to parse");
                    continue;
                }
            };

            let token = self.root_token.child_token();
            let task = tokio::spawn(run_trigger(
                self.executor.clone(),
                config.id,
                config.name.clone(),
                schedule,
                token.clone(),
            ));
            triggers.insert(config.id, TriggerHandle { token, task });
        }

        gauge!("sync_scheduler_registered_triggers").set(triggers.len() as f64);
        info!(registered = triggers.len(), "Rebuilt sync trigger set");
        Ok(())
    }

    /// Cancel every live trigger; called at application stop. Terminal: a
    /// stopped manager never registers triggers again.
    pub async fn shutdown(&self) {
        self.root_token.cancel();
        let mut triggers = self.triggers.lock().await;
        for (_, handle) in triggers.drain() {
            handle.task.abort();
        }
        gauge!("sync_scheduler_registered_triggers").set(0.0);
        info!("Sync scheduler stopped");
    }

    /// Number of currently registered triggers (primarily for tests).
    pub async fn registered_count(&self) -> usize {
        self.triggers.lock().await.len()
    }
}

/// One configuration's trigger loop: sleep until the next cron occurrence,
/// fire, repeat until cancelled.
async fn run_trigger(
    executor: Arc<SyncExecutor>,
    config_id: Uuid,
    name: String,
    schedule: Schedule,
    token: CancellationToken,
) {
    info!(config = %name, config_id = %config_id, "Registered sync trigger");

    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            info!(config = %name, "Schedule has no future occurrence; trigger retiring");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(wait) => {}
        }
        if token.is_cancelled() {
            break;
        }

        match executor.execute(config_id, None).await {
            Ok(log) => {
                debug!(
                    config = %name,
                    status = %log.status,
                    inserted = log.inserted,
                    updated = log.updated,
                    failed = log.failed,
                    "Scheduled run completed"
                );
            }
            Err(ExecuteError::AlreadyRunning { .. }) => {
                // Scheduler-level no-op: skipped, not queued, not in history.
                counter!("sync_scheduler_ticks_skipped_total").increment(1);
                debug!(config = %name, "Previous run still in flight; skipping tick");
            }
        }
    }

    debug!(config = %name, "Sync trigger stopped");
}
