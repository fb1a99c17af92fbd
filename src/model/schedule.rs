//! Declarative schedule configuration.
//!
//! A schedule is either absent, a raw 5-field cron expression, or a
//! user-friendly preset that compiles deterministically to cron. Translation
//! and validation live in [`crate::scheduler`].

use serde::{Deserialize, Serialize};

/// When a configuration runs automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleConfig {
    /// Never auto-runs; manual execution only.
    #[default]
    None,
    /// Raw 5-field cron expression, validated at translation time.
    Cron { expression: String },
    Preset { preset: PresetSpec },
}

/// Schedule shorthand compiled to a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PresetSpec {
    /// Every day at `time_of_day` (`"HH:MM"`, 24-hour clock).
    Daily { time_of_day: String },
    /// Once a week; `day_of_week` uses 0 = Sunday through 6 = Saturday.
    Weekly { day_of_week: u8, time_of_day: String },
    /// Every `minutes` minutes; clamped into `[1, 60]`.
    Interval { minutes: u32 },
}
