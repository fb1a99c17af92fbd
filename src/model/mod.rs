//! Data model for synchronization configurations and execution history.

pub mod execution;
pub mod schedule;
pub mod sync_config;

pub use execution::{ErrorKind, ExecutionError, ExecutionLog, ExecutionStatus};
pub use schedule::{PresetSpec, ScheduleConfig};
pub use sync_config::{
    FieldMapping, SyncConfiguration, TargetCollection, Transformation, UpdateBehavior, ValueMapping,
};
