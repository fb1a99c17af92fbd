//! Synchronization configuration: one per integration definition.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::schedule::ScheduleConfig;

/// One integration definition: where to read from, how to shape each row,
/// which target collection to reconcile into, and when to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfiguration {
    pub id: Uuid,
    /// Human-readable name; unique by convention, not enforced here.
    pub name: String,
    pub active: bool,
    /// Identifier of the external read-only relation to pull from.
    pub source_view: String,
    pub target_collection: TargetCollection,
    /// Business key on the source row used to match an existing target record.
    pub source_key_field: String,
    /// Business key on the target record.
    pub target_key_field: String,
    /// Raw predicate appended to the source read. Trusted input; validated
    /// upstream of this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_clause: Option<String>,
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Target entity types a configuration may populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetCollection {
    Projects,
    Users,
    Teams,
}

impl TargetCollection {
    /// Return the canonical collection name.
    pub const fn as_str(self) -> &'static str {
        match self {
            TargetCollection::Projects => "projects",
            TargetCollection::Users => "users",
            TargetCollection::Teams => "teams",
        }
    }
}

impl fmt::Display for TargetCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape translation for one field of a source row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
    /// Applied left-to-right; empty sequence is a passthrough copy.
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(default)]
    pub update_behavior: UpdateBehavior,
}

impl FieldMapping {
    /// Passthrough mapping with no transformations.
    pub fn passthrough<S: Into<String>, T: Into<String>>(source: S, target: T) -> Self {
        Self {
            source_field: source.into(),
            target_field: target.into(),
            transformations: Vec::new(),
            update_behavior: UpdateBehavior::Update,
        }
    }
}

/// Behavior of a mapped field on a target record that already exists.
///
/// `Update` overwrites the field every run. `Keep` writes the field only on
/// insert and never touches it again through this pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateBehavior {
    #[default]
    Update,
    Keep,
}

/// One declarative field operator.
///
/// Each variant is a total function from "value or absence" to "value or
/// failure"; only `ToNumber` and `ToDate` can fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transformation {
    Trim,
    Lowercase,
    Uppercase,
    ToNumber,
    ToString,
    ToDate {
        date_format: String,
    },
    /// Replace the value with the first matching `to` for an equal `from`.
    /// An unmatched value passes through unchanged.
    MapValue {
        table: Vec<ValueMapping>,
    },
    /// Replace the value only when the incoming value is absent or empty.
    DefaultValue {
        value: Value,
    },
}

/// One `(from, to)` entry of a `MapValue` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMapping {
    pub from: Value,
    pub to: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_are_canonical() {
        assert_eq!(TargetCollection::Projects.as_str(), "projects");
        assert_eq!(TargetCollection::Users.as_str(), "users");
        assert_eq!(TargetCollection::Teams.as_str(), "teams");
    }

    #[test]
    fn transformation_serde_uses_op_tag() {
        let op = Transformation::ToDate {
            date_format: "%Y-%m-%d".to_string(),
        };
        let json = serde_json::to_value(&op).expect("serialize transformation");
        assert_eq!(json["op"], "to_date");
        assert_eq!(json["date_format"], "%Y-%m-%d");

        let parsed: Transformation =
            serde_json::from_value(serde_json::json!({ "op": "trim" })).expect("parse trim");
        assert_eq!(parsed, Transformation::Trim);
    }

    #[test]
    fn update_behavior_defaults_to_update() {
        let mapping: FieldMapping = serde_json::from_value(serde_json::json!({
            "source_field": "name",
            "target_field": "client"
        }))
        .expect("parse mapping");
        assert_eq!(mapping.update_behavior, UpdateBehavior::Update);
        assert!(mapping.transformations.is_empty());
    }
}
