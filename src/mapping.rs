//! Mapping Resolver
//!
//! Applies the transformation pipeline across a field-mapping list to turn
//! one source row into one target record shape. Pure and synchronous; field
//! failures are collected, never raised, so a single bad field cannot abort
//! the batch.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::model::{FieldMapping, UpdateBehavior};
use crate::provider::SourceRow;
use crate::transform;

/// One field-level mapping failure, attributed to the owning record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub target_field: String,
    pub message: String,
}

/// Result of resolving one source row.
///
/// A record with any field error is ultimately counted as failed and its
/// partial `fields` are discarded by the caller; they are still produced here
/// so every failing field of the row is reported, not just the first.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRecord {
    /// Successfully computed target fields. Absent values are omitted.
    pub fields: Map<String, Value>,
    /// Update behavior per produced target field, consulted when the record
    /// matches an existing document.
    pub behaviors: BTreeMap<String, UpdateBehavior>,
    pub errors: Vec<FieldError>,
}

impl ResolvedRecord {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Resolve one source row against the configured mappings.
///
/// A missing source key is an absent value, not an error; each mapping is
/// independent of the others.
pub fn resolve(row: &SourceRow, mappings: &[FieldMapping]) -> ResolvedRecord {
    let mut record = ResolvedRecord::default();

    for mapping in mappings {
        let source_field = mapping.source_field.trim();
        let target_field = mapping.target_field.trim();
        if source_field.is_empty() || target_field.is_empty() {
            record.errors.push(FieldError {
                target_field: mapping.target_field.clone(),
                message: "mapping has an empty source or target field".to_string(),
            });
            continue;
        }

        let raw = row.get(source_field).cloned();
        match transform::apply(raw, &mapping.transformations) {
            Ok(Some(value)) => {
                record.fields.insert(target_field.to_string(), value);
                record
                    .behaviors
                    .insert(target_field.to_string(), mapping.update_behavior);
            }
            Ok(None) => {
                // Field is absent in the output record, not set to null.
            }
            Err(err) => record.errors.push(FieldError {
                target_field: target_field.to_string(),
                message: err.to_string(),
            }),
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transformation;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> SourceRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn resolves_row_into_target_shape() {
        let mappings = vec![
            FieldMapping::passthrough("id", "project_id"),
            FieldMapping {
                source_field: "name".to_string(),
                target_field: "client".to_string(),
                transformations: vec![Transformation::Trim, Transformation::Lowercase],
                update_behavior: UpdateBehavior::Update,
            },
        ];
        let record = resolve(&row(&[("id", json!("A1")), ("name", json!(" Acme "))]), &mappings);

        assert!(record.is_clean());
        assert_eq!(record.fields.get("project_id"), Some(&json!("A1")));
        assert_eq!(record.fields.get("client"), Some(&json!("acme")));
        assert_eq!(
            record.behaviors.get("client"),
            Some(&UpdateBehavior::Update)
        );
    }

    #[test]
    fn missing_source_key_is_absent_not_an_error() {
        let mappings = vec![FieldMapping::passthrough("nickname", "alias")];
        let record = resolve(&row(&[("id", json!("A1"))]), &mappings);

        assert!(record.is_clean());
        assert!(!record.fields.contains_key("alias"));
    }

    #[test]
    fn field_failure_still_produces_partial_record() {
        let mappings = vec![
            FieldMapping::passthrough("id", "project_id"),
            FieldMapping {
                source_field: "budget".to_string(),
                target_field: "budget".to_string(),
                transformations: vec![Transformation::ToNumber],
                update_behavior: UpdateBehavior::Update,
            },
        ];
        let record = resolve(
            &row(&[("id", json!("A1")), ("budget", json!("abc"))]),
            &mappings,
        );

        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].target_field, "budget");
        assert!(record.errors[0].message.contains("not numeric"));
        // The rest of the row still resolved.
        assert_eq!(record.fields.get("project_id"), Some(&json!("A1")));
    }

    #[test]
    fn all_failing_fields_are_reported() {
        let mappings = vec![
            FieldMapping {
                source_field: "a".to_string(),
                target_field: "a".to_string(),
                transformations: vec![Transformation::ToNumber],
                update_behavior: UpdateBehavior::Update,
            },
            FieldMapping {
                source_field: "b".to_string(),
                target_field: "b".to_string(),
                transformations: vec![Transformation::ToNumber],
                update_behavior: UpdateBehavior::Update,
            },
        ];
        let record = resolve(&row(&[("a", json!("x")), ("b", json!("y"))]), &mappings);
        assert_eq!(record.errors.len(), 2);
    }

    #[test]
    fn keep_behavior_is_carried_as_metadata() {
        let mappings = vec![FieldMapping {
            source_field: "created".to_string(),
            target_field: "created_on".to_string(),
            transformations: Vec::new(),
            update_behavior: UpdateBehavior::Keep,
        }];
        let record = resolve(&row(&[("created", json!("2025-01-01"))]), &mappings);
        assert_eq!(
            record.behaviors.get("created_on"),
            Some(&UpdateBehavior::Keep)
        );
    }

    #[test]
    fn blank_mapping_fields_are_rejected() {
        let mappings = vec![FieldMapping::passthrough("  ", "alias")];
        let record = resolve(&row(&[("id", json!("A1"))]), &mappings);
        assert_eq!(record.errors.len(), 1);
    }
}
