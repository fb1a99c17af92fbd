//! Reconciliation Engine
//!
//! Matches mapped records against the target store by business key and
//! decides insert vs. update vs. error for each. Outcomes are categorized
//! into the uniform error taxonomy and grouped by `(kind, message)`; one bad
//! record never stops the batch.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::ErrorAggregator;
use crate::mapping::ResolvedRecord;
use crate::model::{ErrorKind, TargetCollection, UpdateBehavior};
use crate::provider::{StoreError, TargetDocument, TargetStore};
use crate::transform::is_empty_value;

/// Batch-level parameters shared by every record of one run.
#[derive(Debug, Clone)]
pub struct ReconcileParams {
    pub collection: TargetCollection,
    /// Business key field on the mapped record.
    pub key_field: String,
    /// Upper bound for each individual store call.
    pub op_timeout: Duration,
}

/// Final counts for one reconciled batch. Each record increments at most one
/// counter; a record whose update payload is empty is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
}

/// Reconcile a batch of cleanly mapped records against the target store.
///
/// Record order is preserved for deterministic error-example selection but
/// has no effect on the final counts.
pub async fn reconcile(
    store: &dyn TargetStore,
    params: &ReconcileParams,
    records: &[ResolvedRecord],
    errors: &mut ErrorAggregator,
) -> ReconcileCounts {
    let mut counts = ReconcileCounts::default();

    for (index, record) in records.iter().enumerate() {
        let key_value = match record.fields.get(&params.key_field) {
            Some(value) if !is_empty_value(value) => value.clone(),
            _ => {
                // Rejected before any store call.
                counts.failed += 1;
                errors.record(
                    ErrorKind::Required,
                    format!("target key field `{}` missing or empty", params.key_field),
                    Some(&format!("record #{index}")),
                );
                continue;
            }
        };
        let example = display_key(&key_value);

        let existing = match store_call(
            params.op_timeout,
            store.find_one(params.collection, &params.key_field, &key_value),
        )
        .await
        {
            Ok(existing) => existing,
            Err(err) => {
                counts.failed += 1;
                errors.record(classify(&err), err.to_string(), Some(&example));
                continue;
            }
        };

        match existing {
            None => {
                // First write: the full mapped record, keep-behavior fields
                // included.
                match store_call(
                    params.op_timeout,
                    store.insert(params.collection, record.fields.clone()),
                )
                .await
                {
                    Ok(id) => {
                        counts.inserted += 1;
                        trace!(key = %example, id = %id, "Inserted target record");
                    }
                    Err(err) => {
                        counts.failed += 1;
                        errors.record(classify(&err), err.to_string(), Some(&example));
                    }
                }
            }
            Some(_) => {
                let patch = update_payload(record);
                if patch.is_empty() {
                    debug!(key = %example, "All mapped fields are keep-behavior; skipping update");
                    continue;
                }

                match store_call(
                    params.op_timeout,
                    store.update(params.collection, &params.key_field, &key_value, patch),
                )
                .await
                {
                    Ok(()) => {
                        counts.updated += 1;
                        trace!(key = %example, "Updated target record");
                    }
                    Err(err) => {
                        counts.failed += 1;
                        errors.record(classify(&err), err.to_string(), Some(&example));
                    }
                }
            }
        }
    }

    counts
}

/// Fields eligible for an update once a record exists: only those whose
/// mapping declared `update` behavior. `keep` fields are immutable
/// post-creation through this pipeline.
fn update_payload(record: &ResolvedRecord) -> TargetDocument {
    record
        .fields
        .iter()
        .filter(|(field, _)| {
            record.behaviors.get(*field).copied().unwrap_or_default() == UpdateBehavior::Update
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

fn classify(err: &StoreError) -> ErrorKind {
    match err {
        StoreError::UniqueViolation { .. } => ErrorKind::Duplicate,
        StoreError::Validation { .. } => ErrorKind::Validation,
        StoreError::Connectivity { .. } => ErrorKind::System,
    }
}

async fn store_call<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Connectivity {
            details: "store call timed out".to_string(),
        }),
    }
}

fn display_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    /// In-memory document store with an optional unique index on one field.
    #[derive(Default)]
    struct MemStore {
        docs: Mutex<Vec<TargetDocument>>,
        unique_field: Option<String>,
        calls: AtomicUsize,
    }

    impl MemStore {
        fn with_unique_field(field: &str) -> Self {
            Self {
                unique_field: Some(field.to_string()),
                ..Self::default()
            }
        }

        async fn seed(&self, doc: serde_json::Value) {
            let doc = doc.as_object().expect("object document").clone();
            self.docs.lock().await.push(doc);
        }

        async fn get(&self, key_field: &str, key: &str) -> Option<TargetDocument> {
            self.docs
                .lock()
                .await
                .iter()
                .find(|d| d.get(key_field) == Some(&json!(key)))
                .cloned()
        }
    }

    #[async_trait]
    impl TargetStore for MemStore {
        async fn find_one(
            &self,
            _collection: TargetCollection,
            key_field: &str,
            key_value: &Value,
        ) -> Result<Option<TargetDocument>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .docs
                .lock()
                .await
                .iter()
                .find(|d| d.get(key_field) == Some(key_value))
                .cloned())
        }

        async fn insert(
            &self,
            _collection: TargetCollection,
            record: TargetDocument,
        ) -> Result<Uuid, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut docs = self.docs.lock().await;
            if let Some(field) = &self.unique_field
                && let Some(value) = record.get(field)
                && docs.iter().any(|d| d.get(field) == Some(value))
            {
                return Err(StoreError::UniqueViolation {
                    field: field.clone(),
                });
            }
            docs.push(record);
            Ok(Uuid::new_v4())
        }

        async fn update(
            &self,
            _collection: TargetCollection,
            key_field: &str,
            key_value: &Value,
            patch: TargetDocument,
        ) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut docs = self.docs.lock().await;
            let doc = docs
                .iter_mut()
                .find(|d| d.get(key_field) == Some(key_value))
                .ok_or_else(|| StoreError::Validation {
                    details: "no document matches the key".to_string(),
                })?;
            for (field, value) in patch {
                doc.insert(field, value);
            }
            Ok(())
        }
    }

    fn params() -> ReconcileParams {
        ReconcileParams {
            collection: TargetCollection::Projects,
            key_field: "project_id".to_string(),
            op_timeout: Duration::from_secs(5),
        }
    }

    fn record(fields: serde_json::Value, keep: &[&str]) -> ResolvedRecord {
        let fields = fields.as_object().expect("object fields").clone();
        let behaviors = fields
            .keys()
            .map(|k| {
                let behavior = if keep.contains(&k.as_str()) {
                    UpdateBehavior::Keep
                } else {
                    UpdateBehavior::Update
                };
                (k.clone(), behavior)
            })
            .collect();
        ResolvedRecord {
            fields,
            behaviors,
            errors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn inserts_when_no_record_matches_the_key() {
        let store = MemStore::default();
        let mut errors = ErrorAggregator::default();
        let records = vec![
            record(json!({"project_id": "A1", "client": "acme"}), &[]),
            record(json!({"project_id": "A2", "client": "beta"}), &[]),
        ];

        let counts = reconcile(&store, &params(), &records, &mut errors).await;

        assert_eq!(counts, ReconcileCounts { inserted: 2, updated: 0, failed: 0 });
        assert!(errors.is_empty());
        assert_eq!(
            store.get("project_id", "A1").await.unwrap()["client"],
            json!("acme")
        );
    }

    #[tokio::test]
    async fn updates_existing_record_with_update_fields_only() {
        let store = MemStore::default();
        store
            .seed(json!({"project_id": "A1", "client": "acme", "created_on": "2024-01-01"}))
            .await;
        let mut errors = ErrorAggregator::default();
        let records = vec![record(
            json!({"project_id": "A1", "client": "acme corp", "created_on": "2025-06-01"}),
            &["created_on"],
        )];

        let counts = reconcile(&store, &params(), &records, &mut errors).await;

        assert_eq!(counts, ReconcileCounts { inserted: 0, updated: 1, failed: 0 });
        let doc = store.get("project_id", "A1").await.unwrap();
        assert_eq!(doc["client"], json!("acme corp"));
        // Keep-behavior field untouched even though the source changed.
        assert_eq!(doc["created_on"], json!("2024-01-01"));
    }

    #[tokio::test]
    async fn keep_only_record_is_a_no_op_against_existing_document() {
        let store = MemStore::default();
        store.seed(json!({"project_id": "A1", "owner": "alice"})).await;
        let mut errors = ErrorAggregator::default();
        let records = vec![record(
            json!({"project_id": "A1", "owner": "bob"}),
            &["project_id", "owner"],
        )];

        let counts = reconcile(&store, &params(), &records, &mut errors).await;

        assert_eq!(counts, ReconcileCounts::default());
        assert_eq!(
            store.get("project_id", "A1").await.unwrap()["owner"],
            json!("alice")
        );
    }

    #[tokio::test]
    async fn missing_key_is_rejected_before_any_store_call() {
        let store = MemStore::default();
        let mut errors = ErrorAggregator::default();
        let records = vec![record(json!({"client": "acme"}), &[])];

        let counts = reconcile(&store, &params(), &records, &mut errors).await;

        assert_eq!(counts, ReconcileCounts { inserted: 0, updated: 0, failed: 1 });
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        let errors = errors.into_errors();
        assert_eq!(errors[0].kind, ErrorKind::Required);
        assert_eq!(errors[0].examples, vec!["record #0"]);
    }

    #[tokio::test]
    async fn uniqueness_violation_on_insert_is_classified_duplicate() {
        let store = MemStore::with_unique_field("email");
        store
            .seed(json!({"user_id": "U1", "email": "a@example.com"}))
            .await;
        let mut errors = ErrorAggregator::default();
        let reconcile_params = ReconcileParams {
            collection: TargetCollection::Users,
            key_field: "user_id".to_string(),
            op_timeout: Duration::from_secs(5),
        };
        let records = vec![record(
            json!({"user_id": "U2", "email": "a@example.com"}),
            &[],
        )];

        let counts = reconcile(&store, &reconcile_params, &records, &mut errors).await;

        assert_eq!(counts.failed, 1);
        let errors = errors.into_errors();
        assert_eq!(errors[0].kind, ErrorKind::Duplicate);
        assert_eq!(errors[0].examples, vec!["U2"]);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_at_the_record_level() {
        let store = MemStore::default();
        let mut errors = ErrorAggregator::default();
        let records = vec![record(json!({"project_id": "A1", "client": "acme"}), &[])];

        let first = reconcile(&store, &params(), &records, &mut errors).await;
        assert_eq!(first, ReconcileCounts { inserted: 1, updated: 0, failed: 0 });

        let second = reconcile(&store, &params(), &records, &mut errors).await;
        assert_eq!(second, ReconcileCounts { inserted: 0, updated: 1, failed: 0 });
        assert_eq!(store.docs.lock().await.len(), 1, "no duplicate insert");
    }
}
