//! External collaborator traits.
//!
//! The engine consumes three abstract boundaries: the relational source it
//! reads rows from, the document store it reconciles into, and the
//! repository that owns configurations and their history. The concrete
//! drivers live outside this crate; only the contracts they must satisfy are
//! defined here.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{ExecutionLog, SyncConfiguration, TargetCollection};

/// One loosely-typed, string-keyed row from a source view.
pub type SourceRow = Map<String, Value>;

/// One loosely-typed document in the target store.
pub type TargetDocument = Map<String, Value>;

/// Failure to read from the external relational source. Always run-fatal.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("source unreachable: {details}")]
    Unavailable { details: String },
    #[error("source query failed on view `{view}`: {details}")]
    Query { view: String, details: String },
}

/// Failure reported by the target document store.
///
/// The variants distinguish the classes the reconciliation engine needs to
/// categorize outcomes: uniqueness violations, schema/constraint rejections,
/// and connectivity problems.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("unique constraint violated on `{field}`")]
    UniqueViolation { field: String },
    #[error("document rejected: {details}")]
    Validation { details: String },
    #[error("store unreachable: {details}")]
    Connectivity { details: String },
}

/// Failure in the configuration repository.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("configuration repository unavailable: {details}")]
    Unavailable { details: String },
}

/// External relational data source exposing read-only views.
///
/// `view` and `filter` are already validated upstream; implementations must
/// parameterize them safely before issuing the read.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_rows(
        &self,
        view: &str,
        filter: Option<&str>,
    ) -> Result<Vec<SourceRow>, SourceError>;
}

/// External document store the engine reconciles mapped records into.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Look up an existing record by business-key equality.
    async fn find_one(
        &self,
        collection: TargetCollection,
        key_field: &str,
        key_value: &Value,
    ) -> Result<Option<TargetDocument>, StoreError>;

    /// Insert a full record, returning its storage identifier.
    async fn insert(
        &self,
        collection: TargetCollection,
        record: TargetDocument,
    ) -> Result<Uuid, StoreError>;

    /// Apply a partial update to the record matching the business key.
    async fn update(
        &self,
        collection: TargetCollection,
        key_field: &str,
        key_value: &Value,
        patch: TargetDocument,
    ) -> Result<(), StoreError>;
}

/// Repository owning sync configurations and their append-only history.
/// Persistence itself belongs to the surrounding CRUD layer.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// All configurations with `active = true`.
    async fn list_active(&self) -> Result<Vec<SyncConfiguration>, RepositoryError>;

    /// Load one configuration by id, active or not.
    async fn find(&self, id: Uuid) -> Result<Option<SyncConfiguration>, RepositoryError>;

    /// Append one immutable execution log to the configuration's history.
    async fn append_history(&self, id: Uuid, log: ExecutionLog) -> Result<(), RepositoryError>;
}
