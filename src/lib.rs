//! # Datasync Engine Library
//!
//! This library provides the core functionality for the datasync service:
//! a configurable ETL engine that pulls rows from external read-only views,
//! transforms fields through a declarative pipeline, and reconciles them
//! into a target document store by business key.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod provider;
pub mod reconcile;
pub mod scheduler;
pub mod transform;
