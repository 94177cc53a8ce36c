//! Core types for the flexibee-sync framework.
//!
//! This crate provides the foundational types used across the sync
//! framework, including:
//!
//! - [`EntityCatalog`] - Immutable registry of mirrored collections
//! - [`FieldDescriptor`] / [`LogicalType`] - Source field definitions
//! - [`Record`] / [`Page`] - Records flowing from the source to the store
//! - [`RecordStore`] - Storage operations needed by the sync engine
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── checkpoint          (per-entity sync checkpoints)
//!    ├─── flexibee-source     (produces Pages of Records)
//!    └─── postgresql-sink     (implements RecordStore, ToDdl)
//! ```

pub mod catalog;
pub mod record;
pub mod store;
pub mod types;

pub use catalog::{EntityCatalog, EntityDescriptor};
pub use record::{Page, Record};
pub use store::{CleanupRecord, RecordStore};
pub use types::{FieldDescriptor, LogicalType, ToDdl};
