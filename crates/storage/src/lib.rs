//! Storage for the WMS registry.
//!
//! - SQLite catalog of resources, layers and styles
//! - Object storage (local directory, in-memory or S3) for preview images

pub mod catalog;
pub mod object_store;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig};
pub use catalog::Catalog;
