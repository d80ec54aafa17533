//! WMS resource synchronization.
//!
//! Saving a resource fetches its remote capabilities, records the advertised
//! layers and styles, fills in unset bounds and zoom levels, and stores a
//! preview image. Remote failures never prevent the resource from being
//! saved.

pub mod client;
pub mod config;
pub mod http;
pub mod preview;
pub mod reconcile;
pub mod sync;

pub use client::{DirectClient, StructuredClient, WmsService};
pub use config::{HttpConfig, SyncConfig};
pub use http::HttpTransport;
pub use preview::{PreviewFetcher, PreviewStrategy, StoredPreview};
pub use sync::{ResourceSync, StageOutcome, SyncReport};
