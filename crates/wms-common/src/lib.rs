//! Common types shared by the WMS registry crates.

pub mod bbox;
pub mod error;
pub mod layer;
pub mod resource;
pub mod zoom;

pub use bbox::BoundingBox;
pub use error::{WmsError, WmsResult};
pub use layer::{LayerStyle, WmsLayer};
pub use resource::{slugify, Credentials, WmsResource};
pub use zoom::{min_zoom_for_span, zoom_lookup, MAX_ZOOM, ZOOM_LEVELS};
