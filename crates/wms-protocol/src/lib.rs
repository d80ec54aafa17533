//! OGC WMS client-side protocol handling.
//!
//! Supports:
//! - Capabilities documents from WMS 1.1.1 and WMS 1.3.0 servers
//! - OGC service exception reports
//! - GetMap request construction (KVP pairs and direct URLs)

pub mod capabilities;
pub mod exceptions;
pub mod getmap;

pub use capabilities::{Capabilities, LayerCapabilities, StyleCapabilities, WmsVersion};
pub use exceptions::{is_exception_response, ServiceException};
pub use getmap::{format_extension, negotiate_format, GetMapRequest};
