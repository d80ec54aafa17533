//! Layer and style records advertised by a remote WMS.

use serde::{Deserialize, Serialize};

use crate::BoundingBox;

/// A single layer of a registered WMS resource.
///
/// Identified by `(resource, name)`; `id` is assigned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmsLayer {
    pub id: Option<i64>,

    /// Remote layer identifier (the `LAYERS` value in GetMap)
    pub name: String,

    pub title: Option<String>,

    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,

    /// Geographic extent (WGS84)
    pub bbox: Option<BoundingBox>,

    pub styles: Vec<LayerStyle>,
}

/// A named rendering style of a layer.
///
/// Identified by `(layer, name)`. The name may be empty when the remote
/// server reports an unnamed style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    pub id: Option<i64>,
    pub name: String,
    pub title: Option<String>,
    pub legend_uri: Option<String>,
}

impl WmsLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            title: None,
            abstract_text: None,
            bbox: None,
            styles: Vec::new(),
        }
    }

    /// Find a style by name.
    pub fn get_style(&self, name: &str) -> Option<&LayerStyle> {
        self.styles.iter().find(|s| s.name == name)
    }
}
