//! Merging fresh capabilities into the catalog.
//!
//! Layer and style fields always take the remote values. Resource-level
//! fields (bounds, description) are only filled where the user left them
//! empty.

use tracing::{debug, instrument};

use storage::Catalog;
use wms_common::{BoundingBox, LayerStyle, WmsLayer, WmsResource, WmsResult};
use wms_protocol::Capabilities;

/// Layer records for every named layer in the capabilities.
pub fn layer_records(caps: &Capabilities) -> Vec<WmsLayer> {
    caps.layers
        .values()
        .map(|layer| WmsLayer {
            id: None,
            name: layer.name.clone(),
            title: layer.title.clone(),
            abstract_text: layer.abstract_text.clone(),
            bbox: layer.bbox_wgs84,
            styles: layer
                .styles
                .iter()
                .map(|(name, style)| LayerStyle {
                    id: None,
                    name: name.clone(),
                    title: style.title.clone(),
                    legend_uri: style.legend_url.clone(),
                })
                .collect(),
        })
        .collect()
}

/// Union of the layer extents. Layers without an extent are ignored.
pub fn aggregate_bounds(layers: &[WmsLayer]) -> Option<BoundingBox> {
    BoundingBox::aggregate(layers.iter().filter_map(|l| l.bbox.as_ref()))
}

/// Fill unset resource fields from the capabilities and its layers.
pub fn apply_to_resource(resource: &mut WmsResource, caps: &Capabilities, layers: &[WmsLayer]) {
    resource.fill_missing_description(caps.abstract_text.as_deref());

    if let Some(bbox) = aggregate_bounds(layers) {
        resource.fill_missing_bounds(&bbox);
    }
}

/// Store every advertised layer and style, then fill unset resource fields.
///
/// Layer writes happen in one transaction. The resource itself is not
/// saved here.
#[instrument(skip(catalog, resource, caps), fields(slug = %resource.slug))]
pub async fn reconcile(
    catalog: &Catalog,
    resource: &mut WmsResource,
    caps: &Capabilities,
) -> WmsResult<Vec<WmsLayer>> {
    let layers = layer_records(caps);
    let stored = catalog.store_layers(&resource.slug, &layers).await?;

    apply_to_resource(resource, caps, &stored);

    debug!(layers = stored.len(), "Reconciled capabilities");
    Ok(stored)
}
