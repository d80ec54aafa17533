//! Resource save pipeline.
//!
//! One save runs: slug assignment, first persist, capabilities sync (layers,
//! bounds, description, zoom), preview fetch, final persist. The two
//! enrichment stages are best-effort; only the persists can fail the save.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, instrument, warn};

use storage::{Catalog, ObjectStorage};
use wms_common::{WmsError, WmsResource, WmsResult};
use wms_protocol::Capabilities;

use crate::client::{DirectClient, StructuredClient, WmsService};
use crate::http::HttpTransport;
use crate::preview::{PreviewFetcher, StoredPreview};
use crate::reconcile;

/// How an enrichment stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// Not attempted; the reason is given
    Skipped(&'static str),
    /// Failed and swallowed; carries the error kind
    Failed(&'static str),
}

/// What a save did besides persisting the resource.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub slug: String,
    pub capabilities: StageOutcome,
    pub layers: usize,
    pub zoom_applied: bool,
    pub preview: StageOutcome,
    pub stored_preview: Option<StoredPreview>,
}

/// Saves resources and enriches them from their remote WMS.
pub struct ResourceSync {
    catalog: Arc<Catalog>,
    service: Arc<dyn WmsService>,
    previews: PreviewFetcher,
}

impl ResourceSync {
    pub fn new(catalog: Arc<Catalog>, service: Arc<dyn WmsService>, previews: PreviewFetcher) -> Self {
        Self {
            catalog,
            service,
            previews,
        }
    }

    /// Structured client for capabilities and previews, direct-URL client
    /// as the preview fallback.
    pub fn with_http(catalog: Arc<Catalog>, storage: Arc<ObjectStorage>, http: HttpTransport) -> Self {
        let structured: Arc<dyn WmsService> = Arc::new(StructuredClient::new(http.clone()));
        let direct: Arc<dyn WmsService> = Arc::new(DirectClient::new(http));
        let previews = PreviewFetcher::new(structured.clone(), direct, storage);
        Self::new(catalog, structured, previews)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Save `resource`, enriching it from its remote WMS.
    ///
    /// Fails only on invalid fields or when the catalog rejects a write.
    /// Remote failures are logged and reported in the [`SyncReport`].
    #[instrument(skip_all, fields(name = %resource.name))]
    pub async fn save(&self, resource: &mut WmsResource) -> WmsResult<SyncReport> {
        resource.validate()?;
        if resource.ensure_slug().is_empty() {
            return Err(WmsError::invalid(
                "name",
                "must contain at least one letter or digit",
            ));
        }

        self.catalog.save_resource(resource).await?;
        debug!(slug = %resource.slug, "Saved resource before sync");

        let mut report = SyncReport {
            slug: resource.slug.clone(),
            capabilities: StageOutcome::Completed,
            layers: 0,
            zoom_applied: false,
            preview: StageOutcome::Completed,
            stored_preview: None,
        };

        let caps = match self.sync_capabilities(resource, &mut report).await {
            Ok(caps) => {
                counter!("wms_capabilities_sync_total", "outcome" => "success").increment(1);
                Some(caps)
            }
            Err(e) if e.is_capabilities_unavailable() => {
                counter!("wms_capabilities_sync_total", "outcome" => e.kind()).increment(1);
                warn!(
                    slug = %resource.slug,
                    error = %e,
                    kind = e.kind(),
                    "Capabilities unavailable, keeping user-supplied fields"
                );
                report.capabilities = StageOutcome::Failed(e.kind());
                None
            }
            Err(e) => return Err(e),
        };

        report.preview = if resource.preview.is_some() {
            StageOutcome::Skipped("preview already set")
        } else {
            self.sync_preview(resource, caps.as_ref(), &mut report).await
        };

        self.catalog.save_resource(resource).await?;

        info!(
            slug = %resource.slug,
            capabilities = ?report.capabilities,
            preview = ?report.preview,
            layers = report.layers,
            "Resource saved"
        );
        Ok(report)
    }

    /// Clear the preview reference and save again, fetching a new preview.
    pub async fn refresh(&self, resource: &mut WmsResource) -> WmsResult<SyncReport> {
        resource.preview = None;
        self.save(resource).await
    }

    async fn sync_capabilities(
        &self,
        resource: &mut WmsResource,
        report: &mut SyncReport,
    ) -> WmsResult<Capabilities> {
        let credentials = resource.credentials();
        let caps = self
            .service
            .capabilities(&resource.uri, credentials.as_ref())
            .await?;

        let layers = reconcile::reconcile(&self.catalog, resource, &caps).await?;
        report.layers = layers.len();

        if resource.bounding_box().is_some() {
            resource.apply_zoom_policy()?;
            report.zoom_applied = true;
        } else {
            debug!("No complete bounding box, zoom levels left unset");
        }

        Ok(caps)
    }

    /// Run the preview stage. Every failure is logged and swallowed.
    async fn sync_preview(
        &self,
        resource: &mut WmsResource,
        caps: Option<&Capabilities>,
        report: &mut SyncReport,
    ) -> StageOutcome {
        match self.fetch_preview(resource, caps).await {
            Ok(stored) => {
                resource.preview = Some(stored.key.clone());
                report.stored_preview = Some(stored);
                StageOutcome::Completed
            }
            Err(e) => {
                if matches!(e, WmsError::Validation(_)) {
                    resource.preview = None;
                }
                warn!(
                    slug = %resource.slug,
                    error = %e,
                    kind = e.kind(),
                    "Failed to populate preview"
                );
                StageOutcome::Failed(e.kind())
            }
        }
    }

    async fn fetch_preview(
        &self,
        resource: &WmsResource,
        caps: Option<&Capabilities>,
    ) -> WmsResult<StoredPreview> {
        let known_layers = self.catalog.layer_names(&resource.slug).await?;
        self.previews.fetch(resource, known_layers, caps).await
    }
}
