//! Save pipeline tests against in-process fake WMS services.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use storage::{Catalog, ObjectStorage};
use test_utils::{exception_report, jpeg_bytes, png_bytes, text_bytes, two_layer_service};
use wms_common::{BoundingBox, Credentials, WmsError, WmsResource, WmsResult};
use wms_protocol::{Capabilities, GetMapRequest};
use wms_sync::{PreviewFetcher, PreviewStrategy, ResourceSync, StageOutcome, WmsService};

/// What a fake answers to GetMap.
#[derive(Clone)]
enum MapReply {
    Image(Vec<u8>),
    Fail,
}

/// A WMS that serves a fixed capabilities document and map reply, and
/// records every GetMap request it receives.
struct FakeWms {
    capabilities_xml: Option<String>,
    map: MapReply,
    map_requests: Mutex<Vec<GetMapRequest>>,
    credentials_seen: Mutex<Vec<Option<Credentials>>>,
}

impl FakeWms {
    fn new(capabilities_xml: Option<String>, map: MapReply) -> Arc<Self> {
        Arc::new(Self {
            capabilities_xml,
            map,
            map_requests: Mutex::new(Vec::new()),
            credentials_seen: Mutex::new(Vec::new()),
        })
    }

    fn serving(map: MapReply) -> Arc<Self> {
        Self::new(Some(two_layer_service().to_xml_111()), map)
    }

    fn unreachable() -> Arc<Self> {
        Self::new(None, MapReply::Fail)
    }

    fn map_requests(&self) -> Vec<GetMapRequest> {
        self.map_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WmsService for FakeWms {
    async fn capabilities(
        &self,
        _uri: &str,
        credentials: Option<&Credentials>,
    ) -> WmsResult<Capabilities> {
        self.credentials_seen
            .lock()
            .unwrap()
            .push(credentials.cloned());

        match &self.capabilities_xml {
            Some(xml) => Capabilities::parse(xml),
            None => Err(WmsError::Transport("connection refused".to_string())),
        }
    }

    async fn get_map(
        &self,
        _uri: &str,
        _credentials: Option<&Credentials>,
        request: &GetMapRequest,
    ) -> WmsResult<Bytes> {
        self.map_requests.lock().unwrap().push(request.clone());

        match &self.map {
            MapReply::Image(bytes) => Ok(Bytes::from(bytes.clone())),
            MapReply::Fail => Err(WmsError::Service {
                code: Some("LayerNotDefined".to_string()),
                message: "no such layer".to_string(),
            }),
        }
    }
}

struct Harness {
    sync: ResourceSync,
    catalog: Arc<Catalog>,
    storage: Arc<ObjectStorage>,
}

async fn harness(primary: Arc<FakeWms>, fallback: Arc<FakeWms>) -> Harness {
    let catalog = Arc::new(Catalog::open_memory().await.unwrap());
    let storage = Arc::new(ObjectStorage::in_memory());
    let previews = PreviewFetcher::new(primary.clone(), fallback, storage.clone());
    let sync = ResourceSync::new(catalog.clone(), primary, previews);

    Harness {
        sync,
        catalog,
        storage,
    }
}

fn flood_maps() -> WmsResource {
    WmsResource::new("Flood Maps", "http://maps.example.com/wms")
}

#[tokio::test]
async fn test_save_enriches_resource() {
    let primary = FakeWms::serving(MapReply::Image(png_bytes(16, 16)));
    let h = harness(primary.clone(), FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    let report = h.sync.save(&mut resource).await.unwrap();

    assert_eq!(report.slug, "flood-maps");
    assert_eq!(report.capabilities, StageOutcome::Completed);
    assert_eq!(report.preview, StageOutcome::Completed);
    assert_eq!(report.layers, 2);
    assert!(report.zoom_applied);

    // Aggregate of (106,-7,107,-6) and (138,-5,141,-2)
    assert_eq!(
        resource.bounding_box(),
        Some(BoundingBox::new(106.0, -7.0, 141.0, -2.0))
    );
    assert_eq!(resource.description, "Flood hazard layers for Indonesia");

    // Span 35 degrees: closest table entry is 45 (zoom 3)
    assert_eq!(resource.min_zoom, Some(3));
    assert_eq!(resource.zoom, Some(3));
    assert_eq!(resource.max_zoom, Some(19));

    let key = resource.preview.clone().unwrap();
    assert!(key.starts_with("wms_preview/flood-maps_"));
    assert!(key.ends_with(".jpeg"));
    assert!(!h.storage.get(&key).await.unwrap().is_empty());

    let stored = h.catalog.get_resource("flood-maps").await.unwrap().unwrap();
    assert_eq!(stored, resource);
}

#[tokio::test]
async fn test_preview_request_uses_catalogued_layers() {
    let primary = FakeWms::serving(MapReply::Image(jpeg_bytes(16, 16)));
    let h = harness(primary.clone(), FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    h.sync.save(&mut resource).await.unwrap();

    let requests = primary.map_requests();
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    assert_eq!(request.layers, vec!["a", "b"]);
    assert_eq!(request.bbox, BoundingBox::new(106.0, -7.0, 141.0, -2.0));
    assert_eq!(request.srs, "EPSG:4326");
    assert_eq!((request.width, request.height), (300, 300));
    assert_eq!(request.format, "image/jpeg");
    assert!(request.transparent);
    assert_eq!(request.padded_styles(), vec!["", ""]);
}

#[tokio::test]
async fn test_save_is_idempotent() {
    let primary = FakeWms::serving(MapReply::Image(png_bytes(8, 8)));
    let h = harness(primary.clone(), FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    h.sync.save(&mut resource).await.unwrap();
    let first_layers = h.catalog.layers("flood-maps").await.unwrap();
    let first = resource.clone();

    let report = h.sync.save(&mut resource).await.unwrap();
    let second_layers = h.catalog.layers("flood-maps").await.unwrap();

    assert_eq!(first_layers, second_layers);
    assert_eq!(first, resource);
    assert_eq!(
        report.preview,
        StageOutcome::Skipped("preview already set")
    );
    // No second GetMap while a preview exists
    assert_eq!(primary.map_requests().len(), 1);
}

#[tokio::test]
async fn test_user_bounds_and_zoom_are_kept() {
    let primary = FakeWms::serving(MapReply::Image(png_bytes(8, 8)));
    let h = harness(primary, FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    resource.north = Some(0.0);
    resource.description = "Curated".to_string();
    resource.min_zoom = Some(7);
    resource.zoom = Some(5);
    h.sync.save(&mut resource).await.unwrap();

    assert_eq!(resource.north, Some(0.0));
    assert_eq!(resource.east, Some(141.0));
    assert_eq!(resource.description, "Curated");
    // Span 35 gives 3; a higher user minimum wins and zoom is raised to it
    assert_eq!(resource.min_zoom, Some(7));
    assert_eq!(resource.zoom, Some(7));
}

#[tokio::test]
async fn test_structured_failure_falls_back_to_direct() {
    let primary = FakeWms::serving(MapReply::Fail);
    let fallback = FakeWms::serving(MapReply::Image(jpeg_bytes(8, 8)));
    let h = harness(primary.clone(), fallback.clone()).await;

    let mut resource = flood_maps();
    let report = h.sync.save(&mut resource).await.unwrap();

    assert_eq!(report.preview, StageOutcome::Completed);
    assert_eq!(
        report.stored_preview.map(|p| p.strategy),
        Some(PreviewStrategy::Direct)
    );
    assert!(resource.preview.is_some());

    // The fallback gets exactly what the structured client was asked for
    assert_eq!(primary.map_requests(), fallback.map_requests());
}

#[tokio::test]
async fn test_both_strategies_failing_leaves_no_preview() {
    let primary = FakeWms::serving(MapReply::Fail);
    let fallback = FakeWms::serving(MapReply::Fail);
    let h = harness(primary, fallback.clone()).await;

    let mut resource = flood_maps();
    let report = h.sync.save(&mut resource).await.unwrap();

    assert_eq!(report.preview, StageOutcome::Failed("service"));
    assert_eq!(report.capabilities, StageOutcome::Completed);
    assert_eq!(resource.preview, None);
    assert_eq!(fallback.map_requests().len(), 1);
    assert!(h.catalog.get_resource("flood-maps").await.unwrap().is_some());
}

#[tokio::test]
async fn test_non_image_bytes_are_not_stored() {
    let primary = FakeWms::serving(MapReply::Image(text_bytes()));
    let h = harness(primary, FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    let report = h.sync.save(&mut resource).await.unwrap();

    assert_eq!(report.preview, StageOutcome::Failed("validation"));
    assert_eq!(resource.preview, None);

    let stored = h.catalog.get_resource("flood-maps").await.unwrap().unwrap();
    assert_eq!(stored.preview, None);
    assert_eq!(stored.min_zoom, Some(3));
}

#[tokio::test]
async fn test_unreachable_server_still_saves() {
    let h = harness(FakeWms::unreachable(), FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    resource.description = "Typed by hand".to_string();
    let report = h.sync.save(&mut resource).await.unwrap();

    assert_eq!(report.capabilities, StageOutcome::Failed("transport"));
    assert_eq!(report.preview, StageOutcome::Failed("transport"));
    assert!(!report.zoom_applied);

    let stored = h.catalog.get_resource("flood-maps").await.unwrap().unwrap();
    assert_eq!(stored.description, "Typed by hand");
    assert_eq!(stored.bounding_box(), None);
    assert_eq!(stored.zoom, None);
    assert_eq!(stored.max_zoom, Some(19));
    assert!(h.catalog.layer_names("flood-maps").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_server_with_user_bounds_skips_zoom() {
    let h = harness(FakeWms::unreachable(), FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    resource.north = Some(6.0);
    resource.east = Some(141.0);
    resource.south = Some(-11.0);
    resource.west = Some(95.0);
    h.sync.save(&mut resource).await.unwrap();

    assert_eq!(resource.min_zoom, None);
    assert_eq!(resource.zoom, None);
}

#[tokio::test]
async fn test_service_exception_counts_as_unavailable() {
    let exception = exception_report("InvalidRequest", "maintenance");
    let primary = FakeWms::new(Some(exception), MapReply::Fail);
    let h = harness(primary, FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    let report = h.sync.save(&mut resource).await.unwrap();

    assert_eq!(report.capabilities, StageOutcome::Failed("service"));
    assert!(h.catalog.get_resource("flood-maps").await.unwrap().is_some());
}

#[tokio::test]
async fn test_persistence_error_propagates() {
    let primary = FakeWms::serving(MapReply::Image(png_bytes(8, 8)));
    let h = harness(primary, FakeWms::unreachable()).await;

    h.sync.save(&mut flood_maps()).await.unwrap();

    let mut duplicate = flood_maps();
    duplicate.slug = "flood-maps-2".to_string();
    let err = h.sync.save(&mut duplicate).await.unwrap_err();

    assert!(matches!(err, WmsError::Persistence(_)));
    assert!(h.catalog.get_resource("flood-maps-2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_resource_is_rejected_before_saving() {
    let h = harness(FakeWms::unreachable(), FakeWms::unreachable()).await;

    let mut blank = WmsResource::new("   ", "http://maps.example.com/wms");
    assert!(matches!(
        h.sync.save(&mut blank).await,
        Err(WmsError::InvalidParameter { .. })
    ));

    let mut symbols = WmsResource::new("!!!", "http://maps.example.com/wms");
    assert!(matches!(
        h.sync.save(&mut symbols).await,
        Err(WmsError::InvalidParameter { .. })
    ));

    let mut zoom = flood_maps();
    zoom.zoom = Some(20);
    assert!(matches!(
        h.sync.save(&mut zoom).await,
        Err(WmsError::InvalidParameter { .. })
    ));

    assert!(h.catalog.list_resources().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_fetches_new_preview() {
    let primary = FakeWms::serving(MapReply::Image(png_bytes(8, 8)));
    let h = harness(primary.clone(), FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    h.sync.save(&mut resource).await.unwrap();
    let report = h.sync.refresh(&mut resource).await.unwrap();

    assert_eq!(report.preview, StageOutcome::Completed);
    assert!(resource.preview.is_some());
    assert_eq!(primary.map_requests().len(), 2);
}

#[tokio::test]
async fn test_credentials_are_passed_through() {
    let primary = FakeWms::serving(MapReply::Image(png_bytes(8, 8)));
    let h = harness(primary.clone(), FakeWms::unreachable()).await;

    let mut resource = flood_maps();
    resource.username = Some("analyst".to_string());
    resource.password = Some("secret".to_string());
    h.sync.save(&mut resource).await.unwrap();

    let seen = primary.credentials_seen.lock().unwrap().clone();
    assert_eq!(
        seen.first().cloned().flatten(),
        Some(Credentials {
            username: "analyst".to_string(),
            password: Some("secret".to_string()),
        })
    );
}
