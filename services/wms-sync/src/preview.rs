//! Preview image acquisition.
//!
//! A 300x300 EPSG:4326 rendering of the resource's extent is requested from
//! the structured client first and, if that fails, from the direct-URL
//! client. Only bytes that decode as an image are stored.

use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use metrics::counter;
use rand::seq::SliceRandom;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use storage::ObjectStorage;
use wms_common::{WmsError, WmsResource, WmsResult};
use wms_protocol::{format_extension, negotiate_format, Capabilities, GetMapRequest};

use crate::client::WmsService;

/// Object storage prefix for preview images.
pub const PREVIEW_DIR: &str = "wms_preview";

/// Which client produced the preview bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStrategy {
    Structured,
    Direct,
}

impl PreviewStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Direct => "direct",
        }
    }
}

/// A validated preview written to object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPreview {
    /// Object storage key, also stored as the resource's preview reference
    pub key: String,
    pub format: String,
    pub strategy: PreviewStrategy,
    pub size: usize,
}

/// Fetches, validates and stores preview images.
pub struct PreviewFetcher {
    primary: Arc<dyn WmsService>,
    fallback: Arc<dyn WmsService>,
    storage: Arc<ObjectStorage>,
}

impl PreviewFetcher {
    pub fn new(
        primary: Arc<dyn WmsService>,
        fallback: Arc<dyn WmsService>,
        storage: Arc<ObjectStorage>,
    ) -> Self {
        Self {
            primary,
            fallback,
            storage,
        }
    }

    /// Produce and store a preview for `resource`.
    ///
    /// `known_layers` are the resource's catalogued layer names; when empty,
    /// one advertised layer is picked at random. `caps` avoids a second
    /// capabilities request when the caller already has one.
    #[instrument(skip_all, fields(slug = %resource.slug))]
    pub async fn fetch(
        &self,
        resource: &WmsResource,
        known_layers: Vec<String>,
        caps: Option<&Capabilities>,
    ) -> WmsResult<StoredPreview> {
        let credentials = resource.credentials();

        let fetched;
        let caps = match caps {
            Some(caps) => caps,
            None => {
                fetched = self
                    .primary
                    .capabilities(&resource.uri, credentials.as_ref())
                    .await?;
                &fetched
            }
        };

        let layers = if known_layers.is_empty() {
            vec![random_layer(caps)?]
        } else {
            known_layers
        };

        let format = negotiate_format(&caps.get_map_formats)?;
        let bbox = resource
            .bounding_box()
            .ok_or_else(|| WmsError::invalid("bbox", "preview needs a complete bounding box"))?;

        let request = GetMapRequest::preview(layers, bbox, format.clone()).for_capabilities(caps);
        debug!(layers = %request.layers.join(","), format = %format, "Requesting preview");

        let (bytes, strategy) = match self
            .primary
            .get_map(&resource.uri, credentials.as_ref(), &request)
            .await
        {
            Ok(bytes) => {
                record(PreviewStrategy::Structured, "success");
                (bytes, PreviewStrategy::Structured)
            }
            Err(e) => {
                record(PreviewStrategy::Structured, e.kind());
                warn!(error = %e, kind = e.kind(), "Structured GetMap failed, trying direct URL");

                match self
                    .fallback
                    .get_map(&resource.uri, credentials.as_ref(), &request)
                    .await
                {
                    Ok(bytes) => {
                        record(PreviewStrategy::Direct, "success");
                        (bytes, PreviewStrategy::Direct)
                    }
                    Err(e) => {
                        record(PreviewStrategy::Direct, e.kind());
                        return Err(e);
                    }
                }
            }
        };

        let size = bytes.len();
        let bytes = validate_image(bytes).await?;

        let key = preview_key(&resource.slug, Utc::now(), &format_extension(&format));
        self.storage.put(&key, bytes).await?;

        info!(key = %key, strategy = strategy.as_str(), size, "Stored preview");
        Ok(StoredPreview {
            key,
            format,
            strategy,
            size,
        })
    }
}

fn record(strategy: PreviewStrategy, outcome: &'static str) {
    counter!(
        "wms_preview_fetch_total",
        "strategy" => strategy.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

fn random_layer(caps: &Capabilities) -> WmsResult<String> {
    caps.layer_names()
        .choose(&mut rand::thread_rng())
        .map(|name| name.to_string())
        .ok_or_else(|| WmsError::Protocol("Capabilities advertise no named layers".to_string()))
}

/// Storage key `wms_preview/<slug>_<YYYYMMDD_HHMMSS>.<ext>` (UTC).
pub fn preview_key(slug: &str, at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{}/{}_{}.{}",
        PREVIEW_DIR,
        slug,
        at.format("%Y%m%d_%H%M%S"),
        extension
    )
}

/// Check that `bytes` decode as an image of a recognised type.
///
/// The bytes go through a temporary file that is removed on return.
pub async fn validate_image(bytes: Bytes) -> WmsResult<Bytes> {
    tokio::task::spawn_blocking(move || -> WmsResult<Bytes> {
        decode_via_tempfile(&bytes)?;
        Ok(bytes)
    })
    .await
    .map_err(|e| WmsError::Storage(format!("Validation task failed: {}", e)))?
}

fn decode_via_tempfile(bytes: &[u8]) -> WmsResult<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(bytes)?;
    file.flush()?;

    let reader = image::io::Reader::open(file.path())?.with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| WmsError::Validation("unrecognised image type".to_string()))?;

    reader
        .decode()
        .map_err(|e| WmsError::Validation(format!("{:?} data does not decode: {}", format, e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_utils::{jpeg_bytes, png_bytes, text_bytes, truncated_png_bytes};

    #[test]
    fn test_preview_key() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(
            preview_key("flood-maps", at, "jpeg"),
            "wms_preview/flood-maps_20240305_070809.jpeg"
        );
    }

    #[tokio::test]
    async fn test_validate_accepts_images() {
        assert!(validate_image(Bytes::from(png_bytes(8, 8))).await.is_ok());
        assert!(validate_image(Bytes::from(jpeg_bytes(8, 8))).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_rejects_text() {
        let err = validate_image(Bytes::from(text_bytes())).await.unwrap_err();
        assert!(matches!(err, WmsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_validate_rejects_truncated() {
        let err = validate_image(Bytes::from(truncated_png_bytes()))
            .await
            .unwrap_err();
        assert!(matches!(err, WmsError::Validation(_)));
    }

    #[test]
    fn test_random_layer() {
        let caps = Capabilities::parse(&test_utils::two_layer_service().to_xml_130()).unwrap();
        let name = random_layer(&caps).unwrap();
        assert!(name == "a" || name == "b");

        assert!(matches!(
            random_layer(&Capabilities::default()),
            Err(WmsError::Protocol(_))
        ));
    }
}
