//! WMS GetMap request construction.

use serde::{Deserialize, Serialize};

use wms_common::{BoundingBox, WmsError, WmsResult};

use crate::capabilities::{Capabilities, WmsVersion};

/// Coordinate system used for previews.
pub const PREVIEW_SRS: &str = "EPSG:4326";

/// Preview image edge length in pixels.
pub const PREVIEW_SIZE: u32 = 300;

/// Format requested when the server offers it.
pub const PREFERRED_FORMAT: &str = "image/jpeg";

/// GetMap request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetMapRequest {
    pub layers: Vec<String>,
    pub styles: Vec<String>,
    pub srs: String,

    /// Extent in `srs` units, always west, south, east, north
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub transparent: bool,
    pub version: WmsVersion,

    /// GetMap endpoint advertised in the capabilities, if any
    pub endpoint: Option<String>,
}

impl GetMapRequest {
    /// A 300x300 transparent EPSG:4326 request with default styles.
    pub fn preview(layers: Vec<String>, bbox: BoundingBox, format: impl Into<String>) -> Self {
        Self {
            layers,
            styles: Vec::new(),
            srs: PREVIEW_SRS.to_string(),
            bbox,
            width: PREVIEW_SIZE,
            height: PREVIEW_SIZE,
            format: format.into(),
            transparent: true,
            version: WmsVersion::V1_1_1,
            endpoint: None,
        }
    }

    /// Target the version and GetMap endpoint the server advertised.
    pub fn for_capabilities(mut self, caps: &Capabilities) -> Self {
        self.version = caps.version;
        self.endpoint = caps.get_map_url.clone();
        self
    }

    /// Styles list with one entry per layer.
    ///
    /// A list whose length differs from the layers list is replaced by empty
    /// (default) style names.
    pub fn padded_styles(&self) -> Vec<String> {
        if self.styles.len() == self.layers.len() {
            self.styles.clone()
        } else {
            vec![String::new(); self.layers.len()]
        }
    }

    /// Key-value pairs for a GetMap request at `self.version`.
    ///
    /// WMS 1.3.0 uses `CRS` and lat,lon axis order for EPSG:4326.
    pub fn to_kvp(&self) -> Vec<(&'static str, String)> {
        let bbox = match self.version {
            WmsVersion::V1_3_0 if self.srs.eq_ignore_ascii_case("EPSG:4326") => {
                self.bbox.swapped_axes()
            }
            _ => self.bbox,
        };

        vec![
            ("SERVICE", "WMS".to_string()),
            ("VERSION", self.version.as_str().to_string()),
            ("REQUEST", "GetMap".to_string()),
            ("LAYERS", self.layers.join(",")),
            ("STYLES", self.padded_styles().join(",")),
            (self.version.crs_param(), self.srs.clone()),
            ("BBOX", bbox.to_wms_string()),
            ("WIDTH", self.width.to_string()),
            ("HEIGHT", self.height.to_string()),
            ("FORMAT", self.format.clone()),
            ("TRANSPARENT", bool_param(self.transparent).to_uppercase()),
        ]
    }

    /// A WMS 1.1.1 GetMap URL built by appending parameters to `base`.
    ///
    /// Parameters are appended unencoded in a fixed order: BBOX, SRS,
    /// HEIGHT, WIDTH, TRANSPARENT, FORMAT, STYLES, LAYERS, VERSION, REQUEST,
    /// SERVICE. The styles list is sent as given, without padding.
    ///
    /// Values are not percent-encoded: a layer or style name containing
    /// `&`, `#` or `=` produces a URL the server will split differently.
    /// Use the structured client for such names.
    pub fn direct_url(&self, base: &str) -> String {
        let params = [
            ("BBOX", self.bbox.to_wms_string()),
            ("SRS", self.srs.clone()),
            ("HEIGHT", self.height.to_string()),
            ("WIDTH", self.width.to_string()),
            ("TRANSPARENT", bool_param(self.transparent).to_string()),
            ("FORMAT", self.format.clone()),
            ("STYLES", self.styles.join(",")),
            ("LAYERS", self.layers.join(",")),
            ("VERSION", WmsVersion::V1_1_1.as_str().to_string()),
            ("REQUEST", "GetMap".to_string()),
            ("SERVICE", "WMS".to_string()),
        ];

        let mut url = base.to_string();
        let mut separator = if !base.contains('?') {
            "?"
        } else if base.ends_with('?') || base.ends_with('&') {
            ""
        } else {
            "&"
        };

        for (key, value) in params {
            url.push_str(separator);
            url.push_str(key);
            url.push('=');
            url.push_str(&value);
            separator = "&";
        }

        url
    }
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Pick the GetMap output format: JPEG when offered, else the first offered.
pub fn negotiate_format(offered: &[String]) -> WmsResult<String> {
    if offered.iter().any(|f| f == PREFERRED_FORMAT) {
        return Ok(PREFERRED_FORMAT.to_string());
    }
    offered.first().cloned().ok_or(WmsError::FormatUnavailable)
}

/// File extension for a MIME type: its subtype without parameters or
/// structured-syntax suffix ("image/png; mode=8bit" -> "png").
pub fn format_extension(mime: &str) -> String {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    let subtype = essence.rsplit('/').next().unwrap_or(essence);
    let subtype = subtype.split('+').next().unwrap_or(subtype);

    let extension: String = subtype
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    if extension.is_empty() {
        "img".to_string()
    } else {
        extension
    }
}
