//! WMS GetCapabilities document parsing.
//!
//! Reads both `WMT_MS_Capabilities` (1.1.1) and `WMS_Capabilities` (1.3.0)
//! documents into a [`Capabilities`] model. Only named layers are exposed;
//! nested layers inherit the parent's geographic bounds and styles.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use wms_common::{BoundingBox, WmsError, WmsResult};

use crate::exceptions;

/// Protocol version of a capabilities document or GetMap request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WmsVersion {
    #[default]
    #[serde(rename = "1.1.1")]
    V1_1_1,
    #[serde(rename = "1.3.0")]
    V1_3_0,
}

impl WmsVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            WmsVersion::V1_1_1 => "1.1.1",
            WmsVersion::V1_3_0 => "1.3.0",
        }
    }

    /// Name of the coordinate system parameter in GetMap.
    pub fn crs_param(&self) -> &'static str {
        match self {
            WmsVersion::V1_1_1 => "SRS",
            WmsVersion::V1_3_0 => "CRS",
        }
    }
}

/// Parsed capabilities of a remote WMS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub version: WmsVersion,

    /// Service title
    pub title: Option<String>,

    /// Service abstract
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,

    /// Named layers keyed by layer name
    pub layers: BTreeMap<String, LayerCapabilities>,

    /// Output formats advertised for GetMap, in document order
    pub get_map_formats: Vec<String>,

    /// HTTP GET endpoint advertised for GetMap
    pub get_map_url: Option<String>,
}

/// A named layer as advertised in the capabilities document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerCapabilities {
    pub name: String,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,

    /// WGS84 extent: west, south, east, north
    pub bbox_wgs84: Option<BoundingBox>,

    /// Styles keyed by style name (possibly empty)
    pub styles: BTreeMap<String, StyleCapabilities>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleCapabilities {
    pub title: Option<String>,
    pub legend_url: Option<String>,
}

impl Capabilities {
    /// Parse a capabilities document.
    ///
    /// A service exception report yields [`WmsError::Service`]; anything that
    /// is not a WMS capabilities document yields [`WmsError::Protocol`].
    pub fn parse(xml: &str) -> WmsResult<Self> {
        CapabilitiesParser::default().run(xml)
    }

    /// Names of all advertised layers.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, Default)]
struct LayerFrame {
    name: Option<String>,
    title: Option<String>,
    abstract_text: Option<String>,
    bbox: Option<BoundingBox>,
    geo: GeoEdges,
    styles: BTreeMap<String, StyleCapabilities>,
}

#[derive(Debug, Clone, Default)]
struct StyleFrame {
    name: String,
    title: Option<String>,
    legend_url: Option<String>,
}

/// Edges of a 1.3.0 `EX_GeographicBoundingBox`, filled element by element.
#[derive(Debug, Clone, Copy, Default)]
struct GeoEdges {
    west: Option<f64>,
    east: Option<f64>,
    south: Option<f64>,
    north: Option<f64>,
}

impl GeoEdges {
    fn complete(&self) -> Option<BoundingBox> {
        Some(BoundingBox::new(
            self.west?,
            self.south?,
            self.east?,
            self.north?,
        ))
    }
}

#[derive(Default)]
struct CapabilitiesParser {
    caps: Option<Capabilities>,
    path: Vec<String>,
    text: String,
    layers: Vec<LayerFrame>,
    style: Option<StyleFrame>,
}

impl CapabilitiesParser {
    fn run(mut self, xml: &str) -> WmsResult<Capabilities> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                WmsError::Protocol(format!(
                    "XML parsing error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            })?;

            match event {
                Event::Start(e) => {
                    let name = local_name(&e);
                    if self.path.is_empty() {
                        self.open_root(&e, &name, xml)?;
                    }
                    self.open(&e, &name)?;
                    self.path.push(name);
                    self.text.clear();
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    if self.path.is_empty() {
                        self.open_root(&e, &name, xml)?;
                    }
                    self.open(&e, &name)?;
                    self.close(&name);
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| WmsError::Protocol(format!("Invalid text: {}", e)))?;
                    self.text.push_str(&text);
                }
                Event::CData(t) => {
                    self.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
                Event::End(_) => {
                    let name = self.path.pop().unwrap_or_default();
                    self.close(&name);
                    self.text.clear();
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        self.caps.ok_or_else(|| {
            WmsError::Protocol("Response is not a WMS capabilities document".to_string())
        })
    }

    fn open_root(&mut self, e: &BytesStart, name: &str, xml: &str) -> WmsResult<()> {
        let version = match name {
            "WMT_MS_Capabilities" => WmsVersion::V1_1_1,
            "WMS_Capabilities" => WmsVersion::V1_3_0,
            "ServiceExceptionReport" | "ExceptionReport" => {
                return Err(exceptions::service_error(xml));
            }
            other => {
                return Err(WmsError::Protocol(format!(
                    "Unexpected root element <{}>, expected WMS capabilities",
                    other
                )));
            }
        };

        // The version attribute wins when the server states one we know.
        let version = match attribute(e, b"version")?.as_deref() {
            Some("1.3.0") => WmsVersion::V1_3_0,
            Some("1.1.1") | Some("1.1.0") => WmsVersion::V1_1_1,
            _ => version,
        };

        self.caps = Some(Capabilities {
            version,
            ..Capabilities::default()
        });
        Ok(())
    }

    fn parent(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }

    fn open(&mut self, e: &BytesStart, name: &str) -> WmsResult<()> {
        match name {
            "Layer" => {
                let inherited = self
                    .layers
                    .last()
                    .map(|parent| LayerFrame {
                        bbox: parent.bbox,
                        styles: parent.styles.clone(),
                        ..LayerFrame::default()
                    })
                    .unwrap_or_default();
                self.layers.push(inherited);
            }
            "Style" if self.parent() == Some("Layer") => {
                self.style = Some(StyleFrame::default());
            }
            "LatLonBoundingBox" if self.parent() == Some("Layer") => {
                let edges = [
                    attribute(e, b"minx")?,
                    attribute(e, b"miny")?,
                    attribute(e, b"maxx")?,
                    attribute(e, b"maxy")?,
                ];
                let parsed: Option<Vec<f64>> = edges
                    .iter()
                    .map(|v| v.as_deref().and_then(|s| s.trim().parse().ok()))
                    .collect();
                if let (Some(v), Some(layer)) = (parsed, self.layers.last_mut()) {
                    layer.bbox = Some(BoundingBox::new(v[0], v[1], v[2], v[3]));
                }
            }
            "EX_GeographicBoundingBox" if self.parent() == Some("Layer") => {
                if let Some(layer) = self.layers.last_mut() {
                    layer.geo = GeoEdges::default();
                }
            }
            "OnlineResource" => {
                let href = attribute(e, b"href")?;
                if self.parent() == Some("LegendURL") {
                    if let Some(style) = self.style.as_mut() {
                        style.legend_url = href;
                    }
                } else if self.parent() == Some("Get") && self.path.iter().any(|p| p == "GetMap")
                {
                    if let Some(caps) = self.caps.as_mut() {
                        if caps.get_map_url.is_none() {
                            caps.get_map_url = href;
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &str) {
        let text = self.text.trim().to_string();
        let parent = self.parent().map(str::to_string);

        match (name, parent.as_deref()) {
            ("Title", Some("Service")) => {
                if let Some(caps) = self.caps.as_mut() {
                    caps.title = non_empty(text);
                }
            }
            ("Abstract", Some("Service")) => {
                if let Some(caps) = self.caps.as_mut() {
                    caps.abstract_text = non_empty(text);
                }
            }
            ("Format", Some("GetMap")) => {
                if let Some(caps) = self.caps.as_mut() {
                    if !text.is_empty() {
                        caps.get_map_formats.push(text);
                    }
                }
            }
            ("Name", Some("Layer")) => {
                if let Some(layer) = self.layers.last_mut() {
                    layer.name = non_empty(text);
                }
            }
            ("Title", Some("Layer")) => {
                if let Some(layer) = self.layers.last_mut() {
                    layer.title = non_empty(text);
                }
            }
            ("Abstract", Some("Layer")) => {
                if let Some(layer) = self.layers.last_mut() {
                    layer.abstract_text = non_empty(text);
                }
            }
            ("Name", Some("Style")) => {
                if let Some(style) = self.style.as_mut() {
                    style.name = text;
                }
            }
            ("Title", Some("Style")) => {
                if let Some(style) = self.style.as_mut() {
                    style.title = non_empty(text);
                }
            }
            (edge, Some("EX_GeographicBoundingBox")) => {
                let value = text.parse::<f64>().ok();
                if let Some(layer) = self.layers.last_mut() {
                    match edge {
                        "westBoundLongitude" => layer.geo.west = value,
                        "eastBoundLongitude" => layer.geo.east = value,
                        "southBoundLatitude" => layer.geo.south = value,
                        "northBoundLatitude" => layer.geo.north = value,
                        _ => {}
                    }
                }
            }
            ("EX_GeographicBoundingBox", Some("Layer")) => {
                if let Some(layer) = self.layers.last_mut() {
                    if let Some(bbox) = layer.geo.complete() {
                        layer.bbox = Some(bbox);
                    }
                }
            }
            ("Style", Some("Layer")) => {
                if let (Some(style), Some(layer)) = (self.style.take(), self.layers.last_mut()) {
                    layer.styles.insert(
                        style.name,
                        StyleCapabilities {
                            title: style.title,
                            legend_url: style.legend_url,
                        },
                    );
                }
            }
            ("Layer", _) => {
                let Some(frame) = self.layers.pop() else {
                    return;
                };
                let (Some(name), Some(caps)) = (frame.name, self.caps.as_mut()) else {
                    return;
                };
                caps.layers.insert(
                    name.clone(),
                    LayerCapabilities {
                        name,
                        title: frame.title,
                        abstract_text: frame.abstract_text,
                        bbox_wgs84: frame.bbox,
                        styles: frame.styles,
                    },
                );
            }
            _ => {}
        }
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Value of the attribute whose local name is `key`, ignoring prefixes.
pub(crate) fn attribute(e: &BytesStart, key: &[u8]) -> WmsResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| WmsError::Protocol(format!("Invalid attribute: {}", e)))?;
        if attr.key.local_name().as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| WmsError::Protocol(format!("Invalid attribute value: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
