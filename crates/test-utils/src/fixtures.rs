//! Capabilities and exception documents for tests.
//!
//! [`FixtureService`] renders the same service description as either a
//! WMS 1.1.1 or a WMS 1.3.0 capabilities document.

/// Common bounding boxes as (west, south, east, north).
pub mod bbox {
    /// Whole world
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Indonesian archipelago
    pub const INDONESIA: (f64, f64, f64, f64) = (95.0, -11.0, 141.0, 6.0);

    /// Greater Jakarta
    pub const JAKARTA: (f64, f64, f64, f64) = (106.4, -6.6, 107.2, -5.9);

    /// Single point (degenerate bbox)
    pub const POINT: (f64, f64, f64, f64) = (106.8, -6.2, 106.8, -6.2);
}

/// A layer advertised by a [`FixtureService`].
#[derive(Debug, Clone, Default)]
pub struct FixtureLayer {
    pub name: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub bbox: Option<(f64, f64, f64, f64)>,
    /// (name, title, legend URL)
    pub styles: Vec<(String, Option<String>, Option<String>)>,
}

impl FixtureLayer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn abstract_text(mut self, text: &str) -> Self {
        self.abstract_text = Some(text.to_string());
        self
    }

    pub fn bbox(mut self, bbox: (f64, f64, f64, f64)) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn style(mut self, name: &str, title: Option<&str>, legend: Option<&str>) -> Self {
        self.styles.push((
            name.to_string(),
            title.map(str::to_string),
            legend.map(str::to_string),
        ));
        self
    }
}

/// A fake WMS service description.
#[derive(Debug, Clone)]
pub struct FixtureService {
    pub title: String,
    pub abstract_text: Option<String>,
    pub formats: Vec<String>,
    pub get_map_url: Option<String>,
    pub layers: Vec<FixtureLayer>,
}

impl Default for FixtureService {
    fn default() -> Self {
        Self {
            title: "Fixture WMS".to_string(),
            abstract_text: None,
            formats: vec!["image/png".to_string(), "image/jpeg".to_string()],
            get_map_url: None,
            layers: Vec::new(),
        }
    }
}

impl FixtureService {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn abstract_text(mut self, text: &str) -> Self {
        self.abstract_text = Some(text.to_string());
        self
    }

    pub fn formats(mut self, formats: &[&str]) -> Self {
        self.formats = formats.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn get_map_url(mut self, url: &str) -> Self {
        self.get_map_url = Some(url.to_string());
        self
    }

    pub fn layer(mut self, layer: FixtureLayer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Render as a WMS 1.1.1 `WMT_MS_Capabilities` document.
    pub fn to_xml_111(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE WMT_MS_Capabilities SYSTEM \"http://schemas.opengis.net/wms/1.1.1/WMS_MS_Capabilities.dtd\">\n\
             <WMT_MS_Capabilities version=\"1.1.1\" xmlns:xlink=\"http://www.w3.org/1999/xlink\">\n",
        );
        self.push_service(&mut xml);
        self.push_request(&mut xml, "application/vnd.ogc.wms_xml");

        xml.push_str("    <Layer>\n      <Title>Root</Title>\n      <SRS>EPSG:4326</SRS>\n");
        for layer in &self.layers {
            xml.push_str("      <Layer queryable=\"0\">\n");
            push_layer_text(&mut xml, layer);
            if let Some((w, s, e, n)) = layer.bbox {
                xml.push_str(&format!(
                    "        <LatLonBoundingBox minx=\"{}\" miny=\"{}\" maxx=\"{}\" maxy=\"{}\"/>\n",
                    w, s, e, n
                ));
            }
            push_styles(&mut xml, layer);
            xml.push_str("      </Layer>\n");
        }
        xml.push_str("    </Layer>\n  </Capability>\n</WMT_MS_Capabilities>\n");
        xml
    }

    /// Render as a WMS 1.3.0 `WMS_Capabilities` document.
    pub fn to_xml_130(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <WMS_Capabilities version=\"1.3.0\" xmlns=\"http://www.opengis.net/wms\" \
             xmlns:xlink=\"http://www.w3.org/1999/xlink\">\n",
        );
        self.push_service(&mut xml);
        self.push_request(&mut xml, "text/xml");

        xml.push_str("    <Layer>\n      <Title>Root</Title>\n      <CRS>EPSG:4326</CRS>\n");
        for layer in &self.layers {
            xml.push_str("      <Layer queryable=\"1\">\n");
            push_layer_text(&mut xml, layer);
            if let Some((w, s, e, n)) = layer.bbox {
                xml.push_str(&format!(
                    "        <EX_GeographicBoundingBox>\n\
                     \x20         <westBoundLongitude>{}</westBoundLongitude>\n\
                     \x20         <eastBoundLongitude>{}</eastBoundLongitude>\n\
                     \x20         <southBoundLatitude>{}</southBoundLatitude>\n\
                     \x20         <northBoundLatitude>{}</northBoundLatitude>\n\
                     \x20       </EX_GeographicBoundingBox>\n",
                    w, e, s, n
                ));
            }
            push_styles(&mut xml, layer);
            xml.push_str("      </Layer>\n");
        }
        xml.push_str("    </Layer>\n  </Capability>\n</WMS_Capabilities>\n");
        xml
    }

    fn push_service(&self, xml: &mut String) {
        xml.push_str("  <Service>\n    <Name>WMS</Name>\n");
        xml.push_str(&format!("    <Title>{}</Title>\n", escape(&self.title)));
        if let Some(text) = &self.abstract_text {
            xml.push_str(&format!("    <Abstract>{}</Abstract>\n", escape(text)));
        }
        xml.push_str("  </Service>\n");
    }

    fn push_request(&self, xml: &mut String, capabilities_format: &str) {
        xml.push_str("  <Capability>\n    <Request>\n      <GetCapabilities>\n");
        xml.push_str(&format!("        <Format>{}</Format>\n", capabilities_format));
        xml.push_str("      </GetCapabilities>\n      <GetMap>\n");
        for format in &self.formats {
            xml.push_str(&format!("        <Format>{}</Format>\n", escape(format)));
        }
        if let Some(url) = &self.get_map_url {
            xml.push_str(&format!(
                "        <DCPType><HTTP><Get><OnlineResource xlink:type=\"simple\" xlink:href=\"{}\"/></Get></HTTP></DCPType>\n",
                escape(url)
            ));
        }
        xml.push_str("      </GetMap>\n    </Request>\n");
    }
}

fn push_layer_text(xml: &mut String, layer: &FixtureLayer) {
    xml.push_str(&format!("        <Name>{}</Name>\n", escape(&layer.name)));
    if let Some(title) = &layer.title {
        xml.push_str(&format!("        <Title>{}</Title>\n", escape(title)));
    }
    if let Some(text) = &layer.abstract_text {
        xml.push_str(&format!("        <Abstract>{}</Abstract>\n", escape(text)));
    }
}

fn push_styles(xml: &mut String, layer: &FixtureLayer) {
    for (name, title, legend) in &layer.styles {
        xml.push_str("        <Style>\n");
        xml.push_str(&format!("          <Name>{}</Name>\n", escape(name)));
        if let Some(title) = title {
            xml.push_str(&format!("          <Title>{}</Title>\n", escape(title)));
        }
        if let Some(legend) = legend {
            xml.push_str(&format!(
                "          <LegendURL width=\"20\" height=\"20\"><Format>image/png</Format>\
                 <OnlineResource xlink:type=\"simple\" xlink:href=\"{}\"/></LegendURL>\n",
                escape(legend)
            ));
        }
        xml.push_str("        </Style>\n");
    }
}

/// A WMS 1.1.1 service exception report.
pub fn exception_report(code: &str, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <ServiceExceptionReport version=\"1.1.1\">\n\
         \x20 <ServiceException code=\"{}\">{}</ServiceException>\n\
         </ServiceExceptionReport>\n",
        escape(code),
        escape(message)
    )
}

/// Two layers with disjoint extents around Jakarta and Papua.
pub fn two_layer_service() -> FixtureService {
    FixtureService::new("Flood Maps")
        .abstract_text("Flood hazard layers for Indonesia")
        .layer(
            FixtureLayer::new("a")
                .title("Jakarta flood depth")
                .abstract_text("Modelled depth in metres")
                .bbox((106.0, -7.0, 107.0, -6.0))
                .style("depth", Some("Depth ramp"), Some("http://maps.example.com/legend/depth.png"))
                .style("", Some("Unnamed"), None),
        )
        .layer(
            FixtureLayer::new("b")
                .title("Papua flood extent")
                .bbox((138.0, -5.0, 141.0, -2.0)),
        )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
