//! Registered WMS resources.

use serde::{Deserialize, Serialize};

use crate::{min_zoom_for_span, BoundingBox, WmsError, WmsResult, MAX_ZOOM};

/// One external map service registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmsResource {
    /// Stable identifier derived from `name` on first save, never recomputed
    pub slug: String,

    /// Unique display name
    pub name: String,

    /// Base URI of the remote WMS endpoint
    pub uri: String,

    /// Free text; filled from the service abstract when left blank
    #[serde(default)]
    pub description: String,

    /// Object storage key of the preview image
    pub preview: Option<String>,

    pub zoom: Option<u8>,
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,

    /// Bounds in decimal degrees. User-entered values are never overwritten.
    pub north: Option<f64>,
    pub east: Option<f64>,
    pub south: Option<f64>,
    pub west: Option<f64>,

    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

/// HTTP basic credentials for a remote WMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl WmsResource {
    /// New unsaved resource; the slug is assigned on first save.
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            slug: String::new(),
            name: name.into(),
            uri: uri.into(),
            description: String::new(),
            preview: None,
            zoom: None,
            min_zoom: None,
            max_zoom: Some(MAX_ZOOM),
            north: None,
            east: None,
            south: None,
            west: None,
            username: None,
            password: None,
        }
    }

    /// Assign the slug from the name if it has none yet.
    pub fn ensure_slug(&mut self) -> &str {
        if self.slug.is_empty() {
            self.slug = slugify(&self.name);
        }
        &self.slug
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.username
            .as_ref()
            .filter(|u| !u.is_empty())
            .map(|username| Credentials {
                username: username.clone(),
                password: self.password.clone(),
            })
    }

    /// The bounds as a box, if all four edges are known.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        Some(BoundingBox::new(
            self.west?,
            self.south?,
            self.east?,
            self.north?,
        ))
    }

    /// Copy edges of `bbox` into whichever bound fields are still unset.
    pub fn fill_missing_bounds(&mut self, bbox: &BoundingBox) {
        if self.north.is_none() {
            self.north = Some(bbox.max_y);
        }
        if self.east.is_none() {
            self.east = Some(bbox.max_x);
        }
        if self.south.is_none() {
            self.south = Some(bbox.min_y);
        }
        if self.west.is_none() {
            self.west = Some(bbox.min_x);
        }
    }

    /// Use `text` as the description if the user left it blank.
    pub fn fill_missing_description(&mut self, text: Option<&str>) {
        if self.description.trim().is_empty() {
            self.description = text.unwrap_or_default().to_string();
        }
    }

    /// Minimum usable zoom for the current bounds.
    pub fn computed_min_zoom(&self) -> WmsResult<u8> {
        let bbox = self
            .bounding_box()
            .ok_or_else(|| WmsError::invalid("bbox", "north, east, south and west must be set"))?;
        Ok(min_zoom_for_span(bbox.span()))
    }

    /// Raise `min_zoom` to the computed minimum, default and clamp `zoom`,
    /// default `max_zoom`. Requires complete bounds.
    ///
    /// A `max_zoom` below the computed minimum is raised to it, so `zoom`
    /// always ends within `min_zoom..=max_zoom`.
    pub fn apply_zoom_policy(&mut self) -> WmsResult<()> {
        let computed = self.computed_min_zoom()?;

        let min_zoom = match self.min_zoom {
            Some(z) if z >= computed => z,
            _ => computed,
        };
        self.min_zoom = Some(min_zoom);

        self.zoom = match self.zoom {
            Some(z) if z >= min_zoom => Some(z),
            _ => Some(min_zoom),
        };

        match self.max_zoom {
            None | Some(0) => self.max_zoom = Some(MAX_ZOOM),
            Some(max) if max < min_zoom => self.max_zoom = Some(min_zoom),
            Some(_) => {}
        }

        Ok(())
    }

    /// Check user-editable fields.
    pub fn validate(&self) -> WmsResult<()> {
        if self.name.trim().is_empty() {
            return Err(WmsError::invalid("name", "must not be blank"));
        }
        if self.uri.trim().is_empty() {
            return Err(WmsError::invalid("uri", "must not be blank"));
        }

        for (param, value) in [
            ("zoom", self.zoom),
            ("min_zoom", self.min_zoom),
            ("max_zoom", self.max_zoom),
        ] {
            if let Some(z) = value {
                if z > MAX_ZOOM {
                    return Err(WmsError::invalid(
                        param,
                        format!("{} is outside 0..={}", z, MAX_ZOOM),
                    ));
                }
            }
        }

        // max_zoom 0 means unset
        if let Some(max) = self.max_zoom.filter(|&z| z > 0) {
            for (param, value) in [("min_zoom", self.min_zoom), ("zoom", self.zoom)] {
                if let Some(z) = value.filter(|&z| z > max) {
                    return Err(WmsError::invalid(
                        param,
                        format!("{} is above max_zoom {}", z, max),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for WmsResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// URL-safe identifier: lowercase ASCII letters, digits, `_` and `-`.
///
/// Runs of whitespace and hyphens collapse to a single hyphen; leading and
/// trailing hyphens/underscores are stripped.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c == '-' || c.is_whitespace() {
            pending_dash = true;
        }
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_bounds(north: f64, east: f64, south: f64, west: f64) -> WmsResource {
        let mut resource = WmsResource::new("Test", "http://example.com/wms");
        resource.north = Some(north);
        resource.east = Some(east);
        resource.south = Some(south);
        resource.west = Some(west);
        resource
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Flood Map"), "flood-map");
        assert_eq!(slugify("  Jakarta -- Flood  2018 "), "jakarta-flood-2018");
        assert_eq!(slugify("OSM (base) layer!"), "osm-base-layer");
        assert_eq!(slugify("_under_score_"), "under_score");
    }

    #[test]
    fn test_slug_is_never_recomputed() {
        let mut resource = WmsResource::new("First Name", "http://example.com/wms");
        resource.ensure_slug();
        resource.name = "Second Name".to_string();
        assert_eq!(resource.ensure_slug(), "first-name");
    }

    #[test]
    fn test_fill_missing_bounds_keeps_user_values() {
        let mut resource = WmsResource::new("Test", "http://example.com/wms");
        resource.north = Some(0.0);
        resource.fill_missing_bounds(&BoundingBox::new(-10.0, -20.0, 30.0, 40.0));

        assert_eq!(resource.north, Some(0.0));
        assert_eq!(resource.east, Some(30.0));
        assert_eq!(resource.south, Some(-20.0));
        assert_eq!(resource.west, Some(-10.0));
    }

    #[test]
    fn test_zoom_policy_defaults() {
        let mut resource = with_bounds(10.0, 10.0, 0.0, 0.0);
        resource.max_zoom = None;
        resource.apply_zoom_policy().unwrap();

        assert_eq!(resource.min_zoom, Some(5));
        assert_eq!(resource.zoom, Some(5));
        assert_eq!(resource.max_zoom, Some(19));
    }

    #[test]
    fn test_zoom_policy_raises_min_and_clamps_zoom() {
        let mut resource = with_bounds(10.0, 10.0, 0.0, 0.0);
        resource.min_zoom = Some(2);
        resource.zoom = Some(3);
        resource.max_zoom = Some(0);
        resource.apply_zoom_policy().unwrap();

        assert_eq!(resource.min_zoom, Some(5));
        assert_eq!(resource.zoom, Some(5));
        assert_eq!(resource.max_zoom, Some(19));
    }

    #[test]
    fn test_zoom_policy_keeps_higher_user_values() {
        let mut resource = with_bounds(10.0, 10.0, 0.0, 0.0);
        resource.min_zoom = Some(8);
        resource.zoom = Some(12);
        resource.max_zoom = Some(15);
        resource.apply_zoom_policy().unwrap();

        assert_eq!(resource.min_zoom, Some(8));
        assert_eq!(resource.zoom, Some(12));
        assert_eq!(resource.max_zoom, Some(15));
    }

    #[test]
    fn test_zoom_policy_raises_max_below_computed_min() {
        let mut resource = with_bounds(10.0, 10.0, 0.0, 0.0);
        resource.max_zoom = Some(4);
        resource.apply_zoom_policy().unwrap();

        assert_eq!(resource.min_zoom, Some(5));
        assert_eq!(resource.zoom, Some(5));
        assert_eq!(resource.max_zoom, Some(5));
    }

    #[test]
    fn test_zoom_policy_requires_bounds() {
        let mut resource = WmsResource::new("Test", "http://example.com/wms");
        resource.north = Some(1.0);
        assert!(matches!(
            resource.apply_zoom_policy(),
            Err(WmsError::InvalidParameter { .. })
        ));
        assert_eq!(resource.min_zoom, None);
    }

    #[test]
    fn test_validate() {
        let mut resource = WmsResource::new("Test", "http://example.com/wms");
        assert!(resource.validate().is_ok());

        resource.zoom = Some(20);
        assert!(resource.validate().is_err());

        resource.zoom = Some(19);
        resource.uri = "  ".to_string();
        assert!(resource.validate().is_err());
    }

    #[test]
    fn test_validate_zoom_above_max_zoom() {
        let mut resource = WmsResource::new("Test", "http://example.com/wms");
        resource.max_zoom = Some(6);
        resource.min_zoom = Some(7);
        assert!(matches!(
            resource.validate(),
            Err(WmsError::InvalidParameter { ref param, .. }) if param == "min_zoom"
        ));

        resource.min_zoom = Some(6);
        resource.zoom = Some(9);
        assert!(matches!(
            resource.validate(),
            Err(WmsError::InvalidParameter { ref param, .. }) if param == "zoom"
        ));

        // 0 leaves max_zoom unset
        resource.max_zoom = Some(0);
        assert!(resource.validate().is_ok());
    }

    #[test]
    fn test_credentials() {
        let mut resource = WmsResource::new("Test", "http://example.com/wms");
        assert!(resource.credentials().is_none());

        resource.username = Some("user".to_string());
        resource.password = Some("secret".to_string());
        let creds = resource.credentials().unwrap();
        assert_eq!(creds.username, "user");
        assert_eq!(creds.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_description_fallback() {
        let mut resource = WmsResource::new("Test", "http://example.com/wms");
        resource.fill_missing_description(Some("Service abstract"));
        assert_eq!(resource.description, "Service abstract");

        resource.fill_missing_description(Some("Other"));
        assert_eq!(resource.description, "Service abstract");
    }
}
