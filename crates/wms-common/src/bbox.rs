//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in decimal degrees (EPSG:4326).
///
/// `min_x`/`max_x` are the western/eastern longitudes, `min_y`/`max_y` the
/// southern/northern latitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its west, south, east and north edges.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Render as a WMS BBOX value: "minx,miny,maxx,maxy"
    pub fn to_wms_string(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }

    /// Same box with latitude/longitude axes exchanged.
    ///
    /// WMS 1.3.0 orders EPSG:4326 coordinates as lat,lon.
    pub fn swapped_axes(&self) -> Self {
        Self {
            min_x: self.min_y,
            min_y: self.min_x,
            max_x: self.max_y,
            max_y: self.max_x,
        }
    }

    /// Width of the bounding box in degrees.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in degrees.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Largest angular extent along either axis.
    pub fn span(&self) -> f64 {
        self.width().abs().max(self.height().abs())
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Union of every box in `boxes`, or `None` if there are none.
    pub fn aggregate<'a, I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        boxes
            .into_iter()
            .fold(None, |acc: Option<BoundingBox>, bbox| match acc {
                Some(acc) => Some(acc.union(bbox)),
                None => Some(*bbox),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_disjoint() {
        let a = BoundingBox::new(-10.0, -5.0, 0.0, 5.0);
        let b = BoundingBox::new(20.0, 30.0, 40.0, 60.0);

        let union = BoundingBox::aggregate([a, b].iter()).unwrap();
        assert_eq!(union, BoundingBox::new(-10.0, -5.0, 40.0, 60.0));
        assert!(BoundingBox::aggregate(std::iter::empty()).is_none());
    }

    #[test]
    fn test_swapped_axes() {
        let bbox = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
        assert_eq!(bbox.swapped_axes().to_wms_string(), "-90,-180,90,180");
    }
}
