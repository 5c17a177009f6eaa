use gdal::vector::Geometry;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounds of a geometry.
///
/// This is a conservative inclusion test only: everything inside the
/// boundary is inside the extent, but not vice versa. It must never be
/// used as a substitute for an exact geometry predicate.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct SpatialExtent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl SpatialExtent {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    /// Reads the envelope of an OGR geometry.
    pub fn from_geometry(geometry: &Geometry) -> Self {
        let envelope = geometry.envelope();
        Self {
            xmin: envelope.MinX,
            xmax: envelope.MaxX,
            ymin: envelope.MinY,
            ymax: envelope.MaxY,
        }
    }

    /// Rectangle overlap test with another extent.
    pub fn intersects(&self, other: &SpatialExtent) -> bool {
        self.xmin < other.xmax
            && self.xmax > other.xmin
            && self.ymin < other.ymax
            && self.ymax > other.ymin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_from_geometry() {
        let geometry =
            Geometry::from_wkt("POLYGON ((0 0, 0 1, 2 1, 2 0, 0 0))").expect("valid wkt");
        let extent = SpatialExtent::from_geometry(&geometry);
        assert_eq!(extent, SpatialExtent::new(0., 2., 0., 1.));
    }

    #[test]
    fn extent_overlap() {
        let a = SpatialExtent::new(0., 1., 0., 1.);
        let b = SpatialExtent::new(0.5, 1.5, 0., 1.);
        let c = SpatialExtent::new(2., 3., 0., 1.);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
