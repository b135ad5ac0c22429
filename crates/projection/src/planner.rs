//! Tile ranges covering a geographic rectangle.

use map_common::{GeoPoint, TileRegion};

use crate::mercator::EllipsoidalMercator;

/// Plans the tile regions to fetch for a pair of corners.
#[derive(Debug, Clone, Copy, Default)]
pub struct TilePlanner {
    projection: EllipsoidalMercator,
}

impl TilePlanner {
    pub fn new(projection: EllipsoidalMercator) -> Self {
        Self { projection }
    }

    /// Inclusive tile rectangle covering both corners at `zoom`.
    ///
    /// The corners may be given in any order.
    pub fn plan(&self, corner1: &GeoPoint, corner2: &GeoPoint, zoom: u32) -> TileRegion {
        TileRegion::spanning(
            self.projection.project(corner1, zoom),
            self.projection.project(corner2, zoom),
        )
    }
}

/// Plan with the WGS84 ellipsoid.
pub fn plan(corner1: &GeoPoint, corner2: &GeoPoint, zoom: u32) -> TileRegion {
    TilePlanner::default().plan(corner1, corner2, zoom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_moscow_center() {
        let region = plan(
            &GeoPoint::new(55.70, 37.50),
            &GeoPoint::new(55.80, 37.70),
            15,
        );
        assert_eq!(region.zoom, 15);
        assert_eq!((region.min_x, region.max_x), (19797, 19815));
        assert_eq!((region.min_y, region.max_y), (10265, 10281));
        assert_eq!(region.width(), 19);
        assert_eq!(region.height(), 17);
    }
}
