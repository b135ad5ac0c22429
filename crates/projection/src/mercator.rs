//! Ellipsoidal Mercator projection onto the tile pyramid.
//!
//! Unlike spherical Web Mercator (EPSG:3857), the tile service projects
//! latitudes on the WGS84 ellipsoid (EPSG:3395). Longitude still maps
//! linearly onto tile columns, but rows come from the isometric latitude
//! of the ellipsoid:
//!
//! ```text
//! M = tan(π/4 + φ/2) / tan(π/4 + asin(e·sin φ)/2)^e
//! y = a · ln(M)
//! ```
//!
//! The projected northing is then shifted to a top-left origin and scaled
//! to pixels at the requested zoom, 256 px per tile.

use std::f64::consts::PI;

use map_common::{GeoPoint, TileCoord, TILE_SIZE};

/// WGS84 semi-major axis (meters).
pub const WGS84_SEMI_MAJOR: f64 = 6378137.0;

/// WGS84 semi-minor axis (meters).
pub const WGS84_SEMI_MINOR: f64 = 6356752.3142;

/// Mercator projection on an ellipsoid of revolution.
#[derive(Debug, Clone, Copy)]
pub struct EllipsoidalMercator {
    /// Semi-major axis (meters)
    pub semi_major: f64,
    /// Semi-minor axis (meters)
    pub semi_minor: f64,
    /// First eccentricity
    e: f64,
}

impl EllipsoidalMercator {
    /// Build a projection from the two ellipsoid axes.
    pub fn new(semi_major: f64, semi_minor: f64) -> Self {
        let f = (semi_major - semi_minor) / semi_major;
        let e = (2.0 * f - f * f).sqrt();
        Self {
            semi_major,
            semi_minor,
            e,
        }
    }

    /// The WGS84 ellipsoid (e ≈ 0.0818191908).
    pub fn wgs84() -> Self {
        Self::new(WGS84_SEMI_MAJOR, WGS84_SEMI_MINOR)
    }

    pub fn eccentricity(&self) -> f64 {
        self.e
    }

    /// Equatorial circumference (meters).
    pub fn circumference(&self) -> f64 {
        2.0 * PI * self.semi_major
    }

    /// Projected northing of a latitude, in meters from the equator.
    pub fn northing(&self, lat_deg: f64) -> f64 {
        let lat = lat_deg.to_radians();
        let conformal = (PI / 4.0 + (self.e * lat.sin()).asin() / 2.0)
            .tan()
            .powf(self.e);
        let m = (PI / 4.0 + lat / 2.0).tan() / conformal;
        self.semi_major * m.ln()
    }

    /// Global pixel row of a latitude at `zoom`, counted from the top edge.
    pub fn pixel_y(&self, lat_deg: f64, zoom: u32) -> f64 {
        let circumference = self.circumference();
        let half = circumference / 2.0;
        let scale = 2f64.powi(zoom as i32 + 8) * (1.0 / circumference);
        (half - self.northing(lat_deg)) * scale
    }

    /// Fractional tile column of a longitude at `zoom`.
    pub fn tile_x(lon_deg: f64, zoom: u32) -> f64 {
        (lon_deg + 180.0) / 360.0 * TileCoord::grid_dimension(zoom) as f64
    }

    /// Tile containing `point` at `zoom`.
    ///
    /// Columns truncate toward zero and rows floor toward negative infinity.
    /// Results are clamped into the pyramid, so longitude 180° lands in the
    /// last column and near-polar latitudes in the first or last row.
    pub fn project(&self, point: &GeoPoint, zoom: u32) -> TileCoord {
        let last = (TileCoord::grid_dimension(zoom) - 1) as f64;

        let x = Self::tile_x(point.lon, zoom).trunc();
        let y = (self.pixel_y(point.lat, zoom) / TILE_SIZE as f64).floor();

        TileCoord::new(zoom, clamp_index(x, last), clamp_index(y, last))
    }
}

impl Default for EllipsoidalMercator {
    fn default() -> Self {
        Self::wgs84()
    }
}

/// Clamp a tile index into `[0, last]`, mapping NaN to 0.
fn clamp_index(value: f64, last: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, last) as u32
}

/// Project with the WGS84 ellipsoid.
pub fn project(point: &GeoPoint, zoom: u32) -> TileCoord {
    EllipsoidalMercator::wgs84().project(point, zoom)
}
