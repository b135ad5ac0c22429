//! Geographic points.

use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when latitude is within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Midpoint of the rectangle spanned by two corners.
    pub fn center(a: &GeoPoint, b: &GeoPoint) -> GeoPoint {
        GeoPoint::new((a.lat + b.lat) / 2.0, (a.lon + b.lon) / 2.0)
    }

    /// Absolute (lon, lat) extent of the rectangle spanned by two corners.
    pub fn span(a: &GeoPoint, b: &GeoPoint) -> (f64, f64) {
        ((a.lon - b.lon).abs(), (a.lat - b.lat).abs())
    }
}

/// Error parsing a `"lat,lon"` string.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PointParseError {
    #[error("Expected 'lat,lon', got '{0}'")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

impl FromStr for GeoPoint {
    type Err = PointParseError;

    /// Parse the compact `"lat,lon"` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| PointParseError::InvalidFormat(s.to_string()))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| PointParseError::InvalidNumber(part.trim().to_string()))
        };
        Ok(Self {
            lat: parse(lat)?,
            lon: parse(lon)?,
        })
    }
}

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Fields { lat: f64, lon: f64 },
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Fields { lat, lon } => Ok(GeoPoint { lat, lon }),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        let point: GeoPoint = "55.7558, 37.6173".parse().unwrap();
        assert_eq!(point, GeoPoint::new(55.7558, 37.6173));
    }

    #[test]
    fn test_parse_point_errors() {
        assert!(matches!(
            "55.7558".parse::<GeoPoint>(),
            Err(PointParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            "north,37.6".parse::<GeoPoint>(),
            Err(PointParseError::InvalidNumber(n)) if n == "north"
        ));
    }

    #[test]
    fn test_deserialize_both_forms() {
        let fields: GeoPoint = serde_yaml::from_str("{ lat: 55.8, lon: 37.5 }").unwrap();
        let text: GeoPoint = serde_yaml::from_str("\"55.8,37.5\"").unwrap();
        assert_eq!(fields, text);
    }

    #[test]
    fn test_validity() {
        assert!(GeoPoint::new(90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 180.5).is_valid());
    }

    #[test]
    fn test_center_and_span() {
        let a = GeoPoint::new(55.8, 37.5);
        let b = GeoPoint::new(55.7, 37.7);
        let center = GeoPoint::center(&a, &b);
        assert!((center.lat - 55.75).abs() < 1e-9);
        assert!((center.lon - 37.6).abs() < 1e-9);
        let (dlon, dlat) = GeoPoint::span(&a, &b);
        assert!((dlon - 0.2).abs() < 1e-9);
        assert!((dlat - 0.1).abs() < 1e-9);
    }
}
