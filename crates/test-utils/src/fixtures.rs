//! Common test fixtures for the map-tiles tests.

/// Reference coordinates.
pub mod points {
    use map_common::GeoPoint;

    /// Red Square, Moscow
    pub const MOSCOW: GeoPoint = GeoPoint {
        lat: 55.7558,
        lon: 37.6173,
    };

    /// Sydney Opera House area
    pub const SYDNEY: GeoPoint = GeoPoint {
        lat: -33.8688,
        lon: 151.2093,
    };

    /// North-west corner of a small box around central Moscow
    pub const MOSCOW_NW: GeoPoint = GeoPoint {
        lat: 55.80,
        lon: 37.50,
    };

    /// South-east corner of the same box
    pub const MOSCOW_SE: GeoPoint = GeoPoint {
        lat: 55.70,
        lon: 37.70,
    };
}

/// Configuration documents.
pub mod config {
    /// Minimal satellite config over central Moscow at zoom 10 (a 2x2 region).
    ///
    /// `{dir}` and `{mirror}` are replaced by [`sample_yaml`].
    pub const SAMPLE_TEMPLATE: &str = r#"
region:
  corner1: { lat: 55.80, lon: 37.50 }
  corner2: { lat: 55.70, lon: 37.70 }
  zooms: [10]
service:
  language: ru-RU
  versions:
    sat: "3.700.0"
    vec: "2.38.0"
  mirrors: ["{mirror}"]
output:
  dir: "{dir}/{layer}-{version}"
fetch:
  concurrency: 2
  request_timeout_secs: 5
  connect_timeout_secs: 2
pacing:
  burst_min: 50
  burst_max: 50
  transfer_threshold: 10
  pause_min_secs: 0
  pause_max_secs: 0
mosaic:
  block_size: 2
"#;

    /// Sample config with the output root and the single mirror host filled in.
    pub fn sample_yaml(dir: &std::path::Path, mirror: &str) -> String {
        SAMPLE_TEMPLATE
            .replace("{dir}", &dir.display().to_string())
            .replace("{mirror}", mirror)
    }
}
