//! Run configuration loaded from a YAML file.
//!
//! The file is parsed once at startup into an immutable [`MapConfig`] that
//! is handed to every component; nothing re-reads or mutates it afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::template;
use crate::tile::MAX_ZOOM;
use crate::{GeoPoint, Layer, MapError, MapResult};

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    pub region: RegionConfig,
    pub service: ServiceConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub mosaic: MosaicConfig,
}

/// Area to download.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    pub corner1: GeoPoint,
    pub corner2: GeoPoint,
    /// Zoom levels, as a list or a comma-separated string
    #[serde(deserialize_with = "deserialize_zooms")]
    pub zooms: Vec<u32>,
}

/// Upstream tile service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Domain suffix of the mirror hosts
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Display language (`lang=` parameter)
    #[serde(default = "default_language")]
    pub language: String,
    /// Served API version per layer
    #[serde(default)]
    pub versions: VersionsConfig,
    /// Explicit mirror hosts, overriding the `{layer}{01..N}.{domain}` pattern
    #[serde(default)]
    pub mirrors: Vec<String>,
    #[serde(default = "default_mirror_count")]
    pub mirror_count: u32,
}

fn default_domain() -> String {
    "maps.yandex.net".to_string()
}

fn default_language() -> String {
    "ru-RU".to_string()
}

fn default_mirror_count() -> u32 {
    4
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionsConfig {
    pub vec: Option<String>,
    pub sat: Option<String>,
}

/// Where tiles are stored.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Map directory template with `{layer}`, `{version}` and `{date}` tokens
    pub dir: String,
}

/// HTTP and fetch-loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Maximum fetches in flight inside one burst
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Consecutive storage failures that abort the run
    #[serde(default = "default_max_storage_errors")]
    pub max_storage_errors: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept")]
    pub accept: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_accept_encoding")]
    pub accept_encoding: String,
    #[serde(default = "default_accept_charset")]
    pub accept_charset: String,
}

fn default_concurrency() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_storage_errors() -> u32 {
    3
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:25.0) Gecko/20100101 Firefox/25.0".to_string()
}

fn default_accept() -> String {
    "image/png,image/*;q=0.8,*/*;q=0.5".to_string()
}

fn default_accept_language() -> String {
    "ru-ru,ru;q=0.8,en-us;q=0.5,en;q=0.3".to_string()
}

fn default_accept_encoding() -> String {
    "gzip, deflate".to_string()
}

fn default_accept_charset() -> String {
    "windows-1251,utf-8;q=0.7,*;q=0.7".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_storage_errors: default_max_storage_errors(),
            user_agent: default_user_agent(),
            accept: default_accept(),
            accept_language: default_accept_language(),
            accept_encoding: default_accept_encoding(),
            accept_charset: default_accept_charset(),
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Burst pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_burst_min")]
    pub burst_min: usize,
    #[serde(default = "default_burst_max")]
    pub burst_max: usize,
    /// A burst with more network transfers than this is followed by a pause
    #[serde(default = "default_transfer_threshold")]
    pub transfer_threshold: usize,
    #[serde(default = "default_pause_min")]
    pub pause_min_secs: u64,
    #[serde(default = "default_pause_max")]
    pub pause_max_secs: u64,
}

fn default_burst_min() -> usize {
    50
}

fn default_burst_max() -> usize {
    100
}

fn default_transfer_threshold() -> usize {
    10
}

fn default_pause_min() -> u64 {
    5
}

fn default_pause_max() -> u64 {
    20
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            burst_min: default_burst_min(),
            burst_max: default_burst_max(),
            transfer_threshold: default_transfer_threshold(),
            pause_min_secs: default_pause_min(),
            pause_max_secs: default_pause_max(),
        }
    }
}

/// Which grid composition backend the builder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposerKind {
    /// In-process composition with the `image` crate
    #[default]
    Image,
    /// External ImageMagick `montage`
    Montage,
}

/// Mosaic assembly.
#[derive(Debug, Clone, Deserialize)]
pub struct MosaicConfig {
    /// Tiles per block side
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    /// Image substituted for missing tiles
    #[serde(default = "default_placeholder")]
    pub placeholder: PathBuf,
    #[serde(default)]
    pub composer: ComposerKind,
    #[serde(default = "default_montage_program")]
    pub montage_program: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_block_size() -> u32 {
    10
}

fn default_placeholder() -> PathBuf {
    PathBuf::from("empty.jpg")
}

fn default_montage_program() -> String {
    "magick".to_string()
}

fn default_jpeg_quality() -> u8 {
    100
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            placeholder: default_placeholder(),
            composer: ComposerKind::default(),
            montage_program: default_montage_program(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Accepts `[15, 16]`, `"15,16"` or a bare `17`.
fn deserialize_zooms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        List(Vec<u32>),
        Single(u32),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::List(zooms) => Ok(zooms),
        Repr::Single(zoom) => Ok(vec![zoom]),
        Repr::Text(text) => parse_zoom_list(&text).map_err(serde::de::Error::custom),
    }
}

/// Parse a comma-separated zoom list such as `"15,16,17"`.
pub fn parse_zoom_list(text: &str) -> Result<Vec<u32>, String> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .map_err(|_| format!("invalid zoom level '{}'", part))
        })
        .collect()
}

impl MapConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> MapResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| MapError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml(&content).map_err(|e| match e {
            MapError::ConfigParse { message, .. } => MapError::ConfigParse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;

        debug!(path = %path.display(), zooms = ?config.region.zooms, "Loaded map config");
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_yaml(content: &str) -> MapResult<Self> {
        let config: MapConfig =
            serde_yaml::from_str(content).map_err(|e| MapError::ConfigParse {
                path: PathBuf::new(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail later in the run.
    pub fn validate(&self) -> MapResult<()> {
        for (key, point) in [
            ("region.corner1", &self.region.corner1),
            ("region.corner2", &self.region.corner2),
        ] {
            if !point.is_valid() {
                return Err(MapError::invalid(
                    key,
                    format!("{},{} is outside lat [-90, 90] / lon [-180, 180]", point.lat, point.lon),
                ));
            }
        }

        if self.region.zooms.is_empty() {
            return Err(MapError::invalid("region.zooms", "at least one zoom level is required"));
        }
        if let Some(zoom) = self.region.zooms.iter().find(|&&z| z > MAX_ZOOM) {
            return Err(MapError::invalid(
                "region.zooms",
                format!("zoom {} exceeds the maximum of {}", zoom, MAX_ZOOM),
            ));
        }

        if self.fetch.concurrency == 0 {
            return Err(MapError::invalid("fetch.concurrency", "must be at least 1"));
        }

        let pacing = &self.pacing;
        if pacing.burst_min == 0 || pacing.burst_min > pacing.burst_max {
            return Err(MapError::invalid(
                "pacing.burst_min",
                "must be at least 1 and not larger than pacing.burst_max",
            ));
        }
        if pacing.pause_min_secs > pacing.pause_max_secs {
            return Err(MapError::invalid(
                "pacing.pause_min_secs",
                "must not be larger than pacing.pause_max_secs",
            ));
        }

        if self.mosaic.block_size == 0 {
            return Err(MapError::invalid("mosaic.block_size", "must be at least 1"));
        }
        if self.mosaic.jpeg_quality == 0 || self.mosaic.jpeg_quality > 100 {
            return Err(MapError::invalid("mosaic.jpeg_quality", "must be within 1..=100"));
        }

        Ok(())
    }

    /// API version served for `layer`.
    pub fn version_for(&self, layer: Layer) -> MapResult<&str> {
        let version = match layer {
            Layer::Scheme => self.service.versions.vec.as_deref(),
            Layer::Satellite => self.service.versions.sat.as_deref(),
        };
        version
            .filter(|v| !v.trim().is_empty())
            .ok_or(MapError::MissingVersion(layer))
    }

    /// Mirror hosts for `layer`, `{layer}01.{domain}` onwards unless listed
    /// explicitly.
    pub fn mirrors_for(&self, layer: Layer) -> Vec<String> {
        if !self.service.mirrors.is_empty() {
            return self.service.mirrors.clone();
        }
        (1..=self.service.mirror_count.max(1))
            .map(|i| format!("{}{:02}.{}", layer.name(), i, self.service.domain))
            .collect()
    }

    /// Map directory for a layer, with every template token resolved.
    pub fn map_dir(&self, layer: Layer, version: &str, date: &str) -> PathBuf {
        PathBuf::from(template::substitute(
            &self.output.dir,
            &[("layer", layer.name()), ("version", version), ("date", date)],
        ))
    }

    /// Highest configured zoom level.
    pub fn max_zoom(&self) -> u32 {
        self.region.zooms.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
region:
  corner1: { lat: 55.80, lon: 37.50 }
  corner2: "55.70,37.70"
  zooms: "15, 16,17"
service:
  language: ru-RU
  versions:
    sat: "3.700.0"
output:
  dir: "maps/{layer}-{version}-{date}"
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = MapConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.region.zooms, vec![15, 16, 17]);
        assert_eq!(config.region.corner2, GeoPoint::new(55.70, 37.70));
        assert_eq!(config.service.domain, "maps.yandex.net");
        assert_eq!(config.pacing.burst_min, 50);
        assert_eq!(config.pacing.burst_max, 100);
        assert_eq!(config.mosaic.block_size, 10);
        assert_eq!(config.mosaic.composer, ComposerKind::Image);
        assert_eq!(config.fetch.accept_encoding, "gzip, deflate");
        assert_eq!(config.max_zoom(), 17);
    }

    #[test]
    fn test_zoom_forms() {
        assert_eq!(parse_zoom_list("15,16").unwrap(), vec![15, 16]);
        assert_eq!(parse_zoom_list(" 17 ").unwrap(), vec![17]);
        assert!(parse_zoom_list("15,x").is_err());

        let list = SAMPLE.replace("zooms: \"15, 16,17\"", "zooms: [12, 13]");
        assert_eq!(MapConfig::from_yaml(&list).unwrap().region.zooms, vec![12, 13]);

        let single = SAMPLE.replace("zooms: \"15, 16,17\"", "zooms: 17");
        assert_eq!(MapConfig::from_yaml(&single).unwrap().region.zooms, vec![17]);
    }

    #[test]
    fn test_missing_version_is_configuration_error() {
        let config = MapConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.version_for(Layer::Satellite).unwrap(), "3.700.0");

        let err = config.version_for(Layer::Scheme).unwrap_err();
        assert!(matches!(err, MapError::MissingVersion(Layer::Scheme)));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_mirrors() {
        let config = MapConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(
            config.mirrors_for(Layer::Satellite),
            vec![
                "sat01.maps.yandex.net",
                "sat02.maps.yandex.net",
                "sat03.maps.yandex.net",
                "sat04.maps.yandex.net",
            ]
        );
        assert_eq!(config.mirrors_for(Layer::Scheme)[0], "vec01.maps.yandex.net");

        let explicit = SAMPLE.replace("  language: ru-RU", "  language: ru-RU\n  mirrors: [\"127.0.0.1:8080\"]");
        let config = MapConfig::from_yaml(&explicit).unwrap();
        assert_eq!(config.mirrors_for(Layer::Satellite), vec!["127.0.0.1:8080"]);
    }

    #[test]
    fn test_map_dir_resolves_tokens() {
        let config = MapConfig::from_yaml(SAMPLE).unwrap();
        let dir = config.map_dir(Layer::Satellite, "3.700.0", "20240115");
        assert_eq!(dir, PathBuf::from("maps/sat-3.700.0-20240115"));
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let bad_zoom = SAMPLE.replace("zooms: \"15, 16,17\"", "zooms: \"15,30\"");
        assert!(matches!(
            MapConfig::from_yaml(&bad_zoom),
            Err(MapError::InvalidSetting { key, .. }) if key == "region.zooms"
        ));

        let bad_point = SAMPLE.replace("\"55.70,37.70\"", "\"95.0,37.70\"");
        assert!(matches!(
            MapConfig::from_yaml(&bad_point),
            Err(MapError::InvalidSetting { key, .. }) if key == "region.corner2"
        ));

        let bad_pacing = format!("{}pacing:\n  burst_min: 120\n", SAMPLE);
        assert!(matches!(
            MapConfig::from_yaml(&bad_pacing),
            Err(MapError::InvalidSetting { key, .. }) if key == "pacing.burst_min"
        ));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = MapConfig::from_yaml("region: [").unwrap_err();
        assert!(matches!(err, MapError::ConfigParse { .. }));
    }
}
