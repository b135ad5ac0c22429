//! Map layers served by the tile service.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Content type of the requested tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Vector scheme rendering, served as PNG
    #[serde(alias = "vec", alias = "map")]
    Scheme,
    /// Satellite imagery, served as JPEG
    #[serde(alias = "sat")]
    Satellite,
}

impl Layer {
    /// Name used on the command line, in mirror host names and as the
    /// version key in the configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Scheme => "vec",
            Layer::Satellite => "sat",
        }
    }

    /// Value of the `l=` query parameter.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Layer::Scheme => "map",
            Layer::Satellite => "sat",
        }
    }

    /// File extension of tiles of this layer.
    pub fn extension(&self) -> &'static str {
        match self {
            Layer::Scheme => "png",
            Layer::Satellite => "jpg",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vec" | "map" | "scheme" => Ok(Layer::Scheme),
            "sat" | "satellite" => Ok(Layer::Satellite),
            other => Err(format!("unknown layer '{}' (expected vec or sat)", other)),
        }
    }
}
