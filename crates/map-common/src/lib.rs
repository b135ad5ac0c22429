//! Common types shared by the tile downloader and the mosaic builder.

pub mod config;
pub mod error;
pub mod geo;
pub mod layer;
pub mod template;
pub mod tile;

pub use config::{ComposerKind, MapConfig, MosaicConfig, PacingConfig};
pub use error::{ErrorKind, MapError, MapResult};
pub use geo::GeoPoint;
pub use layer::Layer;
pub use tile::{TileCoord, TileRegion, TILE_SIZE};
