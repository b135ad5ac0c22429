//! Tile pyramid addressing.
//!
//! Tiles are 256×256 px squares in a web-map pyramid where zoom level `z`
//! holds a `2^z × 2^z` grid. Columns (x) grow eastwards, rows (y) grow
//! southwards from the top-left corner of the world.

use serde::{Deserialize, Serialize};

/// Edge length of a tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level the tile service serves.
pub const MAX_ZOOM: u32 = 23;

/// A tile coordinate (zoom/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub zoom: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(zoom: u32, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// File stem used in the tile store, `{x}_{y}`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.x, self.y)
    }

    /// Parse a tile store file name (`{x}_{y}.{ext}`) at a known zoom level.
    ///
    /// Returns the coordinate and the extension, or `None` for anything that
    /// is not a committed tile (including `.part` downloads).
    pub fn parse_file_name(name: &str, zoom: u32) -> Option<(TileCoord, &str)> {
        let (stem, ext) = name.split_once('.')?;
        if ext.is_empty() || ext.contains('.') {
            return None;
        }
        let (x, y) = stem.split_once('_')?;
        Some((TileCoord::new(zoom, x.parse().ok()?, y.parse().ok()?), ext))
    }

    /// Number of tiles along one axis at `zoom`.
    pub fn grid_dimension(zoom: u32) -> u64 {
        1u64 << zoom
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Inclusive rectangle of tiles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRegion {
    pub zoom: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRegion {
    /// Smallest region containing both tiles, whatever corner each one is.
    ///
    /// Both tiles must be at the same zoom level; the first one's zoom wins.
    pub fn spanning(a: TileCoord, b: TileCoord) -> Self {
        Self {
            zoom: a.zoom,
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
        }
    }

    /// Width in tiles.
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    /// Height in tiles.
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Total number of tiles in the region.
    pub fn len(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// A region always holds at least one tile.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        coord.zoom == self.zoom
            && (self.min_x..=self.max_x).contains(&coord.x)
            && (self.min_y..=self.max_y).contains(&coord.y)
    }

    pub fn top_left(&self) -> TileCoord {
        TileCoord::new(self.zoom, self.min_x, self.min_y)
    }

    pub fn bottom_right(&self) -> TileCoord {
        TileCoord::new(self.zoom, self.max_x, self.max_y)
    }

    /// Every tile in the region, column by column (x outer, y inner).
    ///
    /// File names carry absolute grid positions, so the visiting order only
    /// matters for pacing and progress output.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + Clone + Send + 'static {
        let TileRegion {
            zoom,
            min_x,
            min_y,
            max_x,
            max_y,
        } = *self;
        (min_x..=max_x).flat_map(move |x| (min_y..=max_y).map(move |y| TileCoord::new(zoom, x, y)))
    }
}

impl std::fmt::Display for TileRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "z{} x{}..={} y{}..={}",
            self.zoom, self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}
