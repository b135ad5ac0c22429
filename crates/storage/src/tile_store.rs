//! Tile files under a map directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use map_common::{MapError, MapResult, TileCoord, TileRegion};
use tracing::{debug, warn};

use crate::tile_lock::{TileLockGuard, TileLocks};

/// Extensions probed when looking for a stored tile, in order.
pub const TILE_EXTENSIONS: [&str; 2] = ["png", "jpg"];

/// Suffix of a download that has not been committed yet.
pub const PARTIAL_SUFFIX: &str = "part";

const TILES_DIR: &str = "tiles";
const PREPARE_DIR: &str = "prepare";

/// Tile files of one map directory.
pub struct TileStore {
    root: PathBuf,
    created_zooms: Mutex<HashSet<u32>>,
    locks: TileLocks,
}

impl TileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            created_zooms: Mutex::new(HashSet::new()),
            locks: TileLocks::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the tiles of one zoom level.
    pub fn tiles_dir(&self, zoom: u32) -> PathBuf {
        self.root.join(TILES_DIR).join(zoom.to_string())
    }

    /// Directory for intermediate mosaic blocks.
    pub fn prepare_dir(&self) -> PathBuf {
        self.root.join(PREPARE_DIR)
    }

    /// Final path of a tile with the given extension.
    pub fn tile_path(&self, coord: &TileCoord, ext: &str) -> PathBuf {
        self.tiles_dir(coord.zoom)
            .join(format!("{}.{}", coord.file_stem(), ext))
    }

    /// Path an in-flight download is written to before commit.
    pub fn partial_path(&self, coord: &TileCoord, ext: &str) -> PathBuf {
        self.tiles_dir(coord.zoom)
            .join(format!("{}.{}.{}", coord.file_stem(), ext, PARTIAL_SUFFIX))
    }

    /// Stored file for `coord`, PNG first, then JPEG.
    pub fn find(&self, coord: &TileCoord) -> Option<PathBuf> {
        TILE_EXTENSIONS
            .iter()
            .map(|ext| self.tile_path(coord, ext))
            .find(|path| path.is_file())
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.find(coord).is_some()
    }

    /// Create the zoom directory unless this store already did so.
    pub fn ensure_zoom_dir(&self, zoom: u32) -> MapResult<PathBuf> {
        let dir = self.tiles_dir(zoom);
        let mut created = self
            .created_zooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !created.contains(&zoom) {
            std::fs::create_dir_all(&dir).map_err(|e| MapError::storage(&dir, e))?;
            debug!(path = %dir.display(), "Created zoom directory");
            created.insert(zoom);
        }
        Ok(dir)
    }

    /// Create the block directory.
    pub fn ensure_prepare_dir(&self) -> MapResult<PathBuf> {
        let dir = self.prepare_dir();
        std::fs::create_dir_all(&dir).map_err(|e| MapError::storage(&dir, e))?;
        Ok(dir)
    }

    /// Serialize writers of one tile.
    pub async fn lock(&self, coord: TileCoord) -> TileLockGuard {
        self.locks.acquire(coord).await
    }

    /// Move a finished download to its final name.
    pub async fn commit(&self, partial: &Path, target: &Path) -> MapResult<()> {
        tokio::fs::rename(partial, target)
            .await
            .map_err(|e| MapError::storage(target, e))
    }

    /// Remove a partial download, ignoring a file that is already gone.
    pub async fn discard(&self, partial: &Path) {
        match tokio::fs::remove_file(partial).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %partial.display(), error = %e, "Failed to remove partial tile"),
        }
    }

    /// Bounding region of the tiles stored for `zoom`.
    ///
    /// Partial downloads and foreign files are ignored. Returns `None` when
    /// the zoom directory is missing or holds no tiles.
    pub fn scan_region(&self, zoom: u32) -> MapResult<Option<TileRegion>> {
        let dir = self.tiles_dir(zoom);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MapError::storage(&dir, e)),
        };

        let mut region: Option<TileRegion> = None;
        for entry in entries {
            let entry = entry.map_err(|e| MapError::storage(&dir, e))?;
            let name = entry.file_name();
            let Some((coord, _)) = name.to_str().and_then(|n| TileCoord::parse_file_name(n, zoom))
            else {
                continue;
            };
            region = Some(match region {
                None => TileRegion::spanning(coord, coord),
                Some(r) => TileRegion {
                    min_x: r.min_x.min(coord.x),
                    min_y: r.min_y.min(coord.y),
                    max_x: r.max_x.max(coord.x),
                    max_y: r.max_y.max(coord.y),
                    ..r
                },
            });
        }

        debug!(zoom, region = ?region, "Scanned stored tiles");
        Ok(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::generators::write_tile;

    #[test]
    fn test_layout() {
        let store = TileStore::new("/maps/sat-3.700.0");
        let coord = TileCoord::new(17, 79232, 41089);
        assert_eq!(
            store.tile_path(&coord, "jpg"),
            PathBuf::from("/maps/sat-3.700.0/tiles/17/79232_41089.jpg")
        );
        assert_eq!(
            store.partial_path(&coord, "jpg"),
            PathBuf::from("/maps/sat-3.700.0/tiles/17/79232_41089.jpg.part")
        );
        assert_eq!(store.prepare_dir(), PathBuf::from("/maps/sat-3.700.0/prepare"));
    }

    #[test]
    fn test_find_prefers_png() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::new(dir.path());
        let coord = TileCoord::new(3, 1, 1);

        assert_eq!(store.find(&coord), None);

        write_tile(dir.path(), &coord, "jpg");
        assert_eq!(store.find(&coord), Some(store.tile_path(&coord, "jpg")));

        write_tile(dir.path(), &coord, "png");
        assert_eq!(store.find(&coord), Some(store.tile_path(&coord, "png")));
    }

    #[test]
    fn test_partial_file_is_not_a_tile() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::new(dir.path());
        let coord = TileCoord::new(3, 1, 1);
        store.ensure_zoom_dir(3).unwrap();
        std::fs::write(store.partial_path(&coord, "png"), b"half").unwrap();

        assert!(!store.contains(&coord));
        assert_eq!(store.scan_region(3).unwrap(), None);
    }

    #[test]
    fn test_scan_region() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::new(dir.path());

        assert_eq!(store.scan_region(8).unwrap(), None);

        for (x, y) in [(10, 7), (12, 5), (11, 9)] {
            write_tile(dir.path(), &TileCoord::new(8, x, y), "png");
        }
        std::fs::write(store.tiles_dir(8).join("notes.txt"), b"x").unwrap();

        let region = store.scan_region(8).unwrap().unwrap();
        assert_eq!(region.top_left(), TileCoord::new(8, 10, 5));
        assert_eq!(region.bottom_right(), TileCoord::new(8, 12, 9));
    }

    #[tokio::test]
    async fn test_commit_and_discard() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::new(dir.path());
        let coord = TileCoord::new(5, 2, 3);
        store.ensure_zoom_dir(5).unwrap();

        let partial = store.partial_path(&coord, "png");
        let target = store.tile_path(&coord, "png");
        std::fs::write(&partial, b"data").unwrap();
        store.commit(&partial, &target).await.unwrap();
        assert!(!partial.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"data");

        std::fs::write(&partial, b"again").unwrap();
        store.discard(&partial).await;
        store.discard(&partial).await;
        assert!(!partial.exists());
    }

    #[test]
    fn test_ensure_zoom_dir_reports_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let store = TileStore::new(&blocker);
        let err = store.ensure_zoom_dir(4).unwrap_err();
        assert_eq!(err.kind(), map_common::ErrorKind::Storage);
    }
}
