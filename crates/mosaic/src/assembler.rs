//! Two-phase mosaic assembly.
//!
//! Blocks always cover a full `block_size × block_size` grid. Cells without a
//! stored tile, including cells past the region's right and bottom edges,
//! are filled with the placeholder image, so every block has the same pixel
//! size and the mosaic is padded out to whole blocks.

use std::path::{Path, PathBuf};

use map_common::{MapError, MapResult, TileCoord, TileRegion};
use storage::TileStore;
use tracing::{debug, info, warn};

use crate::compose::GridComposer;

const BLOCK_EXTENSION: &str = "jpg";

/// Block layout of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
    pub columns: u32,
    pub rows: u32,
}

impl BlockGrid {
    /// Blocks needed to cover `region`, rounding partial blocks up.
    pub fn covering(region: &TileRegion, block_size: u32) -> Self {
        Self {
            columns: region.width().div_ceil(block_size),
            rows: region.height().div_ceil(block_size),
        }
    }

    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block coordinates in row-major order.
    pub fn blocks(&self) -> impl Iterator<Item = (u32, u32)> {
        let columns = self.columns;
        (0..self.rows).flat_map(move |by| (0..columns).map(move |bx| (bx, by)))
    }
}

/// Outcome of a full build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MosaicSummary {
    pub grid: BlockGrid,
    /// Tiles with a stored file
    pub tiles_found: u64,
    /// Region cells filled with the placeholder
    pub tiles_missing: u64,
    pub output: PathBuf,
}

/// Block file name for a block position.
pub fn block_file_name(bx: u32, by: u32) -> String {
    format!("{}_{}.{}", bx, by, BLOCK_EXTENSION)
}

/// Parse `<bx>_<by>.jpg`.
pub fn parse_block_file_name(name: &str) -> Option<(u32, u32)> {
    let stem = name.strip_suffix(BLOCK_EXTENSION)?.strip_suffix('.')?;
    let (bx, by) = stem.split_once('_')?;
    Some((bx.parse().ok()?, by.parse().ok()?))
}

/// Builds mosaics from one tile store.
pub struct MosaicAssembler {
    store: TileStore,
    composer: Box<dyn GridComposer>,
    placeholder: PathBuf,
    block_size: u32,
}

impl MosaicAssembler {
    pub fn new(
        store: TileStore,
        composer: Box<dyn GridComposer>,
        placeholder: impl Into<PathBuf>,
        block_size: u32,
    ) -> Self {
        Self {
            store,
            composer,
            placeholder: placeholder.into(),
            block_size: block_size.max(1),
        }
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Tile coordinate of one cell of a block, or `None` past the region edge.
    fn cell(&self, region: &TileRegion, bx: u32, by: u32, tx: u32, ty: u32) -> Option<TileCoord> {
        let coord = TileCoord::new(
            region.zoom,
            region.min_x + bx * self.block_size + tx,
            region.min_y + by * self.block_size + ty,
        );
        region.contains(&coord).then_some(coord)
    }

    /// Input files for one block in row-major order, with the placeholder
    /// standing in for every cell that has no stored tile.
    ///
    /// Also returns how many region tiles were missing.
    pub fn block_inputs(&self, region: &TileRegion, bx: u32, by: u32) -> (Vec<PathBuf>, u64) {
        let mut inputs = Vec::with_capacity((self.block_size * self.block_size) as usize);
        let mut missing = 0;
        for ty in 0..self.block_size {
            for tx in 0..self.block_size {
                let found = match self.cell(region, bx, by, tx, ty) {
                    Some(coord) => {
                        let path = self.store.find(&coord);
                        if path.is_none() {
                            debug!(tile = %coord, "Tile missing, using placeholder");
                            missing += 1;
                        }
                        path
                    }
                    None => None,
                };
                inputs.push(found.unwrap_or_else(|| self.placeholder.clone()));
            }
        }
        (inputs, missing)
    }

    fn check_placeholder(&self) -> MapResult<()> {
        if self.placeholder.is_file() {
            Ok(())
        } else {
            Err(MapError::MissingPlaceholder(self.placeholder.clone()))
        }
    }

    /// Remove block files left by an earlier build.
    fn purge_blocks(&self, dir: &Path) -> MapResult<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(dir).map_err(|e| MapError::storage(dir, e))? {
            let entry = entry.map_err(|e| MapError::storage(dir, e))?;
            let name = entry.file_name();
            if name.to_str().and_then(parse_block_file_name).is_some() {
                let path = entry.path();
                std::fs::remove_file(&path).map_err(|e| MapError::storage(&path, e))?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, dir = %dir.display(), "Removed stale blocks");
        }
        Ok(removed)
    }

    /// Phase 1: compose every block of `region` into the prepare directory.
    ///
    /// Returns the block grid and the number of missing tiles.
    pub fn prepare(&self, region: &TileRegion) -> MapResult<(BlockGrid, u64)> {
        self.check_placeholder()?;

        let dir = self.store.ensure_prepare_dir()?;
        self.purge_blocks(&dir)?;

        let grid = BlockGrid::covering(region, self.block_size);
        info!(
            region = %region,
            columns = grid.columns,
            rows = grid.rows,
            block_size = self.block_size,
            composer = self.composer.name(),
            "Composing blocks"
        );

        let mut missing_total = 0;
        for (done, (bx, by)) in grid.blocks().enumerate() {
            let (inputs, missing) = self.block_inputs(region, bx, by);
            missing_total += missing;

            let output = dir.join(block_file_name(bx, by));
            self.composer
                .compose(&inputs, self.block_size, self.block_size, &output)?;

            info!(
                block = %output.display(),
                missing,
                progress = %format!("{:.1}%", (done + 1) as f64 * 100.0 / grid.len() as f64),
                "Block composed"
            );
        }

        if missing_total > 0 {
            warn!(missing = missing_total, "Region has tiles without files");
        }
        Ok((grid, missing_total))
    }

    /// Block grid found in the prepare directory (max coordinate + 1).
    pub fn scan_blocks(&self) -> MapResult<BlockGrid> {
        let dir = self.store.prepare_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MapError::MissingBlock(dir.join(block_file_name(0, 0))))
            }
            Err(e) => return Err(MapError::storage(&dir, e)),
        };

        let mut grid: Option<BlockGrid> = None;
        for entry in entries {
            let entry = entry.map_err(|e| MapError::storage(&dir, e))?;
            let name = entry.file_name();
            if let Some((bx, by)) = name.to_str().and_then(parse_block_file_name) {
                let g = grid.get_or_insert(BlockGrid { columns: 0, rows: 0 });
                g.columns = g.columns.max(bx + 1);
                g.rows = g.rows.max(by + 1);
            }
        }

        grid.ok_or_else(|| MapError::MissingBlock(dir.join(block_file_name(0, 0))))
    }

    /// Phase 2: concatenate the prepared blocks into `output`.
    pub fn assemble(&self, output: &Path) -> MapResult<BlockGrid> {
        let grid = self.scan_blocks()?;
        let dir = self.store.prepare_dir();

        let mut inputs = Vec::with_capacity(grid.len());
        for (bx, by) in grid.blocks() {
            let path = dir.join(block_file_name(bx, by));
            if !path.is_file() {
                return Err(MapError::MissingBlock(path));
            }
            inputs.push(path);
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MapError::storage(parent, e))?;
        }

        info!(
            columns = grid.columns,
            rows = grid.rows,
            output = %output.display(),
            "Composing final mosaic"
        );
        self.composer
            .compose(&inputs, grid.columns, grid.rows, output)?;
        Ok(grid)
    }

    /// Run both phases for `region`.
    pub fn build(&self, region: &TileRegion, output: &Path) -> MapResult<MosaicSummary> {
        let (grid, tiles_missing) = self.prepare(region)?;
        let assembled = self.assemble(output)?;
        debug_assert_eq!(grid, assembled);

        Ok(MosaicSummary {
            grid: assembled,
            tiles_found: region.len() - tiles_missing,
            tiles_missing,
            output: output.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ImageGridComposer;

    fn region(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> TileRegion {
        TileRegion::spanning(TileCoord::new(9, min_x, min_y), TileCoord::new(9, max_x, max_y))
    }

    #[test]
    fn test_block_grid_rounds_up() {
        assert_eq!(
            BlockGrid::covering(&region(0, 0, 9, 9), 10),
            BlockGrid { columns: 1, rows: 1 }
        );
        assert_eq!(
            BlockGrid::covering(&region(100, 200, 118, 216), 10),
            BlockGrid { columns: 2, rows: 2 }
        );
        assert_eq!(
            BlockGrid::covering(&region(5, 5, 5, 25), 10),
            BlockGrid { columns: 1, rows: 3 }
        );
    }

    #[test]
    fn test_blocks_are_row_major() {
        let grid = BlockGrid { columns: 2, rows: 2 };
        assert_eq!(grid.blocks().collect::<Vec<_>>(), vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_block_file_names() {
        assert_eq!(block_file_name(3, 12), "3_12.jpg");
        assert_eq!(parse_block_file_name("3_12.jpg"), Some((3, 12)));
        assert_eq!(parse_block_file_name("3_12.png"), None);
        assert_eq!(parse_block_file_name("3-12.jpg"), None);
        assert_eq!(parse_block_file_name("3_12jpg"), None);
    }

    #[test]
    fn test_block_inputs_pad_past_edge() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::new(dir.path());
        let region = region(20, 30, 22, 30);
        test_utils::generators::populate_region(dir.path(), &region, "png", &[]);

        let placeholder = dir.path().join("empty.jpg");
        let assembler = MosaicAssembler::new(
            store,
            Box::new(ImageGridComposer::new(100)),
            &placeholder,
            2,
        );

        let (inputs, missing) = assembler.block_inputs(&region, 1, 0);
        assert_eq!(missing, 0);
        assert_eq!(
            inputs,
            vec![
                dir.path().join("tiles/9/22_30.png"),
                placeholder.clone(),
                placeholder.clone(),
                placeholder.clone(),
            ]
        );
    }
}
