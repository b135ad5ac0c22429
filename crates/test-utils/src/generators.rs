//! Test tile generators.
//!
//! Functions for producing tile images and on-disk store layouts without
//! touching the network.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use map_common::{TileCoord, TileRegion, TILE_SIZE};

/// A solid square image of `size` pixels.
pub fn solid_image(size: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(size, size, Rgb(color))
}

/// A colour unique enough per tile to tell neighbours apart in a mosaic.
pub fn tile_color(coord: &TileCoord) -> [u8; 3] {
    [
        (coord.x.wrapping_mul(37) % 200 + 40) as u8,
        (coord.y.wrapping_mul(53) % 200 + 40) as u8,
        (coord.zoom * 10 % 250) as u8,
    ]
}

/// Encode a solid tile in the format implied by `ext` (`png` or `jpg`).
pub fn encoded_tile(ext: &str, color: [u8; 3]) -> Vec<u8> {
    let format = match ext {
        "png" => ImageFormat::Png,
        _ => ImageFormat::Jpeg,
    };
    let mut bytes = Cursor::new(Vec::new());
    solid_image(TILE_SIZE, color)
        .write_to(&mut bytes, format)
        .expect("encode test tile");
    bytes.into_inner()
}

/// Write a solid image to `path`, creating parent directories.
pub fn write_image(path: &Path, size: u32, color: [u8; 3]) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create image dir");
    }
    solid_image(size, color).save(path).expect("write test image");
    path.to_path_buf()
}

/// Write one tile into a map directory using the store layout
/// `tiles/<zoom>/<x>_<y>.<ext>`.
pub fn write_tile(map_dir: &Path, coord: &TileCoord, ext: &str) -> PathBuf {
    let path = map_dir
        .join("tiles")
        .join(coord.zoom.to_string())
        .join(format!("{}.{}", coord.file_stem(), ext));
    write_image(&path, TILE_SIZE, tile_color(coord))
}

/// Populate every tile of `region` except those listed in `skip`.
///
/// Returns the number of tiles written.
pub fn populate_region(map_dir: &Path, region: &TileRegion, ext: &str, skip: &[TileCoord]) -> usize {
    region
        .tiles()
        .filter(|coord| !skip.contains(coord))
        .map(|coord| write_tile(map_dir, &coord, ext))
        .count()
}

/// Pixel dimensions of an image file.
pub fn image_size(path: &Path) -> (u32, u32) {
    image::image_dimensions(path).expect("read image dimensions")
}

/// RGB value of one pixel in an image file.
pub fn pixel_at(path: &Path, x: u32, y: u32) -> [u8; 3] {
    let img = image::open(path).expect("open image").to_rgb8();
    img.get_pixel(x, y).0
}

/// Whether two colours are equal within JPEG noise.
pub fn colors_close(a: [u8; 3], b: [u8; 3], tolerance: u8) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x.abs_diff(*y) <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_tile_uses_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let coord = TileCoord::new(12, 3, 4);
        let path = write_tile(dir.path(), &coord, "png");
        assert_eq!(path, dir.path().join("tiles/12/3_4.png"));
        assert_eq!(image_size(&path), (TILE_SIZE, TILE_SIZE));
        assert_eq!(pixel_at(&path, 10, 10), tile_color(&coord));
    }

    #[test]
    fn test_populate_region_skips() {
        let dir = tempfile::tempdir().unwrap();
        let region = TileRegion::spanning(TileCoord::new(5, 1, 1), TileCoord::new(5, 2, 3));
        let written = populate_region(dir.path(), &region, "jpg", &[TileCoord::new(5, 2, 2)]);
        assert_eq!(written, 5);
        assert!(!dir.path().join("tiles/5/2_2.jpg").exists());
        assert!(dir.path().join("tiles/5/2_3.jpg").exists());
    }

    #[test]
    fn test_encoded_tile_formats() {
        let png = encoded_tile("png", [1, 2, 3]);
        assert_eq!(&png[1..4], b"PNG");
        let jpg = encoded_tile("jpg", [1, 2, 3]);
        assert_eq!(&jpg[..2], &[0xFF, 0xD8]);
    }
}
