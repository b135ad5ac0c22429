//! Grid composition backends.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use map_common::{ComposerKind, MapError, MapResult, MosaicConfig};
use tracing::debug;

/// Concatenates images into a `columns × rows` grid, row-major, without
/// scaling or blending.
pub trait GridComposer: Send + Sync {
    fn name(&self) -> &str;

    fn compose(&self, inputs: &[PathBuf], columns: u32, rows: u32, output: &Path) -> MapResult<()>;
}

/// Pick the backend configured for the builder.
pub fn composer_for(config: &MosaicConfig) -> Box<dyn GridComposer> {
    match config.composer {
        ComposerKind::Image => Box::new(ImageGridComposer::new(config.jpeg_quality)),
        ComposerKind::Montage => Box::new(MontageComposer::new(
            config.montage_program.clone(),
            config.jpeg_quality,
        )),
    }
}

fn check_input_count(inputs: &[PathBuf], columns: u32, rows: u32, output: &Path) -> MapResult<()> {
    let expected = columns as usize * rows as usize;
    if inputs.len() != expected || expected == 0 {
        return Err(MapError::composition(
            output,
            format!(
                "{} inputs do not fill a {}x{} grid",
                inputs.len(),
                columns,
                rows
            ),
        ));
    }
    Ok(())
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// In-process composition with the `image` crate.
///
/// Each column is as wide as its widest image and each row as tall as its
/// tallest, so mixed sizes still line up without overlap. Output format
/// follows the extension: JPEG at the configured quality, PNG otherwise.
pub struct ImageGridComposer {
    jpeg_quality: u8,
}

impl ImageGridComposer {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }

    fn encode(&self, canvas: RgbaImage, output: &Path) -> MapResult<()> {
        if is_jpeg(output) {
            let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
            let file = File::create(output).map_err(|e| MapError::storage(output, e))?;
            JpegEncoder::new_with_quality(BufWriter::new(file), self.jpeg_quality)
                .encode_image(&rgb)
                .map_err(|e| MapError::composition(output, e))
        } else {
            canvas
                .save_with_format(output, ImageFormat::Png)
                .map_err(|e| MapError::composition(output, e))
        }
    }
}

impl GridComposer for ImageGridComposer {
    fn name(&self) -> &str {
        "image"
    }

    fn compose(&self, inputs: &[PathBuf], columns: u32, rows: u32, output: &Path) -> MapResult<()> {
        check_input_count(inputs, columns, rows, output)?;

        // Header-only pass for the layout.
        let mut widths = vec![0u32; columns as usize];
        let mut heights = vec![0u32; rows as usize];
        for (i, input) in inputs.iter().enumerate() {
            let (w, h) = image::image_dimensions(input)
                .map_err(|e| MapError::composition(output, format!("{}: {}", input.display(), e)))?;
            let (col, row) = (i % columns as usize, i / columns as usize);
            widths[col] = widths[col].max(w);
            heights[row] = heights[row].max(h);
        }

        let offsets = |sizes: &[u32]| -> Vec<u32> {
            sizes
                .iter()
                .scan(0u32, |acc, size| {
                    let start = *acc;
                    *acc += size;
                    Some(start)
                })
                .collect()
        };
        let x_offsets = offsets(&widths);
        let y_offsets = offsets(&heights);

        let mut canvas = RgbaImage::new(widths.iter().sum(), heights.iter().sum());
        for (i, input) in inputs.iter().enumerate() {
            let tile = image::open(input)
                .map_err(|e| MapError::composition(output, format!("{}: {}", input.display(), e)))?
                .to_rgba8();
            let (col, row) = (i % columns as usize, i / columns as usize);
            imageops::replace(
                &mut canvas,
                &tile,
                x_offsets[col] as i64,
                y_offsets[row] as i64,
            );
        }

        debug!(
            output = %output.display(),
            width = canvas.width(),
            height = canvas.height(),
            "Composed grid"
        );
        self.encode(canvas, output)
    }
}

/// ImageMagick `montage`, for grids too large to hold in memory.
pub struct MontageComposer {
    program: String,
    quality: u8,
}

impl MontageComposer {
    pub fn new(program: impl Into<String>, quality: u8) -> Self {
        Self {
            program: program.into(),
            quality,
        }
    }

    /// Argument list passed to the program.
    pub fn arguments(&self, inputs: &[PathBuf], columns: u32, rows: u32, output: &Path) -> Vec<String> {
        let mut args = vec!["montage".to_string()];
        args.extend(inputs.iter().map(|p| p.display().to_string()));
        args.extend([
            "-quality".to_string(),
            format!("{}%", self.quality),
            "-mode".to_string(),
            "Concatenate".to_string(),
            "-tile".to_string(),
            format!("{}x{}", columns, rows),
            output.display().to_string(),
        ]);
        args
    }
}

impl GridComposer for MontageComposer {
    fn name(&self) -> &str {
        "montage"
    }

    fn compose(&self, inputs: &[PathBuf], columns: u32, rows: u32, output: &Path) -> MapResult<()> {
        check_input_count(inputs, columns, rows, output)?;

        let args = self.arguments(inputs, columns, rows, output);
        debug!(program = %self.program, args = args.len(), output = %output.display(), "Running montage");

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| MapError::composition(output, format!("cannot run {}: {}", self.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(MapError::composition(
                output,
                format!("{} exited with {}: {}", self.program, result.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::generators::{image_size, pixel_at, write_image};

    fn rect(dir: &Path, name: &str, w: u32, h: u32, color: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_pixel(w, h, image::Rgb(color))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_uneven_sizes_align_on_widest_and_tallest() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![
            rect(dir.path(), "a.png", 100, 50, [255, 0, 0]),
            rect(dir.path(), "b.png", 30, 80, [0, 255, 0]),
            rect(dir.path(), "c.png", 60, 20, [0, 0, 255]),
            rect(dir.path(), "d.png", 10, 10, [9, 9, 9]),
        ];
        let output = dir.path().join("out.png");

        ImageGridComposer::new(90)
            .compose(&inputs, 2, 2, &output)
            .unwrap();

        assert_eq!(image_size(&output), (130, 100));
        assert_eq!(pixel_at(&output, 0, 0), [255, 0, 0]);
        assert_eq!(pixel_at(&output, 100, 0), [0, 255, 0]);
        assert_eq!(pixel_at(&output, 0, 80), [0, 0, 255]);
        assert_eq!(pixel_at(&output, 100, 80), [9, 9, 9]);
    }

    #[test]
    fn test_jpeg_output() {
        let dir = tempfile::tempdir().unwrap();
        let tile = write_image(&dir.path().join("t.jpg"), 16, [200, 200, 200]);
        let output = dir.path().join("grid.jpg");

        ImageGridComposer::new(100)
            .compose(&[tile.clone(), tile.clone(), tile], 3, 1, &output)
            .unwrap();

        assert_eq!(image_size(&output), (48, 16));
        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_input_count_must_fill_grid() {
        let dir = tempfile::tempdir().unwrap();
        let tile = write_image(&dir.path().join("t.png"), 8, [1, 1, 1]);
        let err = ImageGridComposer::new(100)
            .compose(&[tile], 2, 1, &dir.path().join("x.png"))
            .unwrap_err();
        assert!(matches!(err, MapError::Composition { .. }));
    }

    #[test]
    fn test_unreadable_input_is_composition_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageGridComposer::new(100)
            .compose(&[dir.path().join("missing.png")], 1, 1, &dir.path().join("x.png"))
            .unwrap_err();
        assert_eq!(err.kind(), map_common::ErrorKind::Assembly);
    }

    #[test]
    fn test_montage_arguments() {
        let composer = MontageComposer::new("magick", 100);
        let args = composer.arguments(
            &[PathBuf::from("a.jpg"), PathBuf::from("b.jpg")],
            2,
            1,
            Path::new("out.jpg"),
        );
        assert_eq!(
            args,
            vec![
                "montage", "a.jpg", "b.jpg", "-quality", "100%", "-mode", "Concatenate", "-tile",
                "2x1", "out.jpg"
            ]
        );
    }

    #[test]
    fn test_montage_missing_program_fails() {
        let composer = MontageComposer::new("definitely-not-a-real-montage-binary", 100);
        let err = composer
            .compose(&[PathBuf::from("a.jpg")], 1, 1, Path::new("out.jpg"))
            .unwrap_err();
        assert!(matches!(err, MapError::Composition { .. }));
    }

    #[test]
    fn test_composer_for_config() {
        let mut config = MosaicConfig::default();
        assert_eq!(composer_for(&config).name(), "image");
        config.composer = ComposerKind::Montage;
        assert_eq!(composer_for(&config).name(), "montage");
    }
}
