//! Shared test utilities for the map-tiles workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Reference coordinates and config fixtures
//! - Tile image generators and on-disk store layouts
//! - Approximate float assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures::points, generators};
//! ```

pub mod fixtures;
pub mod generators;

pub use generators::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Asserts that an image file decodes to the expected pixel dimensions.
///
/// ```ignore
/// test_utils::assert_image_size!(&output, 512, 256);
/// ```
#[macro_export]
macro_rules! assert_image_size {
    ($path:expr, $width:expr, $height:expr) => {{
        let path: &std::path::Path = $path.as_ref();
        let (w, h) = $crate::generators::image_size(path);
        assert_eq!(
            (w, h),
            ($width as u32, $height as u32),
            "unexpected dimensions for {}",
            path.display()
        );
    }};
}
