//! Mosaic assembly from stored tiles.
//!
//! A region is cut into square blocks of tiles. Phase 1 composes every block
//! into `prepare/<bx>_<by>.jpg`; phase 2 concatenates the blocks into the
//! final image. Grid composition itself is delegated to a [`GridComposer`].

pub mod assembler;
pub mod compose;

pub use assembler::{BlockGrid, MosaicAssembler, MosaicSummary};
pub use compose::{composer_for, GridComposer, ImageGridComposer, MontageComposer};
