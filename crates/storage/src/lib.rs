//! On-disk tile storage for the downloader and the mosaic builder.
//!
//! A map directory holds one layer/version snapshot:
//!
//! ```text
//! <map dir>/
//!   tiles/<zoom>/<x>_<y>.<ext>     downloaded tiles
//!   tiles/<zoom>/<x>_<y>.<ext>.part  in-flight downloads
//!   prepare/<bx>_<by>.jpg          intermediate mosaic blocks
//! ```
//!
//! A tile file that exists under its final name is complete.

pub mod tile_lock;
pub mod tile_store;

pub use tile_lock::{TileLockGuard, TileLocks};
pub use tile_store::{TileStore, PARTIAL_SUFFIX, TILE_EXTENSIONS};
