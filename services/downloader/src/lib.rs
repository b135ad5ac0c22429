//! Tile downloader library.
//!
//! This module exposes the internal modules for testing purposes.

pub mod fetch;
pub mod metrics;
pub mod mirrors;
pub mod pacer;
pub mod scheduler;

pub use fetch::{DownloadOutcome, TileFetcher};
pub use mirrors::MirrorPool;
pub use pacer::{BurstEnd, Pacer};
pub use scheduler::{FetchRun, RunSummary};
