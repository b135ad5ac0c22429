//! Projection of geographic coordinates onto the tile pyramid.
//!
//! Implements the ellipsoidal Mercator used by the tile service and the
//! planning of inclusive tile ranges from two corner points.

pub mod mercator;
pub mod planner;

pub use mercator::{project, EllipsoidalMercator};
pub use planner::{plan, TilePlanner};
