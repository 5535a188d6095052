//! Crop geometry: validated regions and per-level tile resolution.
//!
//! [`CropRegion`] is the validated user request in full-resolution
//! coordinates; [`GeometryMap::resolve`] turns it into the gap-free,
//! overlap-free set of source tile contributions for one pyramid level,
//! plus the output tile grid those contributions assemble into.

mod region;
mod resolver;

pub use region::{CropRegion, PixelRect};
pub use resolver::{GeometryMap, OutputPatch, TileContribution};
