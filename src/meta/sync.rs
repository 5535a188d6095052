//! Cropped-descriptor derivation.
//!
//! Cropping changes the X/Y extent of the image and nothing else: channel
//! and plane composition, pixel type, calibration and tile sizes all carry
//! over unchanged. Each retained pyramid level keeps the downscale factor
//! the source declared for it and gets its dimensions recomputed from the
//! crop extent under that factor, so every level agrees with the window the
//! geometry resolver will assemble for it. Recomputing factors from the
//! cropped dimensions instead would let rounding drift between levels.
//!
//! A level the crop leaves unable to supply its recomputed extent is
//! degenerate; [`DegenerateLevelPolicy`] decides whether it is dropped from
//! the derived pyramid or fails the operation.

use tracing::warn;

use crate::error::GeometryError;
use crate::geometry::CropRegion;
use crate::meta::model::{ImageDescriptor, ResolutionLevel};

/// What to do with a pyramid level that cannot supply the scaled crop
/// window (possible when a source declares smaller level dimensions than
/// ceiling division of level 0 would give).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DegenerateLevelPolicy {
    /// Drop the level from the derived pyramid and log the decision.
    #[default]
    Drop,
    /// Fail the whole operation with [`GeometryError::DegenerateLevel`].
    Fail,
}

/// A derived cropped descriptor plus the source-level bookkeeping.
#[derive(Debug, Clone)]
pub struct CropDerivation {
    /// Descriptor of the cropped image.
    pub descriptor: ImageDescriptor,
    /// Source level index behind each output level, in output order.
    pub retained_levels: Vec<usize>,
    /// Source level indices dropped as degenerate, if any.
    pub dropped_levels: Vec<usize>,
}

/// Derive the descriptor of the image a crop produces.
///
/// The source descriptor is never mutated. Level 0 of the result is exactly
/// the crop extent; deeper levels scale it by their inherited factors with
/// the origin rounded down and the extent rounded up, matching the window
/// the resolver reads for each level. The region must have been validated
/// against this descriptor's full-resolution extent, which also guarantees
/// level 0 itself can never be degenerate.
pub fn derive_cropped(
    source: &ImageDescriptor,
    region: CropRegion,
    policy: DegenerateLevelPolicy,
) -> Result<CropDerivation, GeometryError> {
    let mut levels = Vec::with_capacity(source.levels().len());
    let mut retained_levels = Vec::with_capacity(source.levels().len());
    let mut dropped_levels = Vec::new();

    for level in source.levels() {
        let needed_width = scaled_extent(region.width(), level.factor);
        let needed_height = scaled_extent(region.height(), level.factor);
        let available_width = level.width.saturating_sub(region.x() / level.factor);
        let available_height = level.height.saturating_sub(region.y() / level.factor);

        if available_width < needed_width || available_height < needed_height {
            match policy {
                DegenerateLevelPolicy::Fail => {
                    return Err(GeometryError::DegenerateLevel {
                        level: level.index,
                        needed_width,
                        needed_height,
                        level_width: level.width,
                        level_height: level.height,
                    });
                }
                DegenerateLevelPolicy::Drop => {
                    warn!(
                        level = level.index,
                        needed_width,
                        needed_height,
                        level_width = level.width,
                        level_height = level.height,
                        "dropping degenerate pyramid level from cropped output"
                    );
                    dropped_levels.push(level.index);
                    continue;
                }
            }
        }

        levels.push(ResolutionLevel::new(
            levels.len(),
            level.factor,
            needed_width,
            needed_height,
            level.tile_width,
            level.tile_height,
        ));
        retained_levels.push(level.index);
    }

    let mut meta = source.metadata().clone();
    meta.size_x = region.width();
    meta.size_y = region.height();

    Ok(CropDerivation {
        descriptor: ImageDescriptor { meta, levels },
        retained_levels,
        dropped_levels,
    })
}

/// Pixels a level needs along one axis to cover `extent` level-0 pixels.
fn scaled_extent(extent: u32, factor: u32) -> u32 {
    (extent + factor - 1) / factor
}
