//! Crop-window resolution: from a full-resolution crop rectangle to the
//! exact set of source tiles (and sub-rectangles) that cover it at one
//! pyramid level.
//!
//! # Coordinate Spaces
//!
//! Three spaces appear here and in the stream engine:
//!
//! - **level-local**: pixels of one resolution level, origin at the level's
//!   top-left corner. The scaled crop window lives here.
//! - **tile-local**: pixels within one source tile, origin at the tile's
//!   top-left corner. Contribution source rectangles live here.
//! - **window-local**: pixels of the assembled output, origin at the
//!   window's top-left corner. Contribution destinations live here.
//!
//! # Scaling
//!
//! The crop rectangle is given in level-0 coordinates. At a level with
//! downscale factor `f` the window is anchored at the floored origin
//! `(x / f, y / f)` and spans the ceiled extent `(⌈w / f⌉, ⌈h / f⌉)`, so it
//! never under-covers the fractional target and always matches the level
//! dimensions the metadata synchronizer derives for the same crop. Tiles
//! are then selected by nominal-box intersection and clipped against both
//! the window and the level's valid pixel area, which keeps partial edge
//! tiles partial.

use crate::error::GeometryError;
use crate::geometry::region::{CropRegion, PixelRect};
use crate::meta::model::ImageDescriptor;

/// One source tile's part in assembling the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileContribution {
    /// Source tile row within the level grid.
    pub tile_row: u32,
    /// Source tile column within the level grid.
    pub tile_col: u32,
    /// The pixels to take, in tile-local coordinates.
    pub source: PixelRect,
    /// Where they land, in window-local coordinates.
    pub dest: PixelRect,
}

/// A source tile patch copied into one output tile.
///
/// Produced by [`GeometryMap::output_patches`]; `dest` is local to that
/// output tile rather than to the whole window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPatch {
    pub tile_row: u32,
    pub tile_col: u32,
    /// Pixels to take, in tile-local coordinates of the source tile.
    pub source: PixelRect,
    /// Where they land, in output-tile-local coordinates.
    pub dest: PixelRect,
}

/// The resolved geometry of one crop at one pyramid level.
///
/// Contributions are ordered row-major by source tile and cover the window
/// exactly once. The map also describes the output tile grid: the window
/// extent re-tiled with the level's unchanged tile size, which is the grid
/// the derived descriptor declares for this level.
#[derive(Debug, Clone)]
pub struct GeometryMap {
    level: usize,
    factor: u32,
    window: PixelRect,
    tile_width: u32,
    tile_height: u32,
    contributions: Vec<TileContribution>,
}

impl GeometryMap {
    /// Resolve the crop window for one source level.
    ///
    /// Fails with [`GeometryError::UnknownLevel`] for an out-of-range level
    /// index, [`GeometryError::EmptyLevelWindow`] when the scaled window
    /// lies entirely outside the level's valid area, and
    /// [`GeometryError::DegenerateLevel`] when the level's declared extent
    /// cannot supply the full window. Callers applying a drop policy are
    /// expected to exclude degenerate levels before resolving.
    pub fn resolve(
        descriptor: &ImageDescriptor,
        region: CropRegion,
        level: usize,
    ) -> Result<GeometryMap, GeometryError> {
        let level_count = descriptor.levels().len();
        let source = descriptor
            .level(level)
            .ok_or(GeometryError::UnknownLevel { level, level_count })?;
        let factor = source.factor;

        let origin_x = region.x() / factor;
        let origin_y = region.y() / factor;
        let width = scaled_extent(region.width(), factor);
        let height = scaled_extent(region.height(), factor);

        let available_width = source.width.saturating_sub(origin_x);
        let available_height = source.height.saturating_sub(origin_y);
        if available_width == 0 || available_height == 0 {
            return Err(GeometryError::EmptyLevelWindow {
                level,
                level_width: source.width,
                level_height: source.height,
            });
        }
        if available_width < width || available_height < height {
            return Err(GeometryError::DegenerateLevel {
                level,
                needed_width: width,
                needed_height: height,
                level_width: source.width,
                level_height: source.height,
            });
        }

        let window = PixelRect::new(origin_x, origin_y, width, height);
        let level_box = PixelRect::new(0, 0, source.width, source.height);

        let first_col = window.x / source.tile_width;
        let last_col = (window.right() - 1) / source.tile_width;
        let first_row = window.y / source.tile_height;
        let last_row = (window.bottom() - 1) / source.tile_height;

        let span = (last_row - first_row + 1) as usize * (last_col - first_col + 1) as usize;
        let mut contributions = Vec::with_capacity(span);
        for tile_row in first_row..=last_row {
            for tile_col in first_col..=last_col {
                let nominal = PixelRect::new(
                    tile_col * source.tile_width,
                    tile_row * source.tile_height,
                    source.tile_width,
                    source.tile_height,
                );
                // Clip to the level's valid pixels, then to the window.
                let Some(valid) = nominal.intersect(&level_box) else {
                    continue;
                };
                let Some(overlap) = valid.intersect(&window) else {
                    continue;
                };
                contributions.push(TileContribution {
                    tile_row,
                    tile_col,
                    source: PixelRect::new(
                        overlap.x - nominal.x,
                        overlap.y - nominal.y,
                        overlap.width,
                        overlap.height,
                    ),
                    dest: PixelRect::new(
                        overlap.x - window.x,
                        overlap.y - window.y,
                        overlap.width,
                        overlap.height,
                    ),
                });
            }
        }

        Ok(GeometryMap {
            level,
            factor,
            window,
            tile_width: source.tile_width,
            tile_height: source.tile_height,
            contributions,
        })
    }

    /// Source level index this map was resolved for.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Downscale factor of the source level.
    pub fn factor(&self) -> u32 {
        self.factor
    }

    /// The scaled crop window in level-local coordinates.
    pub fn window(&self) -> PixelRect {
        self.window
    }

    /// Ordered source tile contributions covering the window.
    pub fn contributions(&self) -> &[TileContribution] {
        &self.contributions
    }

    /// Number of distinct source tile columns the window touches.
    pub fn source_tile_cols(&self) -> u32 {
        (self.window.right() - 1) / self.tile_width - self.window.x / self.tile_width + 1
    }

    /// Output tile grid as (columns, rows).
    pub fn output_grid(&self) -> (u32, u32) {
        (
            scaled_extent(self.window.width, self.tile_width),
            scaled_extent(self.window.height, self.tile_height),
        )
    }

    /// Valid pixel extent of one output tile, `None` outside the grid.
    ///
    /// Mirrors the edge rule of the source grid: the last row and column
    /// hold whatever the window extent leaves over.
    pub fn output_tile_extent(&self, row: u32, col: u32) -> Option<(u32, u32)> {
        let (cols, rows) = self.output_grid();
        if col >= cols || row >= rows {
            return None;
        }
        let width = (self.window.width - col * self.tile_width).min(self.tile_width);
        let height = (self.window.height - row * self.tile_height).min(self.tile_height);
        Some((width, height))
    }

    /// The source patches assembling one output tile.
    ///
    /// Each patch pairs a tile-local source rectangle with its destination
    /// inside the output tile. Patches cover the output tile's valid extent
    /// exactly once; an out-of-grid address yields none.
    pub fn output_patches(&self, row: u32, col: u32) -> Vec<OutputPatch> {
        let Some((width, height)) = self.output_tile_extent(row, col) else {
            return Vec::new();
        };
        let tile_box = PixelRect::new(
            col * self.tile_width,
            row * self.tile_height,
            width,
            height,
        );

        self.contributions
            .iter()
            .filter_map(|c| {
                let overlap = c.dest.intersect(&tile_box)?;
                Some(OutputPatch {
                    tile_row: c.tile_row,
                    tile_col: c.tile_col,
                    source: PixelRect::new(
                        c.source.x + (overlap.x - c.dest.x),
                        c.source.y + (overlap.y - c.dest.y),
                        overlap.width,
                        overlap.height,
                    ),
                    dest: PixelRect::new(
                        overlap.x - tile_box.x,
                        overlap.y - tile_box.y,
                        overlap.width,
                        overlap.height,
                    ),
                })
            })
            .collect()
    }
}

/// Pixels a level needs along one axis to cover `extent` level-0 pixels.
fn scaled_extent(extent: u32, factor: u32) -> u32 {
    (extent + factor - 1) / factor
}
