//! Lazy assembly of output tiles.
//!
//! A [`TileStream`] drives one (plane, level) pass over a resolved
//! [`GeometryMap`]: it walks the output tile grid in row-major order and,
//! for each output tile, decodes the contributing source tiles and copies
//! their patches into a freshly assembled buffer. Tiles are produced one at
//! a time on demand; nothing is read from the source until the tile that
//! needs it is requested.
//!
//! The pass is finite and one-shot. Once a tile fails to assemble the
//! stream ends; a new pass re-resolves and re-reads, matching the rule that
//! source corruption is fatal rather than retried.
//!
//! Source tiles sitting under an output tile boundary are needed by two or
//! four adjacent output tiles; a per-pass [`TileDecodeCache`] keeps them
//! decoded so each distinct source tile is decoded at most once per pass.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::codec::{PixelBuffer, SampleLayout, TileCodec};
use crate::container::{OutputTile, PixelSource};
use crate::error::StreamError;
use crate::geometry::GeometryMap;
use crate::stream::decode_cache::TileDecodeCache;

/// Parameters of one streaming pass.
#[derive(Debug, Clone, Copy)]
pub struct PlanePass {
    /// Index into the image's plane list.
    pub plane: usize,
    /// Level index stamped on produced tiles. This is the *output*
    /// pyramid's index, which trails the source index once degenerate
    /// levels have been dropped.
    pub output_level: usize,
    /// Declared sample layout of the plane's channel.
    pub layout: SampleLayout,
}

/// Pull-based producer of assembled output tiles for one pass.
///
/// Distinct passes share no mutable state, so one pass per (plane, level)
/// combination can run on concurrent tasks against the same source.
pub struct TileStream<S, C> {
    source: Arc<S>,
    codec: Arc<C>,
    map: GeometryMap,
    pass: PlanePass,
    cache: TileDecodeCache,
    cursor_row: u32,
    cursor_col: u32,
    finished: bool,
}

impl<S: PixelSource, C: TileCodec> TileStream<S, C> {
    /// Start a pass with a decode cache sized for row-major traversal.
    ///
    /// Two source tile rows bound what a row of output tiles can touch, so
    /// holding that many decoded tiles guarantees at-most-once decode for
    /// the whole pass.
    pub fn new(source: Arc<S>, codec: Arc<C>, map: GeometryMap, pass: PlanePass) -> Self {
        let capacity = map.source_tile_cols() as usize * 2 + 2;
        Self::with_cache_capacity(source, codec, map, pass, capacity)
    }

    /// Start a pass with an explicit decode cache capacity.
    ///
    /// A smaller cache only costs repeated decodes; assembled output is
    /// identical for any capacity.
    pub fn with_cache_capacity(
        source: Arc<S>,
        codec: Arc<C>,
        map: GeometryMap,
        pass: PlanePass,
        capacity: usize,
    ) -> Self {
        debug!(
            source_level = map.level(),
            output_level = pass.output_level,
            plane = pass.plane,
            window = ?map.window(),
            cache_tiles = capacity,
            "starting tile stream pass"
        );
        Self {
            source,
            codec,
            map,
            pass,
            cache: TileDecodeCache::new(capacity),
            cursor_row: 0,
            cursor_col: 0,
            finished: false,
        }
    }

    /// Produce the next assembled output tile, or `None` when the pass is
    /// complete. After an error the stream is finished; subsequent calls
    /// return `None`.
    pub async fn next_tile(&mut self) -> Option<Result<OutputTile, StreamError>> {
        if self.finished {
            return None;
        }
        let (cols, _) = self.map.output_grid();
        let (row, col) = (self.cursor_row, self.cursor_col);
        let Some((width, height)) = self.map.output_tile_extent(row, col) else {
            self.finished = true;
            return None;
        };

        self.cursor_col += 1;
        if self.cursor_col == cols {
            self.cursor_col = 0;
            self.cursor_row += 1;
        }

        let result = self.assemble(row, col, width, height).await;
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }

    /// Assemble one output tile from its source patches.
    async fn assemble(
        &self,
        row: u32,
        col: u32,
        width: u32,
        height: u32,
    ) -> Result<OutputTile, StreamError> {
        let layout = self.pass.layout;
        let bytes_per_pixel = layout.bytes_per_pixel();
        let mut data = vec![0u8; layout.raster_bytes(width, height)];

        for patch in self.map.output_patches(row, col) {
            let decoded = self.decoded_tile(patch.tile_row, patch.tile_col).await?;
            if decoded.layout != layout {
                return Err(self.mismatch(
                    patch.tile_row,
                    patch.tile_col,
                    format!(
                        "decoded layout {:?} does not match the declared {:?}",
                        decoded.layout, layout
                    ),
                ));
            }
            if patch.source.right() > decoded.width || patch.source.bottom() > decoded.height {
                return Err(self.mismatch(
                    patch.tile_row,
                    patch.tile_col,
                    format!(
                        "decoded extent {}x{} cannot supply pixels at ({}, {}) extent {}x{}",
                        decoded.width,
                        decoded.height,
                        patch.source.x,
                        patch.source.y,
                        patch.source.width,
                        patch.source.height
                    ),
                ));
            }

            let run = patch.source.width as usize * bytes_per_pixel;
            for y in 0..patch.source.height {
                let src = ((patch.source.y + y) as usize * decoded.width as usize
                    + patch.source.x as usize)
                    * bytes_per_pixel;
                let dst = ((patch.dest.y + y) as usize * width as usize + patch.dest.x as usize)
                    * bytes_per_pixel;
                data[dst..dst + run].copy_from_slice(&decoded.data[src..src + run]);
            }
        }

        Ok(OutputTile {
            level: self.pass.output_level,
            plane: self.pass.plane,
            row,
            col,
            width,
            height,
            layout,
            data: Bytes::from(data),
        })
    }

    /// Fetch and decode one source tile through the per-pass cache.
    async fn decoded_tile(&self, tile_row: u32, tile_col: u32) -> Result<PixelBuffer, StreamError> {
        let level = self.map.level();
        let plane = self.pass.plane;
        let layout = self.pass.layout;
        let source = &self.source;
        let codec = &self.codec;

        self.cache
            .get_or_decode((tile_row, tile_col), || async move {
                let raw = source
                    .read_tile(level, plane, tile_row, tile_col)
                    .await
                    .map_err(|e| StreamError::SourceRead {
                        level,
                        plane,
                        row: tile_row,
                        col: tile_col,
                        source: e,
                    })?;
                codec.decode(&raw, layout).map_err(|e| StreamError::Decode {
                    level,
                    plane,
                    row: tile_row,
                    col: tile_col,
                    source: e,
                })
            })
            .await
    }

    fn mismatch(&self, tile_row: u32, tile_col: u32, message: String) -> StreamError {
        StreamError::ChannelMismatch {
            level: self.map.level(),
            plane: self.pass.plane,
            row: tile_row,
            col: tile_col,
            message,
        }
    }
}
