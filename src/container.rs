//! External container seams: the pixel source and the tile sink.
//!
//! The crate never touches files. Reading raw tiles and the embedded
//! metadata text is delegated to a [`PixelSource`]; writing assembled output
//! tiles and the synchronized metadata is delegated to a [`TileSink`]. Both
//! are async traits so implementations can sit on local files, object
//! storage, or in-memory fixtures alike.
//!
//! ```text
//!   container bytes                             container bytes
//!        |                                            ^
//!   PixelSource --> decode --> assemble --> TileSink -+
//!   (read seam)                             (write seam)
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::SampleLayout;
use crate::error::{SinkError, SourceError};

// =============================================================================
// Read Seam
// =============================================================================

/// Tile geometry of one resolution level as the container declares it.
///
/// The pixel source reports these at load time; the metadata model derives
/// downscale factors and tile grids from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLayout {
    /// Level width in pixels.
    pub width: u32,
    /// Level height in pixels.
    pub height: u32,
    /// Nominal tile width in pixels.
    pub tile_width: u32,
    /// Nominal tile height in pixels.
    pub tile_height: u32,
}

/// One raw (still encoded) tile as read from the container.
#[derive(Debug, Clone)]
pub struct RawTile {
    /// Encoded tile bytes, exactly as stored.
    pub data: Bytes,
    /// Valid pixel width. Smaller than the nominal tile width for the last
    /// column of a level.
    pub valid_width: u32,
    /// Valid pixel height. Smaller than the nominal tile height for the last
    /// row of a level.
    pub valid_height: u32,
}

/// Trait for reading tiles and metadata from a tiled pyramidal container.
///
/// This abstraction lets the geometry engine work against any storage
/// backend without seeing file offsets or on-disk tile indexing.
/// Implementations must be thread-safe; all access is read-only, so a source
/// can back any number of concurrent crop operations.
#[async_trait]
pub trait PixelSource: Send + Sync {
    /// Number of resolution levels the container declares. Level 0 is full
    /// resolution.
    fn level_count(&self) -> usize;

    /// Declared geometry of one level, or `None` if `level` is out of range.
    fn level_layout(&self, level: usize) -> Option<LevelLayout>;

    /// Read the embedded structured-metadata document (OME-XML) verbatim.
    async fn read_metadata_text(&self) -> Result<String, SourceError>;

    /// Read one raw tile.
    ///
    /// `plane` is the index into the image's plane list; `row` and `col`
    /// address the tile grid of `level`. The returned tile declares its
    /// valid extent so partial edge tiles are never mistaken for full ones.
    async fn read_tile(
        &self,
        level: usize,
        plane: usize,
        row: u32,
        col: u32,
    ) -> Result<RawTile, SourceError>;

    /// Get a unique identifier for this image (for logging and error text).
    fn identifier(&self) -> &str;
}

// =============================================================================
// Write Seam
// =============================================================================

/// One assembled, ready-to-write output tile.
///
/// `level`, `plane`, `row` and `col` address the *output* image's grids.
/// The pixel data is a tightly packed row-major raster of the tile's valid
/// extent; edge tiles carry only their valid pixels.
#[derive(Debug, Clone)]
pub struct OutputTile {
    /// Resolution level in the output pyramid.
    pub level: usize,
    /// Plane index in the (unchanged) plane list.
    pub plane: usize,
    /// Tile row in the output grid.
    pub row: u32,
    /// Tile column in the output grid.
    pub col: u32,
    /// Valid pixel width of this tile.
    pub width: u32,
    /// Valid pixel height of this tile.
    pub height: u32,
    /// Sample packing of `data`.
    pub layout: SampleLayout,
    /// Raster bytes, `layout.raster_bytes(width, height)` long.
    pub data: Bytes,
}

/// Trait for writing an output container.
///
/// The facade submits tiles grouped by level, then plane, then row-major
/// within the grid, and calls [`finalize`](TileSink::finalize) exactly once
/// after every tile has been written. `finalize` is never called when any
/// earlier write failed, so an unfinalized sink must treat its output as
/// invalid (write to a temporary location and promote it on finalize, or
/// equivalent).
#[async_trait]
pub trait TileSink: Send + Sync {
    /// Write one assembled output tile.
    async fn write_tile(&mut self, tile: &OutputTile) -> Result<(), SinkError>;

    /// Finish the container: embed the synchronized metadata document and
    /// make the output durable.
    async fn finalize(&mut self, metadata_text: &str) -> Result<(), SinkError>;
}
