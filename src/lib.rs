//! # OME Slicer
//!
//! A tile-addressable geometry engine for cropping pyramidal, multi-channel
//! OME-TIFF microscopy images.
//!
//! This library resolves a full-resolution crop rectangle into the exact set
//! of source tiles it touches at every pyramid level, streams those regions
//! into freshly assembled output tiles, and rewrites the embedded OME-XML
//! document so the saved image describes itself correctly. Whole-image
//! decodes never happen; a crop touching 4% of a slide reads roughly 4% of
//! its tiles.
//!
//! ## Features
//!
//! - **Tile-exact reads**: a crop fetches only the source tiles its scaled
//!   window intersects, at every level
//! - **Pyramid-wide consistency**: one rounding rule derives each level's
//!   window, so pixel geometry and the rewritten metadata cannot drift
//! - **Lazy assembly**: output tiles are pulled one at a time per
//!   (level, plane) pass, with a bounded decode cache for tiles that
//!   straddle output boundaries
//! - **Round-trip metadata**: attributes the model does not interpret are
//!   preserved byte-for-byte through load, crop and save
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`meta`] - OME-XML document model, parser/writer, and crop-time
//!   metadata synchronization
//! - [`geometry`] - crop validation and per-level tile-set resolution
//! - [`stream`] - lazy output-tile assembly with decode caching
//! - [`slicer`] - the load/crop/save facade
//! - [`container`] - storage seams ([`PixelSource`], [`TileSink`])
//! - [`codec`] - sample packing and the tile decode seam ([`TileCodec`])
//! - [`error`] - error types for each subsystem
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ome_slicer::{OmeSlicer, PixelSource, SliceError, TileCodec, TileSink};
//!
//! async fn extract_region<S, C, K>(
//!     source: S,
//!     codec: Arc<C>,
//!     sink: &mut K,
//! ) -> Result<(), SliceError>
//! where
//!     S: PixelSource,
//!     C: TileCodec,
//!     K: TileSink,
//! {
//!     let slicer = OmeSlicer::load(source).await?;
//!     let (width, height, channels) = slicer.dimensions();
//!     println!("loaded {width}x{height}, {channels} channels");
//!
//!     let cropped = slicer.crop(10_000, 10_000, 5_000, 5_000)?;
//!     cropped.save(codec, sink).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod container;
pub mod error;
pub mod geometry;
pub mod meta;
pub mod slicer;
pub mod stream;

// Re-export commonly used types
pub use codec::{PixelBuffer, SampleLayout, TileCodec};
pub use container::{LevelLayout, OutputTile, PixelSource, RawTile, TileSink};
pub use error::{
    CodecError, GeometryError, MetadataError, SinkError, SliceError, SourceError, StreamError,
};
pub use geometry::{CropRegion, GeometryMap, OutputPatch, PixelRect, TileContribution};
pub use meta::{
    dense_planes, derive_cropped, parse_ome_xml, write_ome_xml, ChannelDescriptor, CropDerivation,
    DegenerateLevelPolicy, ExtraAttrs, ImageDescriptor, OmeMetadata, PhysicalCalibration,
    PhysicalSize, PixelType, PlaneDescriptor, ResolutionLevel,
};
pub use slicer::{OmeSlicer, SlicerOptions};
pub use stream::{PlanePass, TileDecodeCache, TileStream};
