//! The slicer facade: load, crop, save.
//!
//! [`OmeSlicer`] ties the subsystems together. Loading reads the embedded
//! OME-XML and the container's level layouts and assembles the image
//! descriptor. Cropping validates the requested rectangle, derives the
//! cropped descriptor and its serialized document eagerly, and hands back a
//! new handle; the source handle is untouched and can keep serving reads.
//! Saving resolves the geometry per retained level and streams assembled
//! tiles to a sink, finalizing it only after every tile was written.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          OmeSlicer                           │
//! │                                                              │
//! │  load()            crop()                save()              │
//! │    │                 │                     │                 │
//! │    ▼                 ▼                     ▼                 │
//! │  ┌───────────┐   ┌──────────────────┐   ┌────────────────┐  │
//! │  │ ome_xml + │   │ CropRegion +     │   │ GeometryMap +  │  │
//! │  │ assemble  │   │ derive_cropped + │   │ TileStream per │  │
//! │  │           │   │ write_ome_xml    │   │ (level, plane) │  │
//! │  └─────┬─────┘   └──────────────────┘   └───────┬────────┘  │
//! └────────┼─────────────────────────────────────────┼──────────┘
//!          │                                         │
//!          ▼                                         ▼
//!    PixelSource (read seam)                  TileSink (write seam)
//! ```
//!
//! # Crop Semantics
//!
//! Crop coordinates are always full-resolution coordinates of the *loaded*
//! image. Cropping an already cropped handle replaces the selection rather
//! than composing with it, because every handle keeps the original
//! descriptor as its source of truth.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::codec::TileCodec;
use crate::container::{PixelSource, TileSink};
use crate::error::{MetadataError, SliceError};
use crate::geometry::{CropRegion, GeometryMap};
use crate::meta::model::ImageDescriptor;
use crate::meta::ome_xml::{parse_ome_xml, write_ome_xml};
use crate::meta::sync::{derive_cropped, CropDerivation, DegenerateLevelPolicy};
use crate::stream::{PlanePass, TileStream};

// =============================================================================
// Options
// =============================================================================

/// Tuning knobs for a slicer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlicerOptions {
    /// Policy for pyramid levels a crop leaves degenerate.
    pub degenerate_levels: DegenerateLevelPolicy,
    /// Decode cache capacity per streaming pass, in tiles. `None` sizes the
    /// cache from the resolved geometry (two source tile rows).
    pub decode_cache_tiles: Option<usize>,
}

impl SlicerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_degenerate_levels(mut self, policy: DegenerateLevelPolicy) -> Self {
        self.degenerate_levels = policy;
        self
    }

    pub fn with_decode_cache_tiles(mut self, tiles: usize) -> Self {
        self.decode_cache_tiles = Some(tiles);
        self
    }
}

// =============================================================================
// Crop State
// =============================================================================

/// Everything `crop()` computes eagerly, so accessors and `save()` read
/// consistent state.
#[derive(Debug, Clone)]
struct CropState {
    region: CropRegion,
    derivation: CropDerivation,
    metadata_text: Arc<str>,
}

// =============================================================================
// OmeSlicer
// =============================================================================

/// A loaded pyramidal image and, optionally, a crop selection on it.
///
/// Handles are cheap to clone-by-derivation: `crop()` returns a new slicer
/// sharing the immutable source and descriptor behind [`Arc`]s. All reads
/// go through the [`PixelSource`] seam, so a slicer never touches storage
/// details.
pub struct OmeSlicer<S> {
    source: Arc<S>,
    descriptor: Arc<ImageDescriptor>,
    metadata_text: Arc<str>,
    options: SlicerOptions,
    crop: Option<CropState>,
}

impl<S: PixelSource> OmeSlicer<S> {
    /// Load an image with default options.
    pub async fn load(source: S) -> Result<Self, SliceError> {
        Self::load_with_options(source, SlicerOptions::default()).await
    }

    /// Load an image: read its OME-XML, collect the declared level
    /// layouts, and assemble the descriptor.
    ///
    /// Fails if the document is malformed or inconsistent, or if the
    /// container's pyramid declaration cannot be reconciled with it.
    pub async fn load_with_options(source: S, options: SlicerOptions) -> Result<Self, SliceError> {
        let source = Arc::new(source);
        let text = source.read_metadata_text().await?;
        let meta = parse_ome_xml(&text)?;

        let mut layouts = Vec::with_capacity(source.level_count());
        for level in 0..source.level_count() {
            let layout = source
                .level_layout(level)
                .ok_or_else(|| MetadataError::InvalidPyramid {
                    level,
                    message: "source declares no layout for this level".to_string(),
                })?;
            layouts.push(layout);
        }
        let descriptor = ImageDescriptor::assemble(meta, &layouts)?;

        info!(
            identifier = source.identifier(),
            width = descriptor.width(),
            height = descriptor.height(),
            levels = layouts.len(),
            planes = descriptor.plane_count(),
            "loaded image"
        );

        Ok(Self {
            source,
            descriptor: Arc::new(descriptor),
            metadata_text: Arc::from(text),
            options,
            crop: None,
        })
    }

    /// Select a crop region, returning a new handle for the cropped image.
    ///
    /// `x`, `y`, `width` and `height` are full-resolution coordinates of
    /// the loaded image; see the module docs for re-crop semantics. The
    /// cropped descriptor and its OME-XML document are derived here, so the
    /// new handle answers [`dimensions`](Self::dimensions) and
    /// [`metadata_text`](Self::metadata_text) without further work and
    /// [`save`](Self::save) cannot observe a descriptor/document mismatch.
    ///
    /// Fails if the rectangle is empty or out of bounds, or, under
    /// [`DegenerateLevelPolicy::Fail`], if any pyramid level cannot supply
    /// the scaled window.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, SliceError> {
        let region = CropRegion::new(
            x,
            y,
            width,
            height,
            self.descriptor.width(),
            self.descriptor.height(),
        )?;
        let derivation = derive_cropped(&self.descriptor, region, self.options.degenerate_levels)?;
        let metadata_text = write_ome_xml(derivation.descriptor.metadata())?;

        info!(
            identifier = self.source.identifier(),
            x,
            y,
            width,
            height,
            dropped_levels = derivation.dropped_levels.len(),
            "selected crop region"
        );

        Ok(Self {
            source: Arc::clone(&self.source),
            descriptor: Arc::clone(&self.descriptor),
            metadata_text: Arc::clone(&self.metadata_text),
            options: self.options,
            crop: Some(CropState {
                region,
                derivation,
                metadata_text: Arc::from(metadata_text),
            }),
        })
    }

    /// Stream the cropped image into `sink`.
    ///
    /// Requires a crop selection; a lossless copy is a full-image crop
    /// followed by save. Tiles are written grouped by output level, then
    /// plane, then row-major within the grid, and the synchronized OME-XML
    /// document is submitted exactly once at the end. On any failure the
    /// sink is never finalized, so partial output is never mistaken for a
    /// valid image.
    pub async fn save<C, K>(&self, codec: Arc<C>, sink: &mut K) -> Result<(), SliceError>
    where
        C: TileCodec,
        K: TileSink,
    {
        let crop = self.crop.as_ref().ok_or(SliceError::NoCropRegion)?;
        let output = &crop.derivation.descriptor;

        info!(
            identifier = self.source.identifier(),
            width = output.width(),
            height = output.height(),
            levels = output.levels().len(),
            planes = output.plane_count(),
            "saving cropped image"
        );

        for (output_level, &source_level) in crop.derivation.retained_levels.iter().enumerate() {
            let map = GeometryMap::resolve(&self.descriptor, crop.region, source_level)?;
            for plane in 0..output.plane_count() {
                let layout =
                    output
                        .plane_layout(plane)
                        .ok_or_else(|| MetadataError::InvalidPlaneReference {
                            plane,
                            message: "plane references no channel".to_string(),
                        })?;
                let pass = PlanePass {
                    plane,
                    output_level,
                    layout,
                };
                let mut stream = match self.options.decode_cache_tiles {
                    Some(capacity) => TileStream::with_cache_capacity(
                        Arc::clone(&self.source),
                        Arc::clone(&codec),
                        map.clone(),
                        pass,
                        capacity,
                    ),
                    None => TileStream::new(
                        Arc::clone(&self.source),
                        Arc::clone(&codec),
                        map.clone(),
                        pass,
                    ),
                };
                while let Some(tile) = stream.next_tile().await {
                    sink.write_tile(&tile?).await?;
                }
                debug!(
                    identifier = self.source.identifier(),
                    output_level, plane, "finished plane pass"
                );
            }
        }

        sink.finalize(&crop.metadata_text).await?;
        info!(identifier = self.source.identifier(), "finalized output");
        Ok(())
    }

    /// Effective width, height and channel count: the crop selection's when
    /// one is set, the loaded image's otherwise.
    pub fn dimensions(&self) -> (u32, u32, u32) {
        let descriptor = self.effective_descriptor();
        (
            descriptor.width(),
            descriptor.height(),
            descriptor.channel_count(),
        )
    }

    /// Effective OME-XML document text.
    ///
    /// The raw loaded document, byte for byte, until a crop is selected;
    /// the regenerated synchronized document afterwards.
    pub fn metadata_text(&self) -> &str {
        match &self.crop {
            Some(crop) => &crop.metadata_text,
            None => &self.metadata_text,
        }
    }

    /// Effective image descriptor.
    pub fn descriptor(&self) -> &ImageDescriptor {
        self.effective_descriptor()
    }

    /// The current crop selection, if any.
    pub fn crop_region(&self) -> Option<CropRegion> {
        self.crop.as_ref().map(|crop| crop.region)
    }

    /// Identifier of the underlying source (for logs and error text).
    pub fn identifier(&self) -> &str {
        self.source.identifier()
    }

    fn effective_descriptor(&self) -> &ImageDescriptor {
        match &self.crop {
            Some(crop) => &crop.derivation.descriptor,
            None => &self.descriptor,
        }
    }
}

impl<S: PixelSource> fmt::Debug for OmeSlicer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmeSlicer")
            .field("identifier", &self.source.identifier())
            .field("dimensions", &self.dimensions())
            .field("crop", &self.crop_region())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
