//! Test utilities for pipeline tests.
//!
//! Provides an in-memory pyramidal pixel source with deterministic pixel
//! values, an identity codec, recording sinks, and reference-raster helpers
//! for comparing saved output against directly generated expectations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use ome_slicer::{
    dense_planes, write_ome_xml, ChannelDescriptor, CodecError, LevelLayout, OmeMetadata,
    OutputTile, PhysicalCalibration, PixelBuffer, PixelSource, PixelType, RawTile, SampleLayout,
    SinkError, SourceError, TileCodec, TileSink,
};

// =============================================================================
// Deterministic Pixels
// =============================================================================

/// Pixel value at an absolute (level, plane, x, y) address.
///
/// The mock source generates tile data from this function and the
/// expectation helpers regenerate it, so tests compare saved output against
/// an independent reference instead of against the code under test.
pub fn pixel_value(level: usize, plane: usize, x: u32, y: u32) -> u8 {
    (x.wrapping_mul(31)
        ^ y.wrapping_mul(17)
        ^ (plane as u32).wrapping_mul(97)
        ^ (level as u32).wrapping_mul(11)) as u8
}

pub fn div_ceil(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}

// =============================================================================
// Metadata Fixtures
// =============================================================================

/// OME document for a `width` x `height` uint8 image with one grayscale
/// channel per name and a dense plane list.
pub fn build_metadata(width: u32, height: u32, channel_names: &[&str]) -> OmeMetadata {
    OmeMetadata {
        ome_attrs: vec![(
            "xmlns".to_string(),
            "http://www.openmicroscopy.org/Schemas/OME/2016-06".to_string(),
        )],
        image_attrs: vec![("ID".to_string(), "Image:0".to_string())],
        pixels_attrs: vec![("ID".to_string(), "Pixels:0".to_string())],
        dimension_order: "XYCZT".to_string(),
        pixel_type: PixelType::Uint8,
        size_x: width,
        size_y: height,
        size_c: channel_names.len() as u32,
        size_z: 1,
        size_t: 1,
        calibration: PhysicalCalibration::default(),
        channels: channel_names
            .iter()
            .map(|name| ChannelDescriptor {
                name: Some((*name).to_string()),
                bits_per_sample: 8,
                samples_per_pixel: 1,
                extra: Vec::new(),
            })
            .collect(),
        planes: dense_planes("XYCZT", channel_names.len() as u32, 1, 1).unwrap(),
    }
}

// =============================================================================
// Mock Pixel Source with Read Tracking
// =============================================================================

/// An in-memory pyramidal source generating tiles from [`pixel_value`].
///
/// Tracks every tile read, so tests can assert how much of the image a crop
/// actually touched.
pub struct PyramidSource {
    layouts: Vec<LevelLayout>,
    metadata_text: String,
    read_count: Arc<AtomicUsize>,
    poisoned: Option<(usize, u32, u32)>,
}

impl PyramidSource {
    /// Build a pyramid with the given full-resolution extent and downscale
    /// factors. Level dimensions use ceiling division, the rule real
    /// pyramid writers use.
    pub fn new(
        width: u32,
        height: u32,
        tile: u32,
        factors: &[u32],
        channel_names: &[&str],
    ) -> Self {
        let layouts = factors
            .iter()
            .map(|&factor| LevelLayout {
                width: div_ceil(width, factor),
                height: div_ceil(height, factor),
                tile_width: tile,
                tile_height: tile,
            })
            .collect();
        let metadata_text = write_ome_xml(&build_metadata(width, height, channel_names)).unwrap();
        Self {
            layouts,
            metadata_text,
            read_count: Arc::new(AtomicUsize::new(0)),
            poisoned: None,
        }
    }

    /// Replace the embedded document. The document's SizeX/SizeY must still
    /// match level 0 or loading will reject the source.
    pub fn with_metadata(mut self, meta: &OmeMetadata) -> Self {
        self.metadata_text = write_ome_xml(meta).unwrap();
        self
    }

    /// Shrink one level's declared extent below what ceiling division would
    /// give, as some real containers do.
    pub fn with_level_extent(mut self, level: usize, width: u32, height: u32) -> Self {
        self.layouts[level].width = width;
        self.layouts[level].height = height;
        self
    }

    /// Make one tile address fail every read.
    pub fn with_poisoned_tile(mut self, level: usize, row: u32, col: u32) -> Self {
        self.poisoned = Some((level, row, col));
        self
    }

    /// Shared read counter, usable after the source moves into a slicer.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.read_count)
    }

    pub fn metadata_text(&self) -> &str {
        &self.metadata_text
    }
}

#[async_trait]
impl PixelSource for PyramidSource {
    fn level_count(&self) -> usize {
        self.layouts.len()
    }

    fn level_layout(&self, level: usize) -> Option<LevelLayout> {
        self.layouts.get(level).copied()
    }

    async fn read_metadata_text(&self) -> Result<String, SourceError> {
        Ok(self.metadata_text.clone())
    }

    async fn read_tile(
        &self,
        level: usize,
        plane: usize,
        row: u32,
        col: u32,
    ) -> Result<RawTile, SourceError> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        if self.poisoned == Some((level, row, col)) {
            return Err(SourceError::ReadFailed {
                identifier: self.identifier().to_string(),
                message: "poisoned tile".to_string(),
            });
        }
        let missing = || SourceError::TileMissing {
            identifier: self.identifier().to_string(),
            level,
            plane,
            row,
            col,
        };
        let layout = self.layouts.get(level).copied().ok_or_else(missing)?;
        let x0 = col * layout.tile_width;
        let y0 = row * layout.tile_height;
        if x0 >= layout.width || y0 >= layout.height {
            return Err(missing());
        }
        let w = (layout.width - x0).min(layout.tile_width);
        let h = (layout.height - y0).min(layout.tile_height);
        let mut data = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                data.push(pixel_value(level, plane, x0 + x, y0 + y));
            }
        }
        Ok(RawTile {
            data: Bytes::from(data),
            valid_width: w,
            valid_height: h,
        })
    }

    fn identifier(&self) -> &str {
        "mem://pipeline-test"
    }
}

// =============================================================================
// Codec and Sinks
// =============================================================================

/// Identity codec for sources that produce uncompressed rasters.
pub struct RawCodec;

impl TileCodec for RawCodec {
    fn decode(&self, raw: &RawTile, layout: SampleLayout) -> Result<PixelBuffer, CodecError> {
        PixelBuffer::new(raw.valid_width, raw.valid_height, layout, raw.data.clone())
    }
}

/// Sink keeping every written tile, for pixel-level assertions.
#[derive(Default)]
pub struct MemorySink {
    pub tiles: Vec<OutputTile>,
    pub finalized: Option<String>,
}

#[async_trait]
impl TileSink for MemorySink {
    async fn write_tile(&mut self, tile: &OutputTile) -> Result<(), SinkError> {
        self.tiles.push(tile.clone());
        Ok(())
    }

    async fn finalize(&mut self, metadata_text: &str) -> Result<(), SinkError> {
        self.finalized = Some(metadata_text.to_string());
        Ok(())
    }
}

/// Sink recording tile addresses but dropping pixel data, for large runs.
#[derive(Default)]
pub struct TrackingSink {
    pub addresses: Vec<(usize, usize, u32, u32)>,
    pub finalized: Option<String>,
}

#[async_trait]
impl TileSink for TrackingSink {
    async fn write_tile(&mut self, tile: &OutputTile) -> Result<(), SinkError> {
        self.addresses.push((tile.level, tile.plane, tile.row, tile.col));
        Ok(())
    }

    async fn finalize(&mut self, metadata_text: &str) -> Result<(), SinkError> {
        self.finalized = Some(metadata_text.to_string());
        Ok(())
    }
}

// =============================================================================
// Reference Rasters
// =============================================================================

/// The crop window one level sees: floored origin, ceiling extent.
pub fn scaled_window(x: u32, y: u32, width: u32, height: u32, factor: u32) -> (u32, u32, u32, u32) {
    (
        x / factor,
        y / factor,
        div_ceil(width, factor),
        div_ceil(height, factor),
    )
}

/// Reference raster for one (source level, plane) of a crop, generated
/// directly from [`pixel_value`]. 8-bit single-sample layouts only.
pub fn expected_window_raster(
    level: usize,
    plane: usize,
    crop: (u32, u32, u32, u32),
    factor: u32,
) -> Vec<u8> {
    let (ox, oy, ow, oh) = scaled_window(crop.0, crop.1, crop.2, crop.3, factor);
    let mut data = Vec::with_capacity((ow as usize) * (oh as usize));
    for v in 0..oh {
        for u in 0..ow {
            data.push(pixel_value(level, plane, ox + u, oy + v));
        }
    }
    data
}

/// Reassemble the written tiles of one (output level, plane) into a raster.
/// 8-bit single-sample layouts only.
pub fn assemble_raster(
    tiles: &[OutputTile],
    level: usize,
    plane: usize,
    width: u32,
    height: u32,
    tile: u32,
) -> Vec<u8> {
    let mut data = vec![0u8; (width as usize) * (height as usize)];
    for t in tiles.iter().filter(|t| t.level == level && t.plane == plane) {
        let x0 = (t.col * tile) as usize;
        let y0 = (t.row * tile) as usize;
        for row in 0..t.height as usize {
            let src = row * t.width as usize;
            let dst = (y0 + row) * width as usize + x0;
            data[dst..dst + t.width as usize].copy_from_slice(&t.data[src..src + t.width as usize]);
        }
    }
    data
}
