//! Decoded pixel buffers and the external tile codec seam.
//!
//! Tile compression is not this crate's business: the codec that turns raw
//! container bytes into pixels is an external collaborator behind the
//! [`TileCodec`] trait. What the crate does own is the shape of the data
//! crossing that seam: a [`SampleLayout`] describing how pixels are packed
//! and a [`PixelBuffer`] holding one decoded tile.
//!
//! # Design Decisions
//!
//! - **Synchronous decode**: decoding operates on bytes already in memory and
//!   is CPU-bound, so the trait is sync; callers that want to offload it can
//!   wrap the call in their own blocking-pool primitive.
//!
//! - **Byte-level buffers**: the engine never interprets sample values, it
//!   only moves rows of bytes, so buffers stay untyped and the layout carries
//!   the strides.

use bytes::Bytes;

use crate::container::RawTile;
use crate::error::CodecError;

// =============================================================================
// Sample Layout
// =============================================================================

/// How the samples of one pixel are packed in a decoded buffer.
///
/// Derived from a channel descriptor: the pixel type fixes the bits per
/// sample, the channel fixes the samples per pixel. All strides assume
/// tightly packed, row-major, interleaved samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleLayout {
    /// Bits in a single sample. Always a multiple of 8 for OME pixel types.
    pub bits_per_sample: u16,
    /// Samples that make up one pixel (1 for grayscale, 3 for RGB channels).
    pub samples_per_pixel: u16,
}

impl SampleLayout {
    /// Create a layout from its raw parts.
    pub const fn new(bits_per_sample: u16, samples_per_pixel: u16) -> Self {
        Self {
            bits_per_sample,
            samples_per_pixel,
        }
    }

    /// Byte size of a single sample.
    #[inline]
    pub const fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Byte size of a whole pixel.
    #[inline]
    pub const fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_sample() * self.samples_per_pixel as usize
    }

    /// Byte length of one row of `width` pixels.
    #[inline]
    pub const fn row_bytes(&self, width: u32) -> usize {
        self.bytes_per_pixel() * width as usize
    }

    /// Byte length of a full `width` x `height` raster.
    #[inline]
    pub const fn raster_bytes(&self, width: u32, height: u32) -> usize {
        self.row_bytes(width) * height as usize
    }
}

// =============================================================================
// Pixel Buffer
// =============================================================================

/// One decoded tile: a tightly packed, row-major raster of `width` x `height`
/// pixels in the given [`SampleLayout`].
///
/// Backed by [`Bytes`] so cached buffers clone by reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    /// Pixels per row.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// Packing of the samples in `data`.
    pub layout: SampleLayout,
    /// Raster bytes, exactly `layout.raster_bytes(width, height)` long.
    pub data: Bytes,
}

impl PixelBuffer {
    /// Create a buffer, checking that the data length matches the geometry.
    pub fn new(
        width: u32,
        height: u32,
        layout: SampleLayout,
        data: Bytes,
    ) -> Result<Self, CodecError> {
        let expected = layout.raster_bytes(width, height);
        if data.len() != expected {
            return Err(CodecError::Decode(format!(
                "buffer is {} bytes, {}x{} raster needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Byte length the buffer must have for its declared geometry.
    #[inline]
    pub fn expected_len(&self) -> usize {
        self.layout.raster_bytes(self.width, self.height)
    }

    /// One row of the raster as a byte slice.
    ///
    /// # Panics
    ///
    /// Panics if `y >= self.height`. Callers index rows they obtained from
    /// the buffer's own geometry.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.layout.row_bytes(self.width);
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }
}

// =============================================================================
// Codec Seam
// =============================================================================

/// External decoder for raw container tiles.
///
/// Implementations wrap whatever compression the container uses (LZW,
/// Deflate, JPEG, none) and produce a [`PixelBuffer`] whose dimensions equal
/// the raw tile's declared valid extent. Decode failures are final: the
/// engine propagates them without retrying, since truncated or corrupt tile
/// data is not assumed transient.
pub trait TileCodec: Send + Sync {
    /// Decode one raw tile into a pixel buffer with the given layout.
    fn decode(&self, raw: &RawTile, layout: SampleLayout) -> Result<PixelBuffer, CodecError>;
}
