//! Pixel rectangles: the validated crop request and the plain rectangles
//! the resolver slices it into.

use crate::error::GeometryError;

/// An axis-aligned rectangle in pixel coordinates of some level.
///
/// No invariants beyond what the fields say; geometry code uses it for tile
/// sub-rectangles and destination patches alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// First X coordinate beyond the rectangle.
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// First Y coordinate beyond the rectangle.
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersection of two rectangles, `None` when they share no pixels.
    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if x < right && y < bottom {
            Some(PixelRect::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }
}

/// A validated crop request in full-resolution pixel coordinates.
///
/// Construction checks the rectangle against the image bounds; out-of-range
/// input fails instead of being clamped. A constructed value is therefore
/// always a non-empty rectangle inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl CropRegion {
    /// Validate a crop rectangle against the full-resolution image extent.
    pub fn new(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 {
            return Err(GeometryError::EmptyRectangle { width, height });
        }
        // u64 arithmetic so corner coordinates near u32::MAX cannot wrap.
        if x as u64 + width as u64 > image_width as u64
            || y as u64 + height as u64 > image_height as u64
        {
            return Err(GeometryError::OutOfBounds {
                x,
                y,
                width,
                height,
                image_width,
                image_height,
            });
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub const fn x(&self) -> u32 {
        self.x
    }

    pub const fn y(&self) -> u32 {
        self.y
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    /// The request as a rectangle in level-0 coordinates.
    pub const fn as_rect(&self) -> PixelRect {
        PixelRect::new(self.x, self.y, self.width, self.height)
    }
}
