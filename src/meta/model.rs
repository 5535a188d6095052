//! In-memory model of an OME image: document fields plus pyramid geometry.
//!
//! The model is assembled once at load time from two inputs: the OME-XML
//! document embedded in the container (dimensions, pixel type, calibration,
//! channels, planes) and the level layouts the container itself declares
//! (per-level dimensions and tile sizes). Downscale factors are derived from
//! the declared level dimensions and validated, so later geometry never
//! re-guesses them.
//!
//! Attributes the model does not interpret are kept as opaque (name, value)
//! pairs on each element and re-emitted on serialize.

use crate::codec::SampleLayout;
use crate::container::LevelLayout;
use crate::error::MetadataError;

/// Maximum relative error tolerated between a declared level's dimension
/// ratio and the derived integer downscale factor.
const FACTOR_TOLERANCE: f64 = 0.05;

/// Opaque attributes preserved for round-tripping.
pub type ExtraAttrs = Vec<(String, String)>;

// =============================================================================
// Pixel Type
// =============================================================================

/// OME pixel sample type.
///
/// Covers the integer and float types OME-TIFF declares in the `Type`
/// attribute of `Pixels`. Unknown strings are rejected at parse time rather
/// than defaulted: a wrong sample size silently corrupts every downstream
/// byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float,
    Double,
}

impl PixelType {
    /// Parse the OME `Type` attribute value.
    pub fn from_ome(value: &str) -> Result<Self, MetadataError> {
        match value {
            "uint8" => Ok(Self::Uint8),
            "int8" => Ok(Self::Int8),
            "uint16" => Ok(Self::Uint16),
            "int16" => Ok(Self::Int16),
            "uint32" => Ok(Self::Uint32),
            "int32" => Ok(Self::Int32),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            other => Err(MetadataError::UnsupportedPixelType(other.to_string())),
        }
    }

    /// The OME `Type` attribute value for this type.
    pub const fn as_ome(&self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// Bits in one sample of this type.
    pub const fn bits(&self) -> u16 {
        match self {
            Self::Uint8 | Self::Int8 => 8,
            Self::Uint16 | Self::Int16 => 16,
            Self::Uint32 | Self::Int32 | Self::Float => 32,
            Self::Double => 64,
        }
    }
}

// =============================================================================
// Physical Calibration
// =============================================================================

/// One physical pixel extent with its (optional) declared unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSize {
    /// Extent of one pixel along this axis.
    pub value: f64,
    /// Unit attribute as declared (`"µm"` etc.), `None` when the document
    /// relied on the schema default.
    pub unit: Option<String>,
}

/// Physical pixel size along each axis, when declared.
///
/// Cropping never touches calibration: a crop removes pixels, it does not
/// resample them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicalCalibration {
    /// Physical size of one pixel along X.
    pub x: Option<PhysicalSize>,
    /// Physical size of one pixel along Y.
    pub y: Option<PhysicalSize>,
    /// Physical spacing between Z sections.
    pub z: Option<PhysicalSize>,
}

// =============================================================================
// Channels and Planes
// =============================================================================

/// One channel of the image.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    /// Channel name, when declared.
    pub name: Option<String>,
    /// Bits per sample. Uniform across every plane of the channel because it
    /// derives from the image-wide pixel type.
    pub bits_per_sample: u16,
    /// Samples per pixel (1 for grayscale channels, 3 for an RGB channel).
    pub samples_per_pixel: u16,
    /// Uninterpreted attributes, preserved for serialization.
    pub extra: ExtraAttrs,
}

impl ChannelDescriptor {
    /// Sample packing for tiles of this channel.
    pub fn sample_layout(&self) -> SampleLayout {
        SampleLayout::new(self.bits_per_sample, self.samples_per_pixel)
    }
}

/// One 2D plane: a (channel, Z, T) coordinate with optional stage offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneDescriptor {
    /// Index into the channel list.
    pub channel: u32,
    /// Z section index.
    pub z: u32,
    /// Timepoint index.
    pub t: u32,
    /// Stage position along X, when declared.
    pub position_x: Option<f64>,
    /// Stage position along Y, when declared.
    pub position_y: Option<f64>,
    /// Stage position along Z, when declared.
    pub position_z: Option<f64>,
    /// Uninterpreted attributes, preserved for serialization.
    pub extra: ExtraAttrs,
}

/// Synthesize the dense plane list for documents that declare none.
///
/// OME orders planes by the trailing three letters of `DimensionOrder`, the
/// leftmost varying fastest (for `XYCZT`: channel fastest, then Z, then T).
pub fn dense_planes(
    dimension_order: &str,
    channel_count: u32,
    size_z: u32,
    size_t: u32,
) -> Result<Vec<PlaneDescriptor>, MetadataError> {
    let axes = validate_dimension_order(dimension_order)?;
    let radix = |axis: char| match axis {
        'C' => channel_count,
        'Z' => size_z,
        _ => size_t,
    };

    let total = channel_count as u64 * size_z as u64 * size_t as u64;
    let mut planes = Vec::with_capacity(total as usize);
    for i in 0..total {
        let mut rest = i;
        let mut c = 0u32;
        let mut z = 0u32;
        let mut t = 0u32;
        for &axis in &axes {
            let r = radix(axis) as u64;
            let idx = (rest % r) as u32;
            rest /= r;
            match axis {
                'C' => c = idx,
                'Z' => z = idx,
                _ => t = idx,
            }
        }
        planes.push(PlaneDescriptor {
            channel: c,
            z,
            t,
            position_x: None,
            position_y: None,
            position_z: None,
            extra: Vec::new(),
        });
    }
    Ok(planes)
}

/// Check a `DimensionOrder` value and return its trailing axes, fastest first.
fn validate_dimension_order(order: &str) -> Result<[char; 3], MetadataError> {
    let chars: Vec<char> = order.chars().collect();
    if chars.len() == 5 && chars[0] == 'X' && chars[1] == 'Y' {
        let mut axes = [chars[2], chars[3], chars[4]];
        axes.sort_unstable();
        if axes == ['C', 'T', 'Z'] {
            return Ok([chars[2], chars[3], chars[4]]);
        }
    }
    Err(MetadataError::InvalidField {
        field: "DimensionOrder",
        message: format!("expected a permutation of XYCZT, got {order:?}"),
    })
}

// =============================================================================
// OME Document Model
// =============================================================================

/// The fields of the OME-XML document this crate models, plus opaque extras.
///
/// Everything here is X/Y/C/Z/T bookkeeping; pyramid geometry lives in
/// [`ResolutionLevel`] because OME-XML does not describe the tile pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct OmeMetadata {
    /// Attributes of the root `OME` element (namespaces, UUID, creator).
    pub ome_attrs: ExtraAttrs,
    /// Attributes of the first `Image` element (ID, Name, ...).
    pub image_attrs: ExtraAttrs,
    /// Uninterpreted attributes of the `Pixels` element.
    pub pixels_attrs: ExtraAttrs,
    /// `DimensionOrder` attribute.
    pub dimension_order: String,
    /// Sample type of every plane.
    pub pixel_type: PixelType,
    /// Image width in pixels at full resolution.
    pub size_x: u32,
    /// Image height in pixels at full resolution.
    pub size_y: u32,
    /// Declared channel extent (sum of samples over channels).
    pub size_c: u32,
    /// Number of Z sections.
    pub size_z: u32,
    /// Number of timepoints.
    pub size_t: u32,
    /// Physical pixel size, when declared.
    pub calibration: PhysicalCalibration,
    /// Ordered channel list.
    pub channels: Vec<ChannelDescriptor>,
    /// Ordered plane list. Dense-synthesized at parse time when the document
    /// declares none.
    pub planes: Vec<PlaneDescriptor>,
}

impl OmeMetadata {
    /// Check the cross-field invariants of the document.
    ///
    /// Individual field syntax is the parser's business; this catches the
    /// combinations that make tile decode meaningless: zero dimensions, no
    /// channels, planes referencing indices outside the declared ranges, and
    /// a `SizeC` that disagrees with the channel list.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.size_x == 0 || self.size_y == 0 {
            return Err(MetadataError::Inconsistent(format!(
                "image extent is {}x{}",
                self.size_x, self.size_y
            )));
        }
        if self.size_c == 0 || self.size_z == 0 || self.size_t == 0 {
            return Err(MetadataError::Inconsistent(format!(
                "dimension extents must be positive: SizeC={} SizeZ={} SizeT={}",
                self.size_c, self.size_z, self.size_t
            )));
        }
        if self.channels.is_empty() {
            return Err(MetadataError::MissingField("Channel"));
        }
        validate_dimension_order(&self.dimension_order)?;

        let samples: u32 = self
            .channels
            .iter()
            .map(|c| c.samples_per_pixel as u32)
            .sum();
        if samples != self.size_c {
            return Err(MetadataError::Inconsistent(format!(
                "SizeC is {} but channels declare {} samples",
                self.size_c, samples
            )));
        }

        if self.planes.is_empty() {
            return Err(MetadataError::MissingField("Plane"));
        }
        for (index, plane) in self.planes.iter().enumerate() {
            if plane.channel as usize >= self.channels.len() {
                return Err(MetadataError::InvalidPlaneReference {
                    plane: index,
                    message: format!(
                        "TheC={} but image has {} channels",
                        plane.channel,
                        self.channels.len()
                    ),
                });
            }
            if plane.z >= self.size_z {
                return Err(MetadataError::InvalidPlaneReference {
                    plane: index,
                    message: format!("TheZ={} but SizeZ={}", plane.z, self.size_z),
                });
            }
            if plane.t >= self.size_t {
                return Err(MetadataError::InvalidPlaneReference {
                    plane: index,
                    message: format!("TheT={} but SizeT={}", plane.t, self.size_t),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Resolution Level
// =============================================================================

/// One level of the resolution pyramid and its tile grid.
///
/// Level 0 is full resolution. The grid is derived by ceiling division, so
/// the last tile of a row or column may be partial; [`tile_extent`]
/// (ResolutionLevel::tile_extent) reports valid pixels and must be used
/// instead of the nominal tile size at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionLevel {
    /// Index of this level in the pyramid (0 = full resolution).
    pub index: usize,
    /// Downscale factor relative to level 0 (1 for level 0).
    pub factor: u32,
    /// Level width in pixels.
    pub width: u32,
    /// Level height in pixels.
    pub height: u32,
    /// Nominal tile width in pixels.
    pub tile_width: u32,
    /// Nominal tile height in pixels.
    pub tile_height: u32,
    /// Number of tiles in X direction.
    pub tiles_x: u32,
    /// Number of tiles in Y direction.
    pub tiles_y: u32,
}

impl ResolutionLevel {
    /// Create a level, deriving its tile grid.
    pub fn new(
        index: usize,
        factor: u32,
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Self {
        let tiles_x = (width + tile_width - 1) / tile_width;
        let tiles_y = (height + tile_height - 1) / tile_height;
        Self {
            index,
            factor,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
        }
    }

    /// Total number of tiles in the grid.
    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Valid pixel extent of a specific tile.
    ///
    /// Edge tiles may be smaller than the nominal tile size. Returns `None`
    /// for coordinates outside the grid.
    pub fn tile_extent(&self, row: u32, col: u32) -> Option<(u32, u32)> {
        if col >= self.tiles_x || row >= self.tiles_y {
            return None;
        }

        let w = if col == self.tiles_x - 1 {
            let remainder = self.width % self.tile_width;
            if remainder == 0 {
                self.tile_width
            } else {
                remainder
            }
        } else {
            self.tile_width
        };

        let h = if row == self.tiles_y - 1 {
            let remainder = self.height % self.tile_height;
            if remainder == 0 {
                self.tile_height
            } else {
                remainder
            }
        } else {
            self.tile_height
        };

        Some((w, h))
    }
}

// =============================================================================
// Image Descriptor
// =============================================================================

/// The full description of one loaded image: OME document plus pyramid.
///
/// Built once at load time and never mutated; cropping derives a new
/// descriptor and leaves the original untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor {
    pub(crate) meta: OmeMetadata,
    pub(crate) levels: Vec<ResolutionLevel>,
}

impl ImageDescriptor {
    /// Assemble a descriptor from a validated document and the level layouts
    /// the container declares.
    ///
    /// Derives an integer downscale factor per level from the declared
    /// dimensions and rejects containers whose levels disagree with the
    /// document (level 0 extent), shrink inconsistently between axes, or do
    /// not strictly shrink with increasing index.
    pub fn assemble(
        meta: OmeMetadata,
        layouts: &[LevelLayout],
    ) -> Result<Self, MetadataError> {
        meta.validate()?;

        if layouts.is_empty() {
            return Err(MetadataError::Inconsistent(
                "container declares no resolution levels".to_string(),
            ));
        }
        let base = layouts[0];
        if base.width != meta.size_x || base.height != meta.size_y {
            return Err(MetadataError::Inconsistent(format!(
                "document says {}x{} but level 0 is {}x{}",
                meta.size_x, meta.size_y, base.width, base.height
            )));
        }

        let mut levels = Vec::with_capacity(layouts.len());
        let mut previous_factor = 0u32;
        for (index, layout) in layouts.iter().enumerate() {
            if layout.width == 0 || layout.height == 0 {
                return Err(MetadataError::InvalidPyramid {
                    level: index,
                    message: format!("level extent is {}x{}", layout.width, layout.height),
                });
            }
            if layout.tile_width == 0 || layout.tile_height == 0 {
                return Err(MetadataError::InvalidPyramid {
                    level: index,
                    message: format!(
                        "tile extent is {}x{}",
                        layout.tile_width, layout.tile_height
                    ),
                });
            }

            let factor = derive_factor(index, base, *layout)?;
            if factor <= previous_factor && index > 0 {
                return Err(MetadataError::InvalidPyramid {
                    level: index,
                    message: format!(
                        "downscale factor {factor} does not increase over previous {previous_factor}"
                    ),
                });
            }
            previous_factor = factor;

            levels.push(ResolutionLevel::new(
                index,
                factor,
                layout.width,
                layout.height,
                layout.tile_width,
                layout.tile_height,
            ));
        }

        Ok(Self { meta, levels })
    }

    /// Image width in pixels at full resolution.
    pub fn width(&self) -> u32 {
        self.meta.size_x
    }

    /// Image height in pixels at full resolution.
    pub fn height(&self) -> u32 {
        self.meta.size_y
    }

    /// Declared channel extent (the OME `SizeC`).
    pub fn channel_count(&self) -> u32 {
        self.meta.size_c
    }

    /// Sample type of every plane.
    pub fn pixel_type(&self) -> PixelType {
        self.meta.pixel_type
    }

    /// Physical pixel calibration.
    pub fn calibration(&self) -> &PhysicalCalibration {
        &self.meta.calibration
    }

    /// Ordered channel list.
    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.meta.channels
    }

    /// Ordered plane list.
    pub fn planes(&self) -> &[PlaneDescriptor] {
        &self.meta.planes
    }

    /// Number of planes.
    pub fn plane_count(&self) -> usize {
        self.meta.planes.len()
    }

    /// The resolution pyramid, level 0 first.
    pub fn levels(&self) -> &[ResolutionLevel] {
        &self.levels
    }

    /// One pyramid level, or `None` if `level` is out of range.
    pub fn level(&self, level: usize) -> Option<&ResolutionLevel> {
        self.levels.get(level)
    }

    /// The underlying OME document model.
    pub fn metadata(&self) -> &OmeMetadata {
        &self.meta
    }

    /// Sample packing for tiles of the given plane, or `None` if the plane
    /// index is out of range.
    pub fn plane_layout(&self, plane: usize) -> Option<SampleLayout> {
        let descriptor = self.meta.planes.get(plane)?;
        self.meta
            .channels
            .get(descriptor.channel as usize)
            .map(|c| c.sample_layout())
    }
}

/// Derive the integer downscale factor of one level from declared extents.
fn derive_factor(
    index: usize,
    base: LevelLayout,
    layout: LevelLayout,
) -> Result<u32, MetadataError> {
    let ratio_x = base.width as f64 / layout.width as f64;
    let ratio_y = base.height as f64 / layout.height as f64;
    let factor = ratio_x.round();

    if factor < 1.0 {
        return Err(MetadataError::InvalidPyramid {
            level: index,
            message: format!("level is larger than level 0 (ratio {ratio_x:.3})"),
        });
    }
    for (axis, ratio) in [("X", ratio_x), ("Y", ratio_y)] {
        if (ratio - factor).abs() / factor > FACTOR_TOLERANCE {
            return Err(MetadataError::InvalidPyramid {
                level: index,
                message: format!(
                    "{axis} ratio {ratio:.3} is not consistent with factor {factor}"
                ),
            });
        }
    }
    Ok(factor as u32)
}
