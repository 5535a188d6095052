use thiserror::Error;

/// Errors returned by an external pixel source (container reader)
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Underlying read failed (I/O, truncation, storage backend)
    #[error("read failed for {identifier}: {message}")]
    ReadFailed { identifier: String, message: String },

    /// The container has no tile at the requested address
    #[error("tile ({row}, {col}) does not exist at level {level}, plane {plane} of {identifier}")]
    TileMissing {
        identifier: String,
        level: usize,
        plane: usize,
        row: u32,
        col: u32,
    },

    /// The container carries no readable metadata document
    #[error("metadata document unavailable for {identifier}: {message}")]
    MetadataUnavailable { identifier: String, message: String },
}

/// Errors returned by an external tile codec
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Compressed tile data could not be decoded
    #[error("decode failed: {0}")]
    Decode(String),

    /// The codec cannot produce the requested sample layout
    #[error("unsupported sample layout: {bits_per_sample}-bit samples x {samples_per_pixel} per pixel")]
    UnsupportedLayout {
        bits_per_sample: u16,
        samples_per_pixel: u16,
    },
}

/// Errors returned by an external tile sink (container writer)
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Writing a tile failed
    #[error("tile write failed: {0}")]
    Write(String),

    /// Finalizing the output container failed
    #[error("finalize failed: {0}")]
    Finalize(String),
}

/// Errors raised while parsing or validating the OME-XML metadata document
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// The document is not well-formed XML
    #[error("XML syntax error: {0}")]
    Xml(String),

    /// A required element or attribute is absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// An attribute value failed to parse
    #[error("invalid value for {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    /// Pixel type string is not one of the OME integer/float types
    #[error("unsupported pixel type: {0}")]
    UnsupportedPixelType(String),

    /// A plane references a channel/Z/T index outside the declared ranges
    #[error("plane {plane} references an out-of-range index: {message}")]
    InvalidPlaneReference { plane: usize, message: String },

    /// The container's resolution levels cannot form a valid pyramid
    #[error("invalid pyramid declaration at level {level}: {message}")]
    InvalidPyramid { level: usize, message: String },

    /// Fields are individually valid but mutually inconsistent
    #[error("inconsistent metadata: {0}")]
    Inconsistent(String),
}

/// Errors raised while mapping a crop rectangle onto tile grids
#[derive(Debug, Clone, Error)]
pub enum GeometryError {
    /// Width or height of the crop rectangle is zero
    #[error("empty crop rectangle: {width}x{height} (both extents must be positive)")]
    EmptyRectangle { width: u32, height: u32 },

    /// Crop rectangle extends past the image bounds
    #[error(
        "crop rectangle out of bounds: ({x}, {y}) {width}x{height} exceeds image {image_width}x{image_height}"
    )]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    /// Requested level index is not present in the descriptor
    #[error("unknown resolution level: {level} (image has {level_count} levels)")]
    UnknownLevel { level: usize, level_count: usize },

    /// Scaled crop window does not intersect the level's valid pixel area
    #[error("crop rectangle maps to no valid pixels at level {level} ({level_width}x{level_height})")]
    EmptyLevelWindow {
        level: usize,
        level_width: u32,
        level_height: u32,
    },

    /// Level cannot supply the scaled crop window (degenerate after crop)
    #[error(
        "level {level} is degenerate after crop: window needs {needed_width}x{needed_height} pixels, level declares {level_width}x{level_height}"
    )]
    DegenerateLevel {
        level: usize,
        needed_width: u32,
        needed_height: u32,
        level_width: u32,
        level_height: u32,
    },
}

/// Errors raised while streaming one (level, plane) pass of output tiles
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// Reading a required source tile failed (propagated, not retried)
    #[error("source read failed at level {level}, plane {plane}, tile ({row}, {col}): {source}")]
    SourceRead {
        level: usize,
        plane: usize,
        row: u32,
        col: u32,
        source: SourceError,
    },

    /// Decoding a required source tile failed (propagated, not retried)
    #[error("tile decode failed at level {level}, plane {plane}, tile ({row}, {col}): {source}")]
    Decode {
        level: usize,
        plane: usize,
        row: u32,
        col: u32,
        source: CodecError,
    },

    /// Decoded data disagrees with the declared sample layout or tile extent
    #[error("channel mismatch at level {level}, plane {plane}, tile ({row}, {col}): {message}")]
    ChannelMismatch {
        level: usize,
        plane: usize,
        row: u32,
        col: u32,
        message: String,
    },
}

/// Top-level error for crop/save operations on the facade
#[derive(Debug, Clone, Error)]
pub enum SliceError {
    /// Metadata document is malformed or inconsistent
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Crop geometry is invalid for this image
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// A tile pass failed mid-stream
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// The pixel source failed outside a tile pass
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// The tile sink failed
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// save() was called on a handle with no crop selection
    #[error("no crop region selected: call crop() before save()")]
    NoCropRegion,
}
